use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{synth::Voice, Result, SonificationEvent, SonifyError};

/// Identifier of a voice scheduled on an [`AudioOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Platform synthesis backend.
///
/// Implementations own the audio clock: `current_time` must advance with the
/// samples actually produced, not with wall-clock time.
pub trait AudioOutput: Send {
    /// Makes sure the output can produce sound, resuming it if needed.
    fn ensure_available(&mut self) -> Result<()>;

    /// Current position of the audio clock.
    fn current_time(&self) -> Result<Duration>;

    /// Schedules a voice at its `start_at` clock time.
    fn start_voice(&mut self, voice: Voice) -> Result<VoiceId>;

    /// Stops and releases a voice, started or not.
    fn stop_voice(&mut self, id: VoiceId) -> Result<()>;
}

/// Output used when the host has no synthesis backend.
#[derive(Debug, Clone)]
pub struct UnavailableOutput {
    reason: String,
}

impl UnavailableOutput {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioOutput for UnavailableOutput {
    fn ensure_available(&mut self) -> Result<()> {
        Err(SonifyError::unavailable(self.reason.clone()))
    }

    fn current_time(&self) -> Result<Duration> {
        Err(SonifyError::unavailable(self.reason.clone()))
    }

    fn start_voice(&mut self, _voice: Voice) -> Result<VoiceId> {
        Err(SonifyError::unavailable(self.reason.clone()))
    }

    fn stop_voice(&mut self, _id: VoiceId) -> Result<()> {
        Err(SonifyError::unavailable(self.reason.clone()))
    }
}

/// Process-wide handle over the single audio output.
///
/// Cloning is cheap; every clone drives the same output, which is how the
/// playback scheduler and the touch explorer share one device.
#[derive(Clone)]
pub struct AudioEngine {
    output: Arc<Mutex<Box<dyn AudioOutput>>>,
}

impl AudioEngine {
    pub fn new(output: impl AudioOutput + 'static) -> Self {
        let output: Box<dyn AudioOutput> = Box::new(output);
        Self {
            output: Arc::new(Mutex::new(output)),
        }
    }

    /// Engine whose every operation fails with `AudioUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(UnavailableOutput::new(reason))
    }

    pub fn ensure_available(&self) -> Result<()> {
        self.lock()?.ensure_available()
    }

    pub fn current_time(&self) -> Result<Duration> {
        self.lock()?.current_time()
    }

    pub fn start_voice(&self, voice: Voice) -> Result<VoiceId> {
        self.lock()?.start_voice(voice)
    }

    pub fn stop_voice(&self, id: VoiceId) -> Result<()> {
        self.lock()?.stop_voice(id)
    }

    /// Plays `event` right away, ignoring its start offset.
    pub fn play_now(&self, event: &SonificationEvent, attack: Duration) -> Result<VoiceId> {
        self.with_output(|output| {
            output.ensure_available()?;
            let now = output.current_time()?;
            output.start_voice(Voice::from_event(event, now, attack))
        })
    }

    /// Runs `f` with exclusive access to the output, so a batch of voices is
    /// scheduled against one clock reading.
    pub fn with_output<T>(&self, f: impl FnOnce(&mut dyn AudioOutput) -> Result<T>) -> Result<T> {
        let mut output = self.lock()?;
        f(&mut **output)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn AudioOutput>>> {
        self.output
            .lock()
            .map_err(|_| SonifyError::unavailable("audio output has been poisoned"))
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{synth::MixerOutput, EnvelopeShape, Severity, Waveform};

    fn blip() -> SonificationEvent {
        SonificationEvent {
            frequency: 100.0,
            start_offset: Duration::from_secs(5),
            event_duration: Duration::from_millis(60),
            waveform: Waveform::Sine,
            envelope_shape: EnvelopeShape::Percussive,
            gain: 0.5,
            wobble: None,
            severity: Severity::Normal,
        }
    }

    #[test]
    fn play_now_ignores_start_offset() {
        let output = MixerOutput::new(1_000);
        let engine = AudioEngine::new(output.clone());
        output.advance(Duration::from_millis(100)).unwrap();

        engine.play_now(&blip(), Duration::from_millis(5)).unwrap();

        let samples = output.render(60).unwrap();
        assert!(samples.iter().any(|sample| sample.abs() > 0.1));
    }

    #[test]
    fn unavailable_engine_reports_audio_unavailable() {
        let engine = AudioEngine::unavailable("no output device");

        let err = engine.play_now(&blip(), Duration::ZERO).unwrap_err();
        assert!(matches!(err, SonifyError::AudioUnavailable(_)));
        assert!(format!("{err}").contains("no output device"));
        assert!(engine.ensure_available().is_err());
    }

    #[test]
    fn clones_drive_the_same_output() {
        let output = MixerOutput::new(1_000);
        let engine = AudioEngine::new(output.clone());
        let other = engine.clone();

        let id = engine.play_now(&blip(), Duration::ZERO).unwrap();
        assert_eq!(output.active_voices().unwrap(), 1);
        other.stop_voice(id).unwrap();
        assert_eq!(output.active_voices().unwrap(), 0);
    }
}
