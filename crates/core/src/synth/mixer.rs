use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use super::{oscillator, Voice};
use crate::{AudioOutput, Result, SonifyError, VoiceId};

/// Sums every live voice into a mono signal.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    frame: u64,
    voices: Vec<MixerVoice>,
    next_id: u64,
}

#[derive(Debug)]
struct MixerVoice {
    id: VoiceId,
    voice: Voice,
    start_frame: u64,
    end_frame: u64,
    phase: f64,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame: 0,
            voices: Vec::new(),
            next_id: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Audio clock position derived from the rendered frame count.
    pub fn current_time(&self) -> Duration {
        let rate = u64::from(self.sample_rate);
        let secs = self.frame / rate;
        let nanos = (self.frame % rate) * 1_000_000_000 / rate;
        Duration::new(secs, nanos as u32)
    }

    /// Number of voices that are playing or waiting to play.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Queues a voice. Voices whose start time already passed begin with the
    /// next rendered frame.
    pub fn add_voice(&mut self, voice: Voice) -> VoiceId {
        let id = VoiceId::new(self.next_id);
        self.next_id += 1;

        let start_frame = self.frames_at(voice.start_at).max(self.frame);
        let length = self.frames_at(voice.envelope.duration());
        self.voices.push(MixerVoice {
            id,
            voice,
            start_frame,
            end_frame: start_frame + length,
            phase: 0.0,
        });
        id
    }

    /// Drops a voice whether or not it has started. Returns `false` when the
    /// voice is unknown or already finished.
    pub fn remove_voice(&mut self, id: VoiceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|voice| voice.id != id);
        self.voices.len() != before
    }

    /// Renders mono samples and advances the clock by `out.len()` frames.
    pub fn render(&mut self, out: &mut [f32]) {
        self.render_interleaved(out, 1);
    }

    /// Renders the same signal on every channel of an interleaved buffer.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let rate = f64::from(self.sample_rate);

        for (offset, frame_out) in out.chunks_mut(channels).enumerate() {
            let frame = self.frame + offset as u64;
            let mut mixed = 0.0;

            for active in &mut self.voices {
                if frame < active.start_frame || frame >= active.end_frame {
                    continue;
                }
                let t = (frame - active.start_frame) as f64 / rate;
                let gain = active.voice.envelope.gain_at_secs(t);
                mixed += oscillator(active.voice.waveform, active.phase) * gain;
                active.phase = (active.phase + active.voice.frequency_at(t) / rate).rem_euclid(1.0);
            }

            let sample = mixed.clamp(-1.0, 1.0) as f32;
            frame_out.iter_mut().for_each(|slot| *slot = sample);
        }

        self.frame += out.len().div_ceil(channels) as u64;
        let now = self.frame;
        self.voices.retain(|voice| voice.end_frame > now);
    }

    fn frames_at(&self, time: Duration) -> u64 {
        (time.as_secs_f64() * f64::from(self.sample_rate)).round() as u64
    }
}

/// Shareable [`AudioOutput`] backed by a [`Mixer`].
///
/// Clones share one mixer: the engine schedules voices through one clone
/// while an offline export loop or a device callback renders through another.
#[derive(Debug, Clone)]
pub struct MixerOutput {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
}

impl MixerOutput {
    pub fn new(sample_rate: u32) -> Self {
        let mixer = Mixer::new(sample_rate);
        let sample_rate = mixer.sample_rate();
        Self {
            mixer: Arc::new(Mutex::new(mixer)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders `frames` mono samples, advancing the audio clock.
    pub fn render(&self, frames: usize) -> Result<Vec<f32>> {
        let mut block = vec![0.0; frames];
        self.lock()?.render(&mut block);
        Ok(block)
    }

    /// Renders into an interleaved device buffer. A poisoned mixer yields
    /// silence rather than panicking inside the device callback.
    pub fn fill_interleaved(&self, out: &mut [f32], channels: usize) {
        match self.mixer.lock() {
            Ok(mut mixer) => mixer.render_interleaved(out, channels),
            Err(_) => out.iter_mut().for_each(|sample| *sample = 0.0),
        }
    }

    /// Renders and discards audio until the clock has moved by `by`.
    pub fn advance(&self, by: Duration) -> Result<()> {
        let mut remaining = (by.as_secs_f64() * f64::from(self.sample_rate)).round() as usize;
        let mut scratch = vec![0.0; remaining.min(4096)];
        let mut mixer = self.lock()?;
        while remaining > 0 {
            let frames = remaining.min(scratch.len());
            mixer.render(&mut scratch[..frames]);
            remaining -= frames;
        }
        Ok(())
    }

    pub fn active_voices(&self) -> Result<usize> {
        Ok(self.lock()?.active_voices())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Mixer>> {
        self.mixer
            .lock()
            .map_err(|_| SonifyError::unavailable("mixer has been poisoned"))
    }
}

impl AudioOutput for MixerOutput {
    fn ensure_available(&mut self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn current_time(&self) -> Result<Duration> {
        Ok(self.lock()?.current_time())
    }

    fn start_voice(&mut self, voice: Voice) -> Result<VoiceId> {
        Ok(self.lock()?.add_voice(voice))
    }

    fn stop_voice(&mut self, id: VoiceId) -> Result<()> {
        if self.lock()?.remove_voice(id) {
            Ok(())
        } else {
            Err(SonifyError::invalid(format!("voice {} is not playing", id.get())))
        }
    }
}
