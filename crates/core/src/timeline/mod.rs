//! Whole-series playback: scheduling, progress and cancellation.
//!
//! All control happens on the caller's thread. Timing precision comes from
//! the audio clock of the shared [`AudioEngine`]: every event is placed on
//! that clock when the session starts, and progress is sampled from it once
//! per frame through [`PlaybackScheduler::tick`].

use std::time::Duration;

use crate::{
    config::AudioConfig, mapping::sequence_duration, synth::Voice, AudioEngine, Result,
    SonificationEvent, SonifyError, VoiceId,
};

/// Lifecycle of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Voices are queued but the first one has not been reached yet.
    Scheduled,
    Playing,
    Completed,
    Cancelled,
}

/// Opaque reference to a session started by a [`PlaybackScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

/// Whether the host should keep delivering frame callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    Continue,
    Finished,
}

/// Maps audio clock readings onto session progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    pub start_at: Duration,
    pub total: Duration,
}

impl PlaybackClock {
    /// Fraction of the session elapsed at clock time `now`, within `[0, 1]`.
    pub fn progress_at(&self, now: Duration) -> f64 {
        if now < self.start_at {
            return 0.0;
        }
        if self.total.is_zero() {
            return 1.0;
        }
        let elapsed = now - self.start_at;
        (elapsed.as_secs_f64() / self.total.as_secs_f64()).clamp(0.0, 1.0)
    }
}

type ProgressCallback = Box<dyn FnMut(f64) + Send>;
type CompleteCallback = Box<dyn FnOnce() + Send>;

struct Session {
    handle: SessionHandle,
    state: SessionState,
    clock: PlaybackClock,
    voices: Vec<VoiceId>,
    progress: f64,
    on_progress: Vec<ProgressCallback>,
    on_complete: Vec<CompleteCallback>,
}

/// Plays event sequences on the shared audio engine, one session at a time.
pub struct PlaybackScheduler {
    engine: AudioEngine,
    attack: Duration,
    lead: Duration,
    active: Option<Session>,
    retired: Option<(SessionHandle, SessionState)>,
    next_handle: u64,
}

impl PlaybackScheduler {
    pub fn new(engine: AudioEngine) -> Self {
        Self::from_config(engine, &AudioConfig::default())
    }

    pub fn from_config(engine: AudioEngine, config: &AudioConfig) -> Self {
        Self {
            engine,
            attack: config.attack(),
            lead: config.schedule_lead(),
            active: None,
            retired: None,
            next_handle: 0,
        }
    }

    /// Gap between `start` and the first event on the audio clock.
    pub fn with_lead(mut self, lead: Duration) -> Self {
        self.lead = lead;
        self
    }

    pub fn with_attack(mut self, attack: Duration) -> Self {
        self.attack = attack;
        self
    }

    /// Schedules every event and returns the new session's handle.
    ///
    /// Any session still running is stopped first. When the output fails
    /// part way, voices already queued are released and no session exists.
    pub fn start(&mut self, events: &[SonificationEvent]) -> Result<SessionHandle> {
        if events.is_empty() {
            return Err(SonifyError::NoPlayableData);
        }
        if let Some(bad) = events
            .iter()
            .find(|event| !event.frequency.is_finite() || !event.gain.is_finite())
        {
            return Err(SonifyError::invalid(format!(
                "event at {:?} has a non-finite frequency or gain",
                bad.start_offset
            )));
        }

        self.stop_active();

        let attack = self.attack;
        let lead = self.lead;
        let (start_at, voices) = self.engine.with_output(|output| {
            output.ensure_available()?;
            let start_at = output.current_time()? + lead;

            let mut voices = Vec::with_capacity(events.len());
            for event in events {
                let voice = Voice::from_event(event, start_at + event.start_offset, attack);
                match output.start_voice(voice) {
                    Ok(id) => voices.push(id),
                    Err(err) => {
                        for id in voices.drain(..) {
                            let _ = output.stop_voice(id);
                        }
                        return Err(err);
                    }
                }
            }
            Ok((start_at, voices))
        })?;

        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;
        let clock = PlaybackClock {
            start_at,
            total: sequence_duration(events),
        };

        tracing::debug!(
            session = handle.0,
            events = events.len(),
            start_at = ?clock.start_at,
            total = ?clock.total,
            "playback scheduled"
        );

        self.active = Some(Session {
            handle,
            state: SessionState::Scheduled,
            clock,
            voices,
            progress: 0.0,
            on_progress: Vec::new(),
            on_complete: Vec::new(),
        });
        Ok(handle)
    }

    /// Cancels `handle` if it is the active session; otherwise does nothing.
    ///
    /// Once this returns no callback of the session fires again and all of
    /// its voices are released.
    pub fn stop(&mut self, handle: SessionHandle) {
        if self.active_handle() == Some(handle) {
            self.stop_active();
        }
    }

    /// Cancels whichever session is active, if any.
    pub fn stop_active(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };

        for id in &session.voices {
            if let Err(err) = self.engine.stop_voice(*id) {
                tracing::debug!(voice = id.get(), %err, "voice already released");
            }
        }

        tracing::debug!(
            session = session.handle.0,
            progress = session.progress,
            "playback cancelled"
        );
        self.retired = Some((session.handle, SessionState::Cancelled));
    }

    /// Registers a callback receiving every increase of progress.
    pub fn on_progress(
        &mut self,
        handle: SessionHandle,
        callback: impl FnMut(f64) + Send + 'static,
    ) -> Result<()> {
        let session = self.session_mut(handle)?;
        session.on_progress.push(Box::new(callback));
        Ok(())
    }

    /// Registers a callback fired once when the session plays to the end.
    pub fn on_complete(
        &mut self,
        handle: SessionHandle,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let session = self.session_mut(handle)?;
        session.on_complete.push(Box::new(callback));
        Ok(())
    }

    /// Per-frame progress sampling, driven by the host's frame loop.
    pub fn tick(&mut self) -> FrameRequest {
        let Some(session) = self.active.as_mut() else {
            return FrameRequest::Finished;
        };

        let now = match self.engine.current_time() {
            Ok(now) => now,
            Err(err) => {
                tracing::warn!(%err, "audio clock unavailable, skipping frame");
                return FrameRequest::Continue;
            }
        };

        if session.state == SessionState::Scheduled && now >= session.clock.start_at {
            session.state = SessionState::Playing;
        }

        let progress = session.clock.progress_at(now);
        if progress > session.progress {
            session.progress = progress;
            for callback in &mut session.on_progress {
                callback(progress);
            }
        }

        if session.progress < 1.0 {
            return FrameRequest::Continue;
        }

        if let Some(mut session) = self.active.take() {
            session.state = SessionState::Completed;
            tracing::debug!(session = session.handle.0, "playback completed");
            self.retired = Some((session.handle, SessionState::Completed));
            for callback in session.on_complete.drain(..) {
                callback();
            }
        }
        FrameRequest::Finished
    }

    /// State of `handle`. Sessions older than the last retired one read as
    /// [`SessionState::Idle`].
    pub fn state(&self, handle: SessionHandle) -> SessionState {
        match (&self.active, self.retired) {
            (Some(session), _) if session.handle == handle => session.state,
            (_, Some((retired, state))) if retired == handle => state,
            _ => SessionState::Idle,
        }
    }

    /// Last sampled progress of the active session.
    pub fn progress(&self, handle: SessionHandle) -> Option<f64> {
        self.active
            .as_ref()
            .filter(|session| session.handle == handle)
            .map(|session| session.progress)
    }

    /// Audio clock time at which the active session's first event starts.
    pub fn session_start(&self, handle: SessionHandle) -> Option<Duration> {
        self.active
            .as_ref()
            .filter(|session| session.handle == handle)
            .map(|session| session.clock.start_at)
    }

    pub fn active_handle(&self) -> Option<SessionHandle> {
        self.active.as_ref().map(|session| session.handle)
    }

    /// True while a session needs frame callbacks.
    pub fn wants_frame(&self) -> bool {
        self.active.is_some()
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut Session> {
        self.active
            .as_mut()
            .filter(|session| session.handle == handle)
            .ok_or_else(|| SonifyError::invalid("session is not active"))
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop_active();
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("attack", &self.attack)
            .field("lead", &self.lead)
            .field("active", &self.active_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;
    use crate::{
        synth::MixerOutput, AudioOutput, EnvelopeShape, Severity, Waveform,
    };

    const RATE: u32 = 1_000;
    const FRAME: Duration = Duration::from_millis(16);

    fn events(count: u64) -> Vec<SonificationEvent> {
        (0..count)
            .map(|i| SonificationEvent {
                frequency: 110.0 + i as f64 * 10.0,
                start_offset: Duration::from_millis(i * 100),
                event_duration: Duration::from_millis(80),
                waveform: Waveform::Sine,
                envelope_shape: EnvelopeShape::Sustained,
                gain: 0.5,
                wobble: None,
                severity: Severity::Normal,
            })
            .collect()
    }

    fn scheduler() -> (PlaybackScheduler, MixerOutput) {
        let output = MixerOutput::new(RATE);
        let scheduler = PlaybackScheduler::new(AudioEngine::new(output.clone()))
            .with_lead(Duration::from_millis(20));
        (scheduler, output)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(f64) + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn run_frames(scheduler: &mut PlaybackScheduler, output: &MixerOutput, frames: usize) {
        for _ in 0..frames {
            output.advance(FRAME).unwrap();
            scheduler.tick();
        }
    }

    #[test]
    fn plays_to_completion_with_monotonic_progress() {
        let (mut scheduler, output) = scheduler();
        let handle = scheduler.start(&events(3)).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        scheduler
            .on_progress(handle, move |progress| sink.lock().unwrap().push(progress))
            .unwrap();
        let completions = Arc::new(AtomicUsize::new(0));
        let done = completions.clone();
        scheduler
            .on_complete(handle, move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(scheduler.state(handle), SessionState::Scheduled);

        let mut frames = 0;
        loop {
            output.advance(FRAME).unwrap();
            frames += 1;
            if scheduler.tick() == FrameRequest::Finished {
                break;
            }
            assert!(frames < 100, "playback never finished");
        }

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
        assert!(seen.iter().all(|progress| (0.0..=1.0).contains(progress)));
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.state(handle), SessionState::Completed);

        run_frames(&mut scheduler, &output, 5);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!scheduler.wants_frame());
    }

    #[test]
    fn progress_waits_for_schedule_lead() {
        let (mut scheduler, output) = scheduler();
        let handle = scheduler.start(&events(2)).unwrap();

        output.advance(Duration::from_millis(10)).unwrap();
        assert_eq!(scheduler.tick(), FrameRequest::Continue);
        assert_eq!(scheduler.state(handle), SessionState::Scheduled);
        assert_eq!(scheduler.progress(handle), Some(0.0));

        output.advance(Duration::from_millis(50)).unwrap();
        scheduler.tick();
        assert_eq!(scheduler.state(handle), SessionState::Playing);
        assert!(scheduler.progress(handle).unwrap() > 0.0);
    }

    #[test]
    fn second_start_replaces_first_session() {
        let (mut scheduler, output) = scheduler();
        let first = scheduler.start(&events(4)).unwrap();
        let (first_progress, on_progress) = counter();
        scheduler.on_progress(first, on_progress).unwrap();
        let first_done = Arc::new(AtomicUsize::new(0));
        let done = first_done.clone();
        scheduler
            .on_complete(first, move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        run_frames(&mut scheduler, &output, 3);
        let progress_before = first_progress.load(Ordering::SeqCst);

        let second = scheduler.start(&events(2)).unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.active_handle(), Some(second));
        assert_eq!(scheduler.state(first), SessionState::Cancelled);
        assert_eq!(output.active_voices().unwrap(), 2);

        run_frames(&mut scheduler, &output, 40);
        assert_eq!(first_progress.load(Ordering::SeqCst), progress_before);
        assert_eq!(first_done.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.state(second), SessionState::Completed);
    }

    #[test]
    fn stop_releases_pending_voices_and_silences_callbacks() {
        let (mut scheduler, output) = scheduler();
        let handle = scheduler.start(&events(5)).unwrap();
        let (progress_calls, on_progress) = counter();
        scheduler.on_progress(handle, on_progress).unwrap();
        assert_eq!(output.active_voices().unwrap(), 5);

        scheduler.stop(handle);

        assert_eq!(output.active_voices().unwrap(), 0);
        assert_eq!(scheduler.state(handle), SessionState::Cancelled);
        assert_eq!(scheduler.tick(), FrameRequest::Finished);
        run_frames(&mut scheduler, &output, 50);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 0);
        assert!(output.render(600).unwrap().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut scheduler, output) = scheduler();
        let handle = scheduler.start(&events(2)).unwrap();
        run_frames(&mut scheduler, &output, 2);

        scheduler.stop(handle);
        scheduler.stop(handle);
        scheduler.stop_active();

        assert_eq!(scheduler.state(handle), SessionState::Cancelled);
        assert!(scheduler.on_progress(handle, |_| {}).is_err());
    }

    #[test]
    fn stopping_after_voices_finished_swallows_release_errors() {
        let (mut scheduler, output) = scheduler();
        let handle = scheduler.start(&events(3)).unwrap();

        output.advance(Duration::from_millis(200)).unwrap();
        scheduler.stop(handle);

        assert_eq!(scheduler.state(handle), SessionState::Cancelled);
        assert_eq!(output.active_voices().unwrap(), 0);
    }

    #[test]
    fn empty_events_are_rejected_without_a_session() {
        let (mut scheduler, _output) = scheduler();

        let err = scheduler.start(&[]).unwrap_err();

        assert!(matches!(err, SonifyError::NoPlayableData));
        assert_eq!(scheduler.active_handle(), None);
        scheduler.stop_active();
        assert_eq!(scheduler.tick(), FrameRequest::Finished);
    }

    #[test]
    fn unavailable_audio_leaves_scheduler_idle() {
        let mut scheduler = PlaybackScheduler::new(AudioEngine::unavailable("muted device"));

        let err = scheduler.start(&events(2)).unwrap_err();

        assert!(matches!(err, SonifyError::AudioUnavailable(_)));
        assert!(!scheduler.wants_frame());
    }

    struct FlakyOutput {
        inner: MixerOutput,
        remaining: usize,
    }

    impl AudioOutput for FlakyOutput {
        fn ensure_available(&mut self) -> Result<()> {
            self.inner.ensure_available()
        }

        fn current_time(&self) -> Result<Duration> {
            self.inner.current_time()
        }

        fn start_voice(&mut self, voice: Voice) -> Result<VoiceId> {
            if self.remaining == 0 {
                return Err(SonifyError::unavailable("device disconnected"));
            }
            self.remaining -= 1;
            self.inner.start_voice(voice)
        }

        fn stop_voice(&mut self, id: VoiceId) -> Result<()> {
            self.inner.stop_voice(id)
        }
    }

    #[test]
    fn partial_scheduling_failure_leaks_nothing() {
        let mixer = MixerOutput::new(RATE);
        let engine = AudioEngine::new(FlakyOutput {
            inner: mixer.clone(),
            remaining: 2,
        });
        let mut scheduler = PlaybackScheduler::new(engine);

        let err = scheduler.start(&events(4)).unwrap_err();

        assert!(matches!(err, SonifyError::AudioUnavailable(_)));
        assert_eq!(mixer.active_voices().unwrap(), 0);
        assert_eq!(scheduler.active_handle(), None);
    }

    #[test]
    fn rejects_non_finite_events_before_touching_audio() {
        let (mut scheduler, output) = scheduler();
        let first = scheduler.start(&events(2)).unwrap();
        let mut bad = events(2);
        bad[1].frequency = f64::NAN;

        let err = scheduler.start(&bad).unwrap_err();

        assert!(matches!(err, SonifyError::InvalidArgument(_)));
        assert_eq!(scheduler.active_handle(), Some(first));
        assert_eq!(output.active_voices().unwrap(), 2);
    }

    #[test]
    fn dropping_scheduler_silences_output() {
        let (mut scheduler, output) = scheduler();
        scheduler.start(&events(3)).unwrap();

        drop(scheduler);

        assert_eq!(output.active_voices().unwrap(), 0);
    }

    #[test]
    fn clock_progress_is_clamped() {
        let clock = PlaybackClock {
            start_at: Duration::from_millis(100),
            total: Duration::from_millis(200),
        };

        assert_eq!(clock.progress_at(Duration::ZERO), 0.0);
        assert_eq!(clock.progress_at(Duration::from_millis(200)), 0.5);
        assert_eq!(clock.progress_at(Duration::from_secs(10)), 1.0);
    }
}
