//! Tone synthesis: envelopes, oscillators and a voice mixer.
//!
//! The [`Mixer`] counts rendered frames, and that counter is the audio clock
//! every scheduled voice is positioned against. Rendering through
//! [`MixerOutput`] is how both offline export and device callbacks advance
//! time, so event timing never depends on the thread that schedules it.

mod envelope;
mod mixer;

use std::{f64::consts::TAU, time::Duration};

pub use envelope::{EnvelopePoint, GainEnvelope, Ramp, ENVELOPE_FLOOR};
pub use mixer::{Mixer, MixerOutput};

use crate::{SonificationEvent, Waveform, Wobble};

/// A tone positioned on the audio clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub frequency: f64,
    pub waveform: Waveform,
    pub wobble: Option<Wobble>,
    /// Audio clock time at which the voice starts.
    pub start_at: Duration,
    pub envelope: GainEnvelope,
}

impl Voice {
    /// Builds the voice for `event`, starting at `start_at` on the audio clock.
    pub fn from_event(event: &SonificationEvent, start_at: Duration, attack: Duration) -> Self {
        Self {
            frequency: event.frequency,
            waveform: event.waveform,
            wobble: event.wobble,
            start_at,
            envelope: GainEnvelope::new(
                event.envelope_shape,
                event.gain,
                event.event_duration,
                attack,
            ),
        }
    }

    pub fn end_at(&self) -> Duration {
        self.start_at + self.envelope.duration()
    }

    /// Instantaneous frequency `t` seconds into the voice.
    pub fn frequency_at(&self, t: f64) -> f64 {
        match self.wobble {
            Some(wobble) => self.frequency + wobble.depth_hz * (TAU * wobble.rate_hz * t).sin(),
            None => self.frequency,
        }
    }
}

/// Oscillator output for a phase in `[0, 1)`.
pub fn oscillator(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        Waveform::Sawtooth => 2.0 * phase - 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EnvelopeShape, Severity};

    #[test]
    fn oscillators_stay_in_unit_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Triangle,
            Waveform::Sawtooth,
        ] {
            for step in 0..100 {
                let value = oscillator(waveform, step as f64 / 100.0);
                assert!((-1.0..=1.0).contains(&value), "{waveform:?} gave {value}");
            }
        }
    }

    #[test]
    fn voice_copies_event_and_ends_after_duration() {
        let event = SonificationEvent {
            frequency: 440.0,
            start_offset: Duration::from_millis(400),
            event_duration: Duration::from_millis(180),
            waveform: Waveform::Sine,
            envelope_shape: EnvelopeShape::Sustained,
            gain: 0.5,
            wobble: Some(Wobble {
                rate_hz: 1.0,
                depth_hz: 10.0,
            }),
            severity: Severity::Normal,
        };

        let voice = Voice::from_event(&event, Duration::from_secs(1), Duration::from_millis(10));

        assert_eq!(voice.end_at(), Duration::from_millis(1_180));
        assert_eq!(voice.frequency_at(0.0), 440.0);
        assert!((voice.frequency_at(0.25) - 450.0).abs() < 1e-9);
    }
}
