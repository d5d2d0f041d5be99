use std::time::Duration;

use crate::EnvelopeShape;

/// Gain an exponential ramp settles at; exponential curves cannot reach zero.
pub const ENVELOPE_FLOOR: f64 = 1.0e-4;

const PERCUSSIVE_DECAY_END: f64 = 0.3;
const SUSTAINED_RELEASE_START: f64 = 0.7;

/// Curve used to arrive at an [`EnvelopePoint`] from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    Linear,
    Exponential,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopePoint {
    /// Offset from the start of the voice, in seconds.
    pub at: f64,
    pub gain: f64,
    pub ramp: Ramp,
}

/// Breakpoint gain automation for a single voice.
///
/// Every envelope starts silent and ramps up linearly over the attack, so a
/// voice never switches on or off abruptly.
#[derive(Debug, Clone, PartialEq)]
pub struct GainEnvelope {
    points: Vec<EnvelopePoint>,
    duration: Duration,
}

impl GainEnvelope {
    pub fn new(shape: EnvelopeShape, peak: f64, length: Duration, attack: Duration) -> Self {
        let duration = length.as_secs_f64();
        let peak = if peak.is_finite() { peak.max(0.0) } else { 0.0 };
        let attack_end = attack.as_secs_f64().min(duration);

        let mut points = vec![
            EnvelopePoint {
                at: 0.0,
                gain: 0.0,
                ramp: Ramp::Hold,
            },
            EnvelopePoint {
                at: attack_end,
                gain: peak,
                ramp: Ramp::Linear,
            },
        ];

        match shape {
            EnvelopeShape::Percussive => {
                points.push(EnvelopePoint {
                    at: (duration * PERCUSSIVE_DECAY_END).max(attack_end),
                    gain: ENVELOPE_FLOOR,
                    ramp: Ramp::Exponential,
                });
            }
            EnvelopeShape::Sustained => {
                points.push(EnvelopePoint {
                    at: (duration * SUSTAINED_RELEASE_START).max(attack_end),
                    gain: peak,
                    ramp: Ramp::Hold,
                });
                points.push(EnvelopePoint {
                    at: duration,
                    gain: ENVELOPE_FLOOR,
                    ramp: Ramp::Exponential,
                });
            }
        }

        Self {
            points,
            duration: length,
        }
    }

    pub fn points(&self) -> &[EnvelopePoint] {
        &self.points
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn gain_at(&self, offset: Duration) -> f64 {
        self.gain_at_secs(offset.as_secs_f64())
    }

    /// Gain `t` seconds after the voice started; zero outside the voice.
    pub fn gain_at_secs(&self, t: f64) -> f64 {
        if !(0.0..self.duration.as_secs_f64()).contains(&t) {
            return 0.0;
        }

        for pair in self.points.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if t >= to.at {
                continue;
            }
            let span = to.at - from.at;
            let frac = if span > 0.0 { (t - from.at) / span } else { 1.0 };
            return match to.ramp {
                Ramp::Hold => from.gain,
                Ramp::Linear => from.gain + (to.gain - from.gain) * frac,
                Ramp::Exponential if from.gain > 0.0 && to.gain > 0.0 => {
                    from.gain * (to.gain / from.gain).powf(frac)
                }
                Ramp::Exponential => from.gain + (to.gain - from.gain) * frac,
            };
        }

        self.points.last().map(|point| point.gain).unwrap_or(0.0)
    }
}
