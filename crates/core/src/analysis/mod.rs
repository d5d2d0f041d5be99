use std::{f32::consts::PI, fmt, sync::Arc, time::Duration};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Result, SonificationEvent, SonifyError};

/// Windows quieter than this are reported without a measured pitch.
const SILENCE_RMS: f32 = 1.0e-3;

/// Measurement for one scheduled event inside a rendered buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneReport {
    pub event_index: usize,
    pub expected_hz: f64,
    pub measured_hz: Option<f32>,
    pub rms: f32,
}

impl ToneReport {
    /// Relative pitch error, if a pitch was measured.
    pub fn deviation(&self) -> Option<f64> {
        self.measured_hz
            .map(|measured| (measured as f64 - self.expected_hz).abs() / self.expected_hz)
    }
}

/// Spectral checks over rendered mono PCM.
///
/// Plans are cached per window length, so analysing many equally sized
/// windows reuses one FFT.
pub struct ToneAnalyzer {
    sample_rate: u32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl ToneAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Strongest non-DC frequency in `samples`, refined by parabolic
    /// interpolation around the peak bin.
    pub fn dominant_frequency(&mut self, samples: &[f32]) -> Result<f32> {
        if samples.len() < 2 {
            return Err(SonifyError::invalid(
                "spectral analysis requires at least two samples",
            ));
        }

        let len = samples.len();
        let bin_hz = self.sample_rate as f32 / len as f32;
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let magnitudes: Vec<f32> = fft.spectrum.iter().map(|bin| bin.norm()).collect();
        let Some((peak, _)) = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            return Ok(0.0);
        };

        let offset = match (magnitudes.get(peak - 1), magnitudes.get(peak + 1)) {
            (Some(&left), Some(&right)) => {
                let centre = magnitudes[peak];
                let denominator = left - 2.0 * centre + right;
                if denominator.abs() > f32::EPSILON {
                    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        Ok((peak as f32 + offset) * bin_hz)
    }

    /// Measures every event's window in a buffer whose first sample sits at
    /// `buffer_start` on the audio clock.
    ///
    /// Only the middle half of each event is analysed so envelope ramps do
    /// not smear the spectrum.
    pub fn analyse_events(
        &mut self,
        samples: &[f32],
        buffer_start: Duration,
        session_start: Duration,
        events: &[SonificationEvent],
    ) -> Result<Vec<ToneReport>> {
        let rate = self.sample_rate as f64;
        let to_frame = |at: Duration| -> usize {
            let relative = at.saturating_sub(buffer_start).as_secs_f64();
            ((relative * rate).round() as usize).min(samples.len())
        };

        let mut reports = Vec::with_capacity(events.len());
        for (event_index, event) in events.iter().enumerate() {
            let start = session_start + event.start_offset;
            let quarter = event.event_duration / 4;
            let from = to_frame(start + quarter);
            let to = to_frame(start + quarter * 3);
            let window = &samples[from..to.max(from)];

            let rms = if window.is_empty() {
                0.0
            } else {
                compute_rms(window)
            };
            let measured_hz = if window.len() >= 2 && rms > SILENCE_RMS {
                Some(self.dominant_frequency(window)?)
            } else {
                None
            };

            reports.push(ToneReport {
                event_index,
                expected_hz: event.frequency,
                measured_hz,
                rms,
            });
        }

        tracing::debug!(events = reports.len(), "analysed rendered events");
        Ok(reports)
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let planner = &mut self.fft_planner;
        let fft = self
            .fft
            .take()
            .filter(|fft| fft.size == size)
            .unwrap_or_else(|| {
                let plan = planner.plan_fft_forward(size);
                FftResources {
                    size,
                    scratch: plan.make_scratch_vec(),
                    spectrum: plan.make_output_vec(),
                    input: plan.make_input_vec(),
                    plan,
                }
            });
        self.fft.insert(fft)
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for ToneAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToneAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

pub fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
