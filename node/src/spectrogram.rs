//! Mel-spectrogram synthesis: turns a PCM window into the 32x32 grid the
//! anomaly gate and wire codec operate on.
//!
//! Pipeline per frame: Hann window -> magnitude FFT -> mel filterbank
//! accumulation over the lower half of the spectrum -> log-energy. A
//! post-pass normalizes every cell against the global min/max and flips
//! the grid so low frequencies sit at the bottom row.

use rustfft::{num_complex::Complex, FftPlanner};
use thiserror::Error;
use wire::{Grid, GRID_DIM};

pub const FFT_SIZE: usize = 128;
pub const HOP: usize = 64;
pub const N_MEL_BINS: usize = GRID_DIM;
pub const N_FRAMES: usize = GRID_DIM;
pub const MEL_FMIN_HZ: f32 = 100.0;
pub const MEL_FMAX_HZ: f32 = 8000.0;
pub const SAMPLE_RATE_HZ: f32 = 16_000.0;
const MIN_FRAMES_REQUIRED: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum SpectrogramError {
    #[error("insufficient audio: only {produced} of {required} frames producible")]
    InsufficientAudio { produced: usize, required: usize },
}

/// Precomputed Hann window and mel filterbank, reused across every window
/// processed by the node.
pub struct SpectrogramEngine {
    hann: Vec<f32>,
    /// `[n_fft_bins, N_MEL_BINS]` row-major triangular filter weights.
    filterbank: Vec<f32>,
    n_fft_bins: usize,
}

impl SpectrogramEngine {
    pub fn new() -> Self {
        let n_fft_bins = FFT_SIZE / 2;
        Self {
            hann: hann_window(FFT_SIZE),
            filterbank: linear_to_mel_weight_matrix(
                N_MEL_BINS,
                n_fft_bins,
                SAMPLE_RATE_HZ,
                MEL_FMIN_HZ,
                MEL_FMAX_HZ,
            ),
            n_fft_bins,
        }
    }

    /// Compute the 32x32 log-mel grid for one PCM window.
    pub fn compute(&self, pcm: &[i16]) -> Result<Grid, SpectrogramError> {
        let producible_frames = if pcm.len() < FFT_SIZE {
            0
        } else {
            (pcm.len() - FFT_SIZE) / HOP + 1
        };
        if producible_frames < MIN_FRAMES_REQUIRED {
            return Err(SpectrogramError::InsufficientAudio {
                produced: producible_frames,
                required: MIN_FRAMES_REQUIRED,
            });
        }

        let frames_to_compute = producible_frames.min(N_FRAMES);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let mut buf = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];

        // log_energies[frame][mel_bin], frame-major so padding + flip stay simple.
        let mut log_energies = vec![vec![0.0f32; N_MEL_BINS]; N_FRAMES];

        for frame_idx in 0..frames_to_compute {
            let start = frame_idx * HOP;
            for (i, &sample) in pcm[start..start + FFT_SIZE].iter().enumerate() {
                let windowed = sample as f32 * self.hann[i];
                buf[i] = Complex::new(windowed, 0.0);
            }
            fft.process(&mut buf);

            let magnitudes: Vec<f32> = buf[..self.n_fft_bins].iter().map(|c| c.norm()).collect();

            for mel_bin in 0..N_MEL_BINS {
                let mut energy = 0.0f32;
                for (k, &mag) in magnitudes.iter().enumerate() {
                    energy += mag * self.filterbank[k * N_MEL_BINS + mel_bin];
                }
                log_energies[frame_idx][mel_bin] = (energy + 1e-10).ln();
            }
        }

        let mut min_val = f32::INFINITY;
        let mut max_val = f32::NEG_INFINITY;
        for frame in &log_energies[..frames_to_compute] {
            for &v in frame {
                min_val = min_val.min(v);
                max_val = max_val.max(v);
            }
        }

        for frame in log_energies.iter_mut().skip(frames_to_compute) {
            frame.fill(min_val);
        }

        let range = (max_val - min_val).max(f32::EPSILON);
        let mut grid = Grid::zeroed();
        for frame_idx in 0..N_FRAMES {
            for mel_bin in 0..N_MEL_BINS {
                let normalized = 255.0 * (log_energies[frame_idx][mel_bin] - min_val) / range;
                let pixel = normalized.round().clamp(0.0, 255.0) as u8;
                // Flip vertically: highest frequency (last mel bin) -> row 0.
                let row = N_MEL_BINS - 1 - mel_bin;
                grid.set(row, frame_idx, pixel);
            }
        }

        Ok(grid)
    }
}

impl Default for SpectrogramEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = std::f32::consts::PI * 2.0 * i as f32 / n as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}

/// HTK mel scale triangular filterbank, `[n_fft_bins, n_mels]` row-major,
/// with the DC bin zeroed as in `tf.signal.linear_to_mel_weight_matrix`.
fn linear_to_mel_weight_matrix(
    n_mels: usize,
    n_fft_bins: usize,
    sample_rate: f32,
    fmin: f32,
    fmax: f32,
) -> Vec<f32> {
    let hz_to_mel = |f: f32| -> f32 { 1127.0 * (1.0 + f / 700.0).ln() };

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    let n_edges = n_mels + 2;
    let mel_edges: Vec<f32> = (0..n_edges)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_edges - 1) as f32)
        .collect();

    let nyquist = sample_rate / 2.0;
    let fft_freqs: Vec<f32> = (0..n_fft_bins)
        .map(|i| i as f32 * nyquist / (n_fft_bins - 1) as f32)
        .collect();
    let fft_mels: Vec<f32> = fft_freqs.iter().map(|&f| hz_to_mel(f)).collect();

    let mut weights = vec![0.0f32; n_fft_bins * n_mels];
    for m in 0..n_mels {
        let lower = mel_edges[m];
        let center = mel_edges[m + 1];
        let upper = mel_edges[m + 2];

        for b in 1..n_fft_bins {
            let mel_f = fft_mels[b];
            let lower_slope = if (center - lower).abs() > f32::EPSILON {
                (mel_f - lower) / (center - lower)
            } else {
                0.0
            };
            let upper_slope = if (upper - center).abs() > f32::EPSILON {
                (upper - mel_f) / (upper - center)
            } else {
                0.0
            };
            let weight = lower_slope.min(upper_slope).max(0.0);
            weights[b * n_mels + m] = weight;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_tone(freq_hz: f32, n_samples: usize) -> Vec<i16> {
        (0..n_samples)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE_HZ;
                (8000.0 * (2.0 * std::f32::consts::PI * freq_hz * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn produces_32x32_grid_for_sufficient_audio() {
        let engine = SpectrogramEngine::new();
        let pcm = synthetic_tone(1000.0, 16_000);
        let grid = engine.compute(&pcm).expect("enough audio for a full grid");
        assert_eq!(grid.as_slice().len(), GRID_DIM * GRID_DIM);
    }

    #[test]
    fn rejects_too_short_audio() {
        let engine = SpectrogramEngine::new();
        let pcm = vec![0i16; FFT_SIZE + HOP]; // only 2 producible frames
        assert!(matches!(
            engine.compute(&pcm),
            Err(SpectrogramError::InsufficientAudio { .. })
        ));
    }

    #[test]
    fn short_window_pads_with_minimum_energy() {
        let engine = SpectrogramEngine::new();
        // Exactly MIN_FRAMES_REQUIRED producible frames: FFT_SIZE + (n-1)*HOP
        let n_samples = FFT_SIZE + (MIN_FRAMES_REQUIRED - 1) * HOP;
        let pcm = synthetic_tone(500.0, n_samples);
        let grid = engine.compute(&pcm).expect("minimum viable window");
        // last column should be the padded (minimum-energy) frame, reused
        // across every row at the padding value.
        let last_col_values: Vec<u8> = (0..N_MEL_BINS).map(|r| grid.get(r, N_FRAMES - 1)).collect();
        assert!(last_col_values.iter().all(|&v| v == last_col_values[0]));
    }

    #[test]
    fn filterbank_rows_sum_to_reasonable_weight() {
        let engine = SpectrogramEngine::new();
        // Each fft bin should contribute to at most a couple of adjacent mel bins.
        for row in engine.filterbank.chunks(N_MEL_BINS) {
            let nonzero = row.iter().filter(|&&w| w > 0.0).count();
            assert!(nonzero <= N_MEL_BINS);
        }
    }
}
