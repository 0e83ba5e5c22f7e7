//! Audio capture: narrow hardware trait plus the DC-correction / soft-clip
//! stage that turns raw I2S frames into the PCM windows the spectrogram
//! engine consumes.

use std::time::Duration;
use thiserror::Error;

/// One raw 32-bit stereo I2S frame as the driver hands it over.
#[derive(Debug, Clone, Copy, Default)]
pub struct I2sFrame {
    pub left: i32,
    pub right: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio driver unavailable")]
    AudioUnavailable,
}

/// The narrow hardware seam: anything that can hand over a batch of raw
/// I2S frames within a bounded time, or report a driver failure.
pub trait I2sDriver {
    /// Fill `out` with up to `out.len()` frames, blocking at most
    /// `timeout`. Returns the number of frames actually filled.
    fn read_frames(&mut self, out: &mut [I2sFrame], timeout: Duration) -> Result<usize, AudioError>;
}

/// Which I2S channel carries the microphone signal, chosen once at
/// startup by comparing running peaks over the first chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

const SUB_READ_TIMEOUT: Duration = Duration::from_millis(100);
const SOFT_CLIP_THRESHOLD: i32 = 20_000;
const HARD_CLAMP: i32 = 24_000;
// Leaky-integrator time constant for the DC tracker, in bit-shifts: the
// estimate moves 1/64th of the remaining distance to each new sample.
const DC_SHIFT: i32 = 6;

/// Drives an [`I2sDriver`], applying channel detection, mono downmix, DC
/// correction, and soft-clip per window.
pub struct AudioCapture<D: I2sDriver> {
    driver: D,
    channel: Option<Channel>,
    dc_estimate: i32,
}

impl<D: I2sDriver> AudioCapture<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            channel: None,
            dc_estimate: 0,
        }
    }

    /// Block until `length` mono 16-bit samples have been produced,
    /// zero-padding any shortfall from a single underfilled sub-read.
    /// Returns `false` (but still fills the buffer) if the driver ever
    /// returned fewer frames than requested; `AudioUnavailable` is
    /// propagated so the caller can retry the whole read.
    pub fn read(&mut self, out: &mut [i16]) -> Result<bool, AudioError> {
        let mut raw = vec![I2sFrame::default(); out.len()];
        let filled = self.driver.read_frames(&mut raw, SUB_READ_TIMEOUT)?;

        if self.channel.is_none() {
            self.channel = Some(detect_active_channel(&raw[..filled]));
        }
        let channel = self.channel.unwrap_or(Channel::Left);

        for (i, slot) in out.iter_mut().enumerate() {
            *slot = if i < filled {
                let raw_sample = match channel {
                    Channel::Left => raw[i].left,
                    Channel::Right => raw[i].right,
                };
                let downmixed = raw_sample >> 15;
                self.dc_estimate += (downmixed - self.dc_estimate) >> DC_SHIFT;
                soft_clip(downmixed - self.dc_estimate)
            } else {
                0
            };
        }

        Ok(filled >= out.len())
    }
}

fn detect_active_channel(frames: &[I2sFrame]) -> Channel {
    let mut left_peak = 0i64;
    let mut right_peak = 0i64;
    for frame in frames {
        left_peak = left_peak.max(frame.left.unsigned_abs() as i64);
        right_peak = right_peak.max(frame.right.unsigned_abs() as i64);
    }
    if right_peak > left_peak {
        Channel::Right
    } else {
        Channel::Left
    }
}

fn soft_clip(x: i32) -> i16 {
    let clipped = if x.unsigned_abs() > SOFT_CLIP_THRESHOLD as u32 {
        let sign = x.signum();
        sign * (SOFT_CLIP_THRESHOLD + (x.abs() - SOFT_CLIP_THRESHOLD) / 8)
    } else {
        x
    };
    clipped.clamp(-HARD_CLAMP, HARD_CLAMP) as i16
}

/// A synthetic driver standing in for the physical I2S microphone: emits
/// low-level noise by default, or a caller-supplied waveform for testing
/// the anomaly gate end to end.
pub struct SimulatedDriver {
    pub samples: std::collections::VecDeque<i32>,
    pub fail_next: bool,
}

impl SimulatedDriver {
    pub fn silence(n: usize) -> Self {
        Self {
            samples: std::iter::repeat(0).take(n).collect(),
            fail_next: false,
        }
    }

    pub fn from_mono_samples(samples: impl IntoIterator<Item = i32>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            fail_next: false,
        }
    }
}

impl I2sDriver for SimulatedDriver {
    fn read_frames(&mut self, out: &mut [I2sFrame], _timeout: Duration) -> Result<usize, AudioError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(AudioError::AudioUnavailable);
        }
        let mut filled = 0;
        for slot in out.iter_mut() {
            match self.samples.pop_front() {
                Some(sample) => {
                    // Shifted left so the capture stage's `>> 15` downmix
                    // recovers the original magnitude; mono source, so
                    // both channels carry the same signal.
                    let raw = sample << 15;
                    *slot = I2sFrame {
                        left: raw,
                        right: raw,
                    };
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_clip_passes_through_small_values() {
        assert_eq!(soft_clip(1000), 1000);
    }

    #[test]
    fn soft_clip_compresses_above_threshold() {
        let clipped = soft_clip(28_000);
        assert_eq!(clipped, 21_000); // 20000 + (28000-20000)/8
    }

    #[test]
    fn soft_clip_hard_clamps_extreme_values() {
        assert_eq!(soft_clip(200_000), HARD_CLAMP as i16);
        assert_eq!(soft_clip(-200_000), -HARD_CLAMP as i16);
    }

    #[test]
    fn read_zero_pads_underfilled_window() {
        let driver = SimulatedDriver::from_mono_samples(vec![100, 200]);
        let mut capture = AudioCapture::new(driver);
        let mut buf = [0i16; 5];
        let complete = capture.read(&mut buf).unwrap();
        assert!(!complete);
        assert_eq!(&buf[2..], &[0, 0, 0]);
    }

    #[test]
    fn read_propagates_driver_failure() {
        let mut driver = SimulatedDriver::silence(10);
        driver.fail_next = true;
        let mut capture = AudioCapture::new(driver);
        let mut buf = [0i16; 4];
        assert_eq!(capture.read(&mut buf), Err(AudioError::AudioUnavailable));
    }

    #[test]
    fn dc_offset_is_removed_within_invariant_bound() {
        let biased = std::iter::repeat(12_000).take(2_000);
        let driver = SimulatedDriver::from_mono_samples(biased);
        let mut capture = AudioCapture::new(driver);
        let mut buf = [0i16; 2_000];
        capture.read(&mut buf).unwrap();

        let mean: i64 = buf.iter().map(|&s| s as i64).sum::<i64>() / buf.len() as i64;
        assert!(mean.abs() <= 2_000, "window mean {mean} exceeds the DC-correction bound");
    }
}
