//! Audio level metering

use crate::constants::PCM_FULL_SCALE;

/// RMS of a block of i16 samples, normalized to [0, 1].
///
/// All channels are measured together. An empty block reads as silence.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / PCM_FULL_SCALE as f64;
            v * v
        })
        .sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    // i16::MIN normalizes slightly past -1.0
    rms.min(1.0) as f32
}

/// Per-frame loudness of the unprocessed input
#[derive(Debug, Default, Clone)]
pub struct LevelMeter {
    last: f32,
    frames: u64,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure one frame and remember the result
    pub fn measure(&mut self, samples: &[i16]) -> f32 {
        self.last = rms_level(samples);
        self.frames += 1;
        self.last
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn frames_measured(&self) -> u64 {
        self.frames
    }
}
