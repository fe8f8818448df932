//! Output volume
//!
//! The user-facing volume is mapped through a cubic curve, which gives finer
//! control near silence than a linear gain, and the result is hard-clipped to
//! full scale.

/// Linear gain for a volume setting
#[inline]
pub fn curve(volume: f32) -> f32 {
    volume * volume * volume
}

/// Scale a sample by an already-curved gain and clip to [-1, 1]
#[inline]
pub fn scale(sample: f32, gain: f32) -> f32 {
    (sample * gain).clamp(-1.0, 1.0)
}

/// Apply `volume` to one sample
#[inline]
pub fn apply(sample: f32, volume: f32) -> f32 {
    scale(sample, curve(volume))
}

/// Apply `volume` to a block of samples in place
pub fn apply_block(samples: &mut [f32], volume: f32) {
    let gain = curve(volume);
    for sample in samples.iter_mut() {
        *sample = scale(*sample, gain);
    }
}
