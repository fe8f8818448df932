//! Interleaved 16-bit PCM frames

/// A slice of interleaved i16 samples
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, channels: u16) -> Self {
        Self { samples, channels }
    }

    /// Decode little-endian PCM bytes. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], channels: u16) -> Self {
        Self::new(decode_le(bytes), channels)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.samples.len() * 2];
        encode_le(&self.samples, &mut out);
        out
    }

    /// Number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Frame duration in microseconds
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        (self.samples_per_channel() as u64 * 1_000_000) / sample_rate as u64
    }
}

/// Little-endian bytes to samples
pub fn decode_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Samples to little-endian bytes. `out` must hold `2 * samples.len()` bytes.
pub fn encode_le(samples: &[i16], out: &mut [u8]) {
    for (sample, pair) in samples.iter().zip(out.chunks_exact_mut(2)) {
        pair.copy_from_slice(&sample.to_le_bytes());
    }
}

/// Float sample in [-1, 1] to i16
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * crate::constants::PCM_FULL_SCALE) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_layout() {
        let frame = AudioFrame::new(vec![1, -2, 0x1234], 1);
        assert_eq!(frame.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
        assert_eq!(AudioFrame::from_le_bytes(&frame.to_le_bytes(), 1), frame);
    }

    #[test]
    fn test_duration() {
        let frame = AudioFrame::new(vec![0; 960], 2);
        assert_eq!(frame.samples_per_channel(), 480);
        assert_eq!(frame.duration_us(48000), 10_000);
    }

    #[test]
    fn test_float_conversion_clamps() {
        assert_eq!(f32_to_i16(1.5), 32767);
        assert_eq!(f32_to_i16(-1.5), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }
}
