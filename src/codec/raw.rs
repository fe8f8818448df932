//! Loopback codec
//!
//! Regroups PCM into fixed-size units without compressing it. Useful to
//! exercise the streaming path end to end when no AAC encoder is wired in;
//! the ADTS headers still describe AAC LC, so receivers must know they are
//! getting raw PCM.

use bytes::{Bytes, BytesMut};

use crate::codec::adapter::EncoderSettings;
use crate::codec::buffered::FrameEncoder;
use crate::constants::AAC_FRAME_SAMPLES;
use crate::error::CodecError;

pub struct RawPcmEncoder {
    unit_bytes: usize,
    pending: BytesMut,
}

impl RawPcmEncoder {
    pub fn new(unit_bytes: usize) -> Self {
        Self {
            unit_bytes: unit_bytes.max(1),
            pending: BytesMut::new(),
        }
    }

    /// Units the size of one AAC frame of 16-bit PCM
    pub fn for_settings(settings: &EncoderSettings) -> Self {
        Self::new(AAC_FRAME_SAMPLES * settings.channels.max(1) as usize * 2)
    }

    pub fn unit_bytes(&self) -> usize {
        self.unit_bytes
    }
}

impl FrameEncoder for RawPcmEncoder {
    fn encode(&mut self, pcm: &[u8], out: &mut Vec<Bytes>) -> Result<(), CodecError> {
        self.pending.extend_from_slice(pcm);
        while self.pending.len() >= self.unit_bytes {
            out.push(self.pending.split_to(self.unit_bytes).freeze());
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Vec<Bytes>) -> Result<(), CodecError> {
        if !self.pending.is_empty() {
            out.push(self.pending.split().freeze());
        }
        Ok(())
    }
}
