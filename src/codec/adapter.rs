//! Encoder boundary
//!
//! The pipeline never sees codec internals. It exchanges buffers with the
//! encoder: it borrows an input slot, fills it with PCM and submits it, then
//! drains whatever encoded payloads are ready. One submission may yield zero,
//! one or several payloads.

use std::time::Duration;

use bytes::Bytes;

use crate::config::StreamConfig;
use crate::error::CodecError;

/// Writable PCM buffer lent out by the encoder
#[derive(Debug)]
pub struct InputSlot {
    index: usize,
    buf: Vec<u8>,
}

impl InputSlot {
    pub fn new(index: usize, capacity: usize) -> Self {
        Self {
            index,
            buf: vec![0u8; capacity],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// One encoded access unit, opaque to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    data: Bytes,
}

impl EncodedPayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// What an encoder is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u32,
    /// Size of each input slot in bytes
    pub input_buffer_bytes: usize,
}

impl From<&StreamConfig> for EncoderSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            bit_rate: config.bit_rate,
            input_buffer_bytes: config.frame_bytes,
        }
    }
}

/// Buffer-exchange contract of an external encoder
pub trait EncoderAdapter: Send {
    /// Borrow a writable input buffer.
    ///
    /// `None` waits until a slot frees up; `Some(timeout)` gives up after
    /// `timeout` and returns `Ok(None)`.
    fn acquire_input_slot(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<InputSlot>, CodecError>;

    /// Hand the first `byte_count` bytes of `slot` to the encoder. A zero
    /// count returns the slot unused.
    fn submit_input(&mut self, slot: InputSlot, byte_count: usize) -> Result<(), CodecError>;

    /// Take the next ready payload without blocking
    fn poll_output(&mut self) -> Result<Option<EncodedPayload>, CodecError>;

    /// Give a payload back once its bytes have been copied out
    fn release_output(&mut self, payload: EncodedPayload);

    /// Signal end of input and wait until every remaining payload, including
    /// any codec tail, is available from [`poll_output`](Self::poll_output).
    ///
    /// No input may be submitted afterwards.
    fn finish(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    /// Stop encoding and release codec resources
    fn stop(&mut self) -> Result<(), CodecError>;
}

impl<E: EncoderAdapter + ?Sized> EncoderAdapter for Box<E> {
    fn acquire_input_slot(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<InputSlot>, CodecError> {
        (**self).acquire_input_slot(timeout)
    }

    fn submit_input(&mut self, slot: InputSlot, byte_count: usize) -> Result<(), CodecError> {
        (**self).submit_input(slot, byte_count)
    }

    fn poll_output(&mut self) -> Result<Option<EncodedPayload>, CodecError> {
        (**self).poll_output()
    }

    fn release_output(&mut self, payload: EncodedPayload) {
        (**self).release_output(payload)
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        (**self).finish()
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        (**self).stop()
    }
}
