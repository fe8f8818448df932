//! Threaded encoder adapter
//!
//! Wraps a synchronous [`FrameEncoder`] in the slot-exchange contract. A
//! fixed pool of input slots circulates between the pipeline and an encoder
//! thread; encoded units queue up until the pipeline polls them.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::codec::adapter::{EncodedPayload, EncoderAdapter, EncoderSettings, InputSlot};
use crate::constants::ENCODER_INPUT_SLOTS;
use crate::error::CodecError;

/// A codec that turns PCM into access units
pub trait FrameEncoder: Send + 'static {
    /// Encode little-endian PCM, pushing every completed access unit
    fn encode(&mut self, pcm: &[u8], out: &mut Vec<Bytes>) -> Result<(), CodecError>;

    /// Emit whatever is still buffered at end of stream
    fn flush(&mut self, _out: &mut Vec<Bytes>) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Encoder statistics
#[derive(Debug, Clone, Default)]
pub struct EncoderStats {
    pub frames_submitted: u64,
    pub payloads_released: u64,
    pub bytes_produced: u64,
}

/// [`EncoderAdapter`] running a [`FrameEncoder`] on its own thread
pub struct BufferedEncoder {
    settings: EncoderSettings,
    free_tx: Sender<InputSlot>,
    free_rx: Receiver<InputSlot>,
    work_tx: Option<Sender<(InputSlot, usize)>>,
    output_rx: Receiver<Result<Bytes, CodecError>>,
    worker: Option<JoinHandle<()>>,
    stats: EncoderStats,
}

impl BufferedEncoder {
    pub fn new<E: FrameEncoder>(settings: EncoderSettings, encoder: E) -> Result<Self, CodecError> {
        Self::with_slots(settings, encoder, ENCODER_INPUT_SLOTS)
    }

    pub fn with_slots<E: FrameEncoder>(
        settings: EncoderSettings,
        mut encoder: E,
        slots: usize,
    ) -> Result<Self, CodecError> {
        if slots == 0 || settings.input_buffer_bytes == 0 {
            return Err(CodecError::EncoderInit(
                "encoder needs at least one non-empty input slot".to_string(),
            ));
        }

        let (free_tx, free_rx) = bounded::<InputSlot>(slots);
        for index in 0..slots {
            free_tx
                .send(InputSlot::new(index, settings.input_buffer_bytes))
                .map_err(|e| CodecError::EncoderInit(e.to_string()))?;
        }
        let (work_tx, work_rx) = bounded::<(InputSlot, usize)>(slots);
        let (output_tx, output_rx) = unbounded::<Result<Bytes, CodecError>>();
        let recycle_tx = free_tx.clone();

        let worker = thread::Builder::new()
            .name("encoder".to_string())
            .spawn(move || {
                let mut units = Vec::new();
                for (slot, len) in work_rx.iter() {
                    let result = encoder.encode(&slot.as_slice()[..len], &mut units);
                    for unit in units.drain(..) {
                        let _ = output_tx.send(Ok(unit));
                    }
                    if let Err(e) = result {
                        let _ = output_tx.send(Err(e));
                    }
                    if recycle_tx.send(slot).is_err() {
                        break;
                    }
                }
                if let Err(e) = encoder.flush(&mut units) {
                    tracing::warn!("Encoder flush failed: {}", e);
                }
                for unit in units.drain(..) {
                    let _ = output_tx.send(Ok(unit));
                }
            })
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        tracing::debug!(
            "Encoder started: {} Hz, {} channel(s), {} bps, {} x {} byte slots",
            settings.sample_rate,
            settings.channels,
            settings.bit_rate,
            slots,
            settings.input_buffer_bytes
        );

        Ok(Self {
            settings,
            free_tx,
            free_rx,
            work_tx: Some(work_tx),
            output_rx,
            worker: Some(worker),
            stats: EncoderStats::default(),
        })
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats.clone()
    }
}

impl EncoderAdapter for BufferedEncoder {
    fn acquire_input_slot(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<InputSlot>, CodecError> {
        if self.work_tx.is_none() {
            return Err(CodecError::Stopped);
        }
        match timeout {
            None => self.free_rx.recv().map(Some).map_err(|_| CodecError::Stopped),
            Some(timeout) => match self.free_rx.recv_timeout(timeout) {
                Ok(slot) => Ok(Some(slot)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(CodecError::Stopped),
            },
        }
    }

    fn submit_input(&mut self, slot: InputSlot, byte_count: usize) -> Result<(), CodecError> {
        if byte_count > slot.capacity() {
            return Err(CodecError::InvalidFrameSize(byte_count));
        }
        if byte_count == 0 {
            return self.free_tx.send(slot).map_err(|_| CodecError::Stopped);
        }
        let work_tx = self.work_tx.as_ref().ok_or(CodecError::Stopped)?;
        work_tx
            .send((slot, byte_count))
            .map_err(|_| CodecError::Stopped)?;
        self.stats.frames_submitted += 1;
        Ok(())
    }

    fn poll_output(&mut self) -> Result<Option<EncodedPayload>, CodecError> {
        match self.output_rx.try_recv() {
            Ok(Ok(unit)) => Ok(Some(EncodedPayload::new(unit))),
            Ok(Err(e)) => Err(e),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn release_output(&mut self, payload: EncodedPayload) {
        self.stats.payloads_released += 1;
        self.stats.bytes_produced += payload.len() as u64;
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        // Closing the work queue ends the encoder thread's loop; it flushes
        // the codec into the output queue before exiting
        self.work_tx.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| CodecError::EncodingFailed("encoder thread panicked".to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        self.finish()
    }
}

impl Drop for BufferedEncoder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
