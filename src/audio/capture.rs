//! Desktop audio capture
//!
//! Runs a cpal input stream on its own thread (cpal streams are not `Send`)
//! and hands the captured samples to the pipeline through a bounded channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{get_default_input_device, get_device_by_id, AudioDevice};
use crate::audio::frame::f32_to_i16;
use crate::audio::source::{ChannelSource, FrameSource};
use crate::error::AudioError;

/// Capture callbacks buffered before new ones are dropped
const CAPTURE_QUEUE_DEPTH: usize = 64;

/// Frame source backed by a capture device
pub struct CaptureSource {
    device_name: String,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
    source: ChannelSource,
    samples_captured: Arc<AtomicU64>,
    overflow_count: Arc<AtomicU64>,
}

impl CaptureSource {
    /// Open `device_id`, or the default input device when `None`, and start
    /// capturing immediately.
    pub fn start(
        device_id: Option<&str>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self, AudioError> {
        let device = match device_id {
            Some(id) => get_device_by_id(id)?,
            None => get_default_input_device()?,
        };
        Self::start_on(device, sample_rate, channels)
    }

    pub fn start_on(device: AudioDevice, sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let device_name = device.name.clone();
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sample_tx, sample_rx) = bounded::<Vec<i16>>(CAPTURE_QUEUE_DEPTH);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let running_for_loop = running.clone();
        let samples_captured = Arc::new(AtomicU64::new(0));
        let overflow_count = Arc::new(AtomicU64::new(0));
        let captured = samples_captured.clone();
        let overflow = overflow_count.clone();

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let stream = cpal_device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        captured.fetch_add(data.len() as u64, Ordering::Relaxed);
                        let chunk: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                        if sample_tx.try_send(chunk).is_err() {
                            overflow.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Dropping the stream stops capture and closes the sample channel
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamError("capture thread exited".to_string()));
            }
        }

        tracing::info!(
            "Capturing from '{}' at {} Hz, {} channel(s)",
            device_name,
            sample_rate,
            channels
        );

        Ok(Self {
            device_name,
            running,
            thread_handle: Some(handle),
            error_rx,
            source: ChannelSource::new(sample_rx),
            samples_captured,
            overflow_count,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn samples_captured(&self) -> u64 {
        self.samples_captured.load(Ordering::Relaxed)
    }

    /// Capture callbacks dropped because the pipeline fell behind
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl FrameSource for CaptureSource {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        if let Some(err) = self.check_errors() {
            return Err(err);
        }
        self.source.read_frame(buf)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.shutdown();
        tracing::debug!(
            "Capture stopped after {} samples, {} dropped callbacks",
            self.samples_captured(),
            self.overflow_count()
        );
        Ok(())
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}
