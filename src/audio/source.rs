//! Raw PCM frame sources
//!
//! The pipeline pulls fixed-size buffers of interleaved little-endian i16
//! PCM from a [`FrameSource`]. Reads block until data is available.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::audio::frame::f32_to_i16;
use crate::error::AudioError;

/// Pull-based PCM provider
pub trait FrameSource: Send {
    /// Fill `buf` with the next PCM bytes, blocking until available.
    ///
    /// Returns the number of bytes written; zero means nothing was captured
    /// this round and the caller should try again.
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, AudioError>;

    /// Stop capturing and release the underlying device
    fn stop(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        (**self).read_frame(buf)
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        (**self).stop()
    }
}

/// Regroups variable-sized sample chunks from a channel into fixed reads
pub struct ChannelSource {
    rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<i16>>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
        }
    }
}

impl FrameSource for ChannelSource {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let wanted = buf.len() / 2;
        while self.pending.len() < wanted {
            match self.rx.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                // Hand out what is left before reporting the closed source
                Err(_) if !self.pending.is_empty() => break,
                Err(_) => return Err(AudioError::SourceClosed),
            }
        }

        let count = wanted.min(self.pending.len());
        for (sample, pair) in self.pending.drain(..count).zip(buf.chunks_exact_mut(2)) {
            pair.copy_from_slice(&sample.to_le_bytes());
        }
        Ok(count * 2)
    }
}

/// Sine generator for running the pipeline without a capture device
pub struct TestToneSource {
    sample_rate: u32,
    channels: u16,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    /// Sleep so frames arrive at the rate a device would produce them
    paced: bool,
    next_deadline: Option<Instant>,
}

impl TestToneSource {
    pub fn new(sample_rate: u32, channels: u16, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            frequency,
            amplitude,
            phase: 0.0,
            paced: true,
            next_deadline: None,
        }
    }

    /// Produce frames as fast as they are read
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl FrameSource for TestToneSource {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, AudioError> {
        let channels = self.channels as usize;
        let frames = buf.len() / 2 / channels;
        let phase_inc = 2.0 * PI * self.frequency / self.sample_rate as f32;

        for frame in buf.chunks_exact_mut(2 * channels).take(frames) {
            let value = f32_to_i16(self.phase.sin() * self.amplitude);
            for pair in frame.chunks_exact_mut(2) {
                pair.copy_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + phase_inc) % (2.0 * PI);
        }

        if self.paced {
            let period =
                Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64);
            let deadline = self.next_deadline.unwrap_or_else(Instant::now) + period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            self.next_deadline = Some(deadline);
        }

        Ok(frames * channels * 2)
    }
}
