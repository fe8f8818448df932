//! Streaming session
//!
//! A [`StreamSession`] owns one worker thread that runs the [`Pipeline`]
//! loop: pull a PCM frame, meter it, shape it, hand it to the encoder, then
//! frame and send whatever encoded units are ready.
//!
//! ```text
//! Idle ──▶ Connecting ──▶ Streaming ──▶ Stopped
//!               │              │
//!               └──────────────┴──────▶ Failed
//! ```
//!
//! Both terminal states go through the same teardown, and every step of it
//! is attempted even when an earlier one fails.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::audio::frame::{encode_le, AudioFrame};
use crate::audio::source::FrameSource;
use crate::codec::adapter::{EncoderAdapter, EncoderSettings};
use crate::config::StreamConfig;
use crate::control::{SharedControls, ToneSettings};
use crate::dsp::{shape_block, LevelMeter, ToneFilter};
use crate::error::{AudioError, CodecError, Error, Result};
use crate::events::{ConnectionStatus, EventBus};
use crate::network::NetworkSink;
use crate::protocol::adts::AdtsFramer;

/// How long one slot wait may block before cancellation is checked again
const SLOT_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Connecting = 1,
    Streaming = 2,
    Stopped = 3,
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Idle,
            1 => PipelineState::Connecting,
            2 => PipelineState::Streaming,
            3 => PipelineState::Stopped,
            _ => PipelineState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed)
    }
}

/// Lock-free view of a pipeline's state, readable from any thread
#[derive(Debug, Clone)]
pub struct StateCell(Arc<AtomicU8>);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PipelineState::Idle as u8)))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: PipelineState) {
        let previous = PipelineState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::info!("Pipeline {:?} -> {:?}", previous, state);
        }
    }
}

/// Why the streaming loop ended
enum Exit {
    Cancelled,
    SourceEnded,
    Failed(Error),
}

/// The streaming loop and the resources it owns exclusively
pub struct Pipeline<S, E> {
    config: StreamConfig,
    source: S,
    encoder: E,
    controls: SharedControls,
    events: EventBus,
    state: StateCell,
}

impl<S: FrameSource, E: EncoderAdapter> Pipeline<S, E> {
    pub fn new(
        config: StreamConfig,
        source: S,
        encoder: E,
        controls: SharedControls,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            source,
            encoder,
            controls,
            events,
            state: StateCell::new(),
        }
    }

    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Connect, stream until cancelled or failed, then tear down.
    ///
    /// Returns `Ok(())` when the session stopped normally.
    pub fn run(mut self) -> Result<()> {
        self.state.set(PipelineState::Connecting);
        let endpoint = self.config.endpoint();
        tracing::info!("Connecting to {}", endpoint);

        let connected = NetworkSink::connect(
            &endpoint,
            self.config.connect_timeout(),
            self.config.write_timeout(),
            self.events.clone(),
        );

        let (exit, sink) = match connected {
            Ok(mut sink) => {
                self.state.set(PipelineState::Streaming);
                (self.stream(&mut sink), Some(sink))
            }
            Err(e) => (Exit::Failed(e.into()), None),
        };

        let result = match exit {
            Exit::Cancelled | Exit::SourceEnded => {
                self.state.set(PipelineState::Stopped);
                Ok(())
            }
            Exit::Failed(e) => {
                tracing::error!("Streaming to {} failed: {}", endpoint, e);
                self.events
                    .status(ConnectionStatus::Error(error_detail(&e)));
                self.state.set(PipelineState::Failed);
                Err(e)
            }
        };

        self.teardown(sink);
        result
    }

    fn stream(&mut self, sink: &mut NetworkSink) -> Exit {
        let framer = AdtsFramer::new(self.config.sample_rate, self.config.channels);
        let mut tone = ToneFilter::with_frequencies(
            self.config.sample_rate,
            self.config.bass_frequency,
            self.config.treble_frequency,
        );
        let mut meter = LevelMeter::new();
        let mut seen = self.controls.generation();
        let mut settings = self.controls.snapshot();
        tone.set_gains(settings.bass_db, settings.treble_db);
        tracing::info!(
            "Streaming {} Hz, {} channel(s), {} byte frames ({:?} each)",
            self.config.sample_rate,
            self.config.channels,
            self.config.frame_bytes,
            self.config.frame_duration()
        );

        loop {
            if self.controls.is_stop_requested() {
                return Exit::Cancelled;
            }
            if let Some(fresh) = self.controls.changed_since(&mut seen) {
                apply_settings(&mut tone, &mut settings, fresh);
            }

            let mut slot = match self.acquire_slot() {
                Ok(Some(slot)) => slot,
                Ok(None) => return Exit::Cancelled,
                Err(e) => return Exit::Failed(e.into()),
            };

            let frame_len = self.config.frame_bytes.min(slot.capacity());
            let read = match self.source.read_frame(&mut slot.as_mut_slice()[..frame_len]) {
                Ok(read) => read & !1,
                Err(AudioError::SourceClosed) => {
                    tracing::info!("Audio source closed");
                    self.return_slot(slot);
                    return match self.finish_encoding(&framer, sink) {
                        Ok(()) => Exit::SourceEnded,
                        Err(e) => Exit::Failed(e),
                    };
                }
                Err(e) => {
                    self.return_slot(slot);
                    return Exit::Failed(e.into());
                }
            };

            if read > 0 {
                let pcm = &mut slot.as_mut_slice()[..read];
                let mut frame = AudioFrame::from_le_bytes(pcm, self.config.channels);

                self.events.level(meter.measure(&frame.samples));
                shape_block(&mut frame.samples, &mut tone, settings.volume);
                encode_le(&frame.samples, pcm);
            }

            if let Err(e) = self.encoder.submit_input(slot, read) {
                return Exit::Failed(e.into());
            }
            if let Err(e) = self.drain(&framer, sink) {
                return Exit::Failed(e);
            }
        }
    }

    /// Wait for an input slot, giving up if cancellation is requested
    fn acquire_slot(&mut self) -> std::result::Result<Option<crate::codec::InputSlot>, CodecError> {
        loop {
            if let Some(slot) = self.encoder.acquire_input_slot(Some(SLOT_WAIT))? {
                return Ok(Some(slot));
            }
            if self.controls.is_stop_requested() {
                return Ok(None);
            }
        }
    }

    fn return_slot(&mut self, slot: crate::codec::InputSlot) {
        if let Err(e) = self.encoder.submit_input(slot, 0) {
            tracing::warn!("Failed to return input slot: {}", e);
        }
    }

    /// End of input: let the encoder flush, then send everything it produced
    fn finish_encoding(&mut self, framer: &AdtsFramer, sink: &mut NetworkSink) -> Result<()> {
        self.encoder.finish()?;
        self.drain(framer, sink)
    }

    /// Frame and send every payload the encoder has ready, in order
    fn drain(&mut self, framer: &AdtsFramer, sink: &mut NetworkSink) -> Result<()> {
        while let Some(payload) = self.encoder.poll_output()? {
            let framed = framer.frame(payload.as_bytes());
            self.encoder.release_output(payload);
            sink.write(&framed?)?;
        }
        Ok(())
    }

    fn teardown(&mut self, sink: Option<NetworkSink>) {
        if let Err(e) = self.encoder.stop() {
            tracing::warn!("Failed to stop encoder: {}", e);
        }
        if let Err(e) = self.source.stop() {
            tracing::warn!("Failed to stop audio source: {}", e);
        }
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close() {
                tracing::warn!("Failed to close connection: {}", e);
            }
            tracing::info!(
                "Session sent {} bytes to {}",
                sink.stats().total_bytes(),
                sink.peer()
            );
        }
        self.events.status(ConnectionStatus::NotConnected);
    }
}

fn apply_settings(tone: &mut ToneFilter, current: &mut ToneSettings, fresh: ToneSettings) {
    tracing::debug!(
        "Applying volume {:.2}, bass {:+.1} dB, treble {:+.1} dB",
        fresh.volume,
        fresh.bass_db,
        fresh.treble_db
    );
    tone.set_gains(fresh.bass_db, fresh.treble_db);
    *current = fresh;
}

/// The innermost message of an error, as shown after "Error: "
fn error_detail(error: &Error) -> String {
    match error {
        Error::Audio(e) => e.to_string(),
        Error::Codec(e) => e.to_string(),
        Error::Network(e) => e.to_string(),
        Error::Config(msg) => msg.clone(),
        Error::Io(e) => e.to_string(),
    }
}

/// Handle to a running stream
pub struct StreamSession {
    controls: SharedControls,
    state: StateCell,
    worker: Option<JoinHandle<Result<()>>>,
}

impl StreamSession {
    /// Validate `config`, build the encoder and start streaming on a new
    /// worker thread.
    ///
    /// Setup failures publish one error event and return before anything
    /// connects.
    pub fn start<S, E, F>(
        config: StreamConfig,
        source: S,
        make_encoder: F,
        events: EventBus,
    ) -> Result<Self>
    where
        S: FrameSource + 'static,
        E: EncoderAdapter + 'static,
        F: FnOnce(&EncoderSettings) -> std::result::Result<E, CodecError>,
    {
        let setup = config.validate().and_then(|()| {
            let settings = EncoderSettings::from(&config);
            make_encoder(&settings).map_err(Error::from)
        });
        let encoder = match setup {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!("Session setup failed: {}", e);
                events.status(ConnectionStatus::Error(error_detail(&e)));
                return Err(e);
            }
        };

        let controls = SharedControls::new(ToneSettings::from(&config));
        let pipeline = Pipeline::new(config, source, encoder, controls.clone(), events);
        let state = pipeline.state();

        let worker = thread::Builder::new()
            .name("stream".to_string())
            .spawn(move || pipeline.run())?;

        Ok(Self {
            controls,
            state,
            worker: Some(worker),
        })
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    pub fn set_volume(&self, volume: f32) -> bool {
        self.controls.set_volume(volume)
    }

    pub fn set_tone(&self, bass_db: f32, treble_db: f32) -> bool {
        self.controls.set_tone(bass_db, treble_db)
    }

    /// Ask the worker to stop after its current iteration
    pub fn stop(&self) {
        self.controls.request_stop();
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Block until the worker exits and return its final state
    pub fn wait(mut self) -> Result<PipelineState> {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(Ok(())) => Ok(self.state.get()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "stream worker panicked",
                ))),
            },
            None => Ok(self.state.get()),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.controls.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{ChannelSource, TestToneSource};
    use crate::codec::adapter::{EncodedPayload, InputSlot};
    use crate::codec::{BufferedEncoder, RawPcmEncoder};
    use crate::events::StreamEvent;
    use crate::protocol::adts::{self, AdtsReader};
    use crossbeam_channel::{bounded, unbounded, Receiver};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::atomic::AtomicBool;

    /// Synchronous encoder: every submitted frame yields one fixed-size payload
    /// made of the frame's first bytes.
    struct EchoEncoder {
        payload_len: usize,
        slot: Option<InputSlot>,
        ready: VecDeque<EncodedPayload>,
        submitted: Arc<Mutex<Vec<Vec<u8>>>>,
        stopped: Arc<AtomicBool>,
        fail_stop: bool,
    }

    impl EchoEncoder {
        fn new(settings: &EncoderSettings, payload_len: usize) -> Self {
            Self {
                payload_len,
                slot: Some(InputSlot::new(0, settings.input_buffer_bytes)),
                ready: VecDeque::new(),
                submitted: Arc::default(),
                stopped: Arc::default(),
                fail_stop: false,
            }
        }
    }

    impl EncoderAdapter for EchoEncoder {
        fn acquire_input_slot(
            &mut self,
            _timeout: Option<Duration>,
        ) -> std::result::Result<Option<InputSlot>, CodecError> {
            Ok(self.slot.take())
        }

        fn submit_input(
            &mut self,
            slot: InputSlot,
            byte_count: usize,
        ) -> std::result::Result<(), CodecError> {
            if byte_count > 0 {
                let pcm = slot.as_slice()[..byte_count].to_vec();
                self.ready
                    .push_back(EncodedPayload::new(pcm[..self.payload_len.min(byte_count)].to_vec()));
                self.submitted.lock().push(pcm);
            }
            self.slot = Some(slot);
            Ok(())
        }

        fn poll_output(&mut self) -> std::result::Result<Option<EncodedPayload>, CodecError> {
            Ok(self.ready.pop_front())
        }

        fn release_output(&mut self, _payload: EncodedPayload) {}

        fn stop(&mut self) -> std::result::Result<(), CodecError> {
            self.stopped.store(true, Ordering::SeqCst);
            if self.fail_stop {
                return Err(CodecError::EncodingFailed("codec wedged".to_string()));
            }
            Ok(())
        }
    }

    /// Wraps a source and records whether teardown stopped it
    struct TrackedSource<S> {
        inner: S,
        stopped: Arc<AtomicBool>,
    }

    impl<S: FrameSource> FrameSource for TrackedSource<S> {
        fn read_frame(&mut self, buf: &mut [u8]) -> std::result::Result<usize, AudioError> {
            self.inner.read_frame(buf)
        }

        fn stop(&mut self) -> std::result::Result<(), AudioError> {
            self.stopped.store(true, Ordering::SeqCst);
            self.inner.stop()
        }
    }

    fn local_config(port: u16, channels: u16) -> StreamConfig {
        StreamConfig {
            server_address: "127.0.0.1".to_string(),
            server_port: port,
            sample_rate: 44100,
            channels,
            frame_bytes: 2048,
            connect_timeout_ms: 2000,
            ..StreamConfig::default()
        }
    }

    fn collect_events(rx: &Receiver<StreamEvent>) -> Vec<StreamEvent> {
        rx.try_iter().collect()
    }

    fn silent_source(samples: usize) -> ChannelSource {
        let (tx, rx) = bounded(1);
        tx.send(vec![0i16; samples]).unwrap();
        ChannelSource::new(rx)
    }

    #[test]
    fn test_silent_frame_end_to_end() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).unwrap();
            wire
        });

        let events = EventBus::new();
        let rx = events.subscribe();
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let submitted_log = submitted.clone();

        let session = StreamSession::start(
            local_config(port, 1),
            silent_source(1024),
            move |settings| {
                let mut encoder = EchoEncoder::new(settings, 100);
                encoder.submitted = submitted_log;
                Ok(encoder)
            },
            events,
        )
        .unwrap();

        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);
        let wire = receiver.join().unwrap();

        assert_eq!(wire.len(), 107);
        assert_eq!(&wire[..7], &[0xFF, 0xF1, 0x50, 0x40, 0x0D, 0x7F, 0xFC]);
        assert_eq!(
            &wire[..7],
            &adts::build_header(100, adts::sample_rate_index(44100), 1).unwrap()
        );
        assert!(wire[7..].iter().all(|&b| b == 0));

        let submitted = submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 2048);
        assert!(submitted[0].iter().all(|&b| b == 0));

        assert_eq!(
            collect_events(&rx),
            vec![
                StreamEvent::Status(ConnectionStatus::Connected),
                StreamEvent::Level(0.0),
                StreamEvent::Status(ConnectionStatus::NotConnected),
            ]
        );
    }

    #[test]
    fn test_volume_change_applies_to_later_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).unwrap();
            wire
        });

        let (tx, rx) = bounded(4);
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let submitted_log = submitted.clone();
        let session = StreamSession::start(
            local_config(port, 2),
            ChannelSource::new(rx),
            move |settings| {
                let mut encoder = EchoEncoder::new(settings, 4);
                encoder.submitted = submitted_log;
                Ok(encoder)
            },
            EventBus::new(),
        )
        .unwrap();

        tx.send(vec![16384i16; 1024]).unwrap();
        while submitted.lock().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(session.set_volume(0.0));
        // Changes are applied at the top of the next iteration, which is
        // already waiting in read_frame; a second frame is needed to cross it
        tx.send(vec![16384i16; 1024]).unwrap();
        tx.send(vec![16384i16; 1024]).unwrap();
        drop(tx);

        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);
        receiver.join().unwrap();

        let submitted = submitted.lock();
        assert_eq!(submitted.len(), 3);
        let first = i16::from_le_bytes([submitted[0][0], submitted[0][1]]);
        assert!((first as i32 - 16384).abs() <= 1);
        assert!(submitted[2].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_connect_failure_fails_and_tears_down() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let events = EventBus::new();
        let rx = events.subscribe();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_flag = stopped.clone();

        let session = StreamSession::start(
            local_config(port, 2),
            silent_source(2048),
            move |settings| {
                let mut encoder = EchoEncoder::new(settings, 16);
                encoder.stopped = stopped_flag;
                Ok(encoder)
            },
            events,
        )
        .unwrap();
        let state = session.state_cell();

        assert!(matches!(
            session.wait(),
            Err(Error::Network(crate::error::NetworkError::ConnectionFailed(_)))
        ));
        assert_eq!(state.get(), PipelineState::Failed);
        assert!(stopped.load(Ordering::SeqCst));

        let events = collect_events(&rx);
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Status(ConnectionStatus::Error(_)) => {}
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(
            events[1],
            StreamEvent::Status(ConnectionStatus::NotConnected)
        );
    }

    #[test]
    fn test_setup_error_emits_single_event() {
        let events = EventBus::new();
        let rx = events.subscribe();
        let config = StreamConfig {
            channels: 6,
            ..StreamConfig::default()
        };

        let result = StreamSession::start(
            config,
            silent_source(16),
            |settings| Ok(EchoEncoder::new(settings, 16)),
            events,
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let events = collect_events(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            StreamEvent::Status(ConnectionStatus::Error(_))
        ));
    }

    #[test]
    fn test_encoder_init_failure_is_setup_error() {
        let result = StreamSession::start(
            StreamConfig::default(),
            silent_source(16),
            |_| -> std::result::Result<EchoEncoder, CodecError> {
                Err(CodecError::EncoderInit("no codec".to_string()))
            },
            EventBus::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Codec(CodecError::EncoderInit(_)))
        ));
    }

    #[test]
    fn test_peer_hangup_fails_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let events = EventBus::new();
        let rx = events.subscribe();
        // Level events arrive faster than the bus queue holds them
        let collector = thread::spawn(move || rx.iter().collect::<Vec<_>>());
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_flag = stopped.clone();

        let source = TestToneSource::new(44100, 2, 440.0, 0.5).unpaced();
        let session = StreamSession::start(
            local_config(port, 2),
            source,
            move |settings| {
                let mut encoder = EchoEncoder::new(settings, 2048);
                encoder.stopped = stopped_flag;
                Ok(encoder)
            },
            events,
        )
        .unwrap();
        let state = session.state_cell();
        acceptor.join().unwrap();

        assert!(matches!(
            session.wait(),
            Err(Error::Network(crate::error::NetworkError::SendFailed(_)))
        ));
        assert_eq!(state.get(), PipelineState::Failed);
        assert!(stopped.load(Ordering::SeqCst));

        let statuses: Vec<_> = collector
            .join()
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect();
        let tail = &statuses[statuses.len().saturating_sub(2)..];
        assert_eq!(tail.len(), 2);
        match &tail[0] {
            ConnectionStatus::Error(detail) => assert!(!detail.is_empty()),
            other => panic!("expected error status, got {:?}", other),
        }
        assert_eq!(tail[1], ConnectionStatus::NotConnected);
    }

    #[test]
    fn test_teardown_continues_after_encoder_stop_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).unwrap();
            wire
        });

        let events = EventBus::new();
        let rx = events.subscribe();
        let source_stopped = Arc::new(AtomicBool::new(false));
        let source = TrackedSource {
            inner: silent_source(1024),
            stopped: source_stopped.clone(),
        };

        let session = StreamSession::start(
            local_config(port, 1),
            source,
            |settings| {
                let mut encoder = EchoEncoder::new(settings, 100);
                encoder.fail_stop = true;
                Ok(encoder)
            },
            events,
        )
        .unwrap();

        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);
        assert!(source_stopped.load(Ordering::SeqCst));
        // The connection was still closed, so the peer saw end of stream
        assert_eq!(receiver.join().unwrap().len(), 107);
        assert_eq!(
            collect_events(&rx).last(),
            Some(&StreamEvent::Status(ConnectionStatus::NotConnected))
        );
    }

    #[test]
    fn test_level_is_measured_before_volume() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).unwrap();
            wire
        });

        let (tx, rx) = bounded(1);
        tx.send(vec![16384i16; 1024]).unwrap();
        drop(tx);

        let events = EventBus::new();
        let event_rx = events.subscribe();
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let submitted_log = submitted.clone();
        let config = StreamConfig {
            volume: 0.0,
            ..local_config(port, 1)
        };

        let session = StreamSession::start(
            config,
            ChannelSource::new(rx),
            move |settings| {
                let mut encoder = EchoEncoder::new(settings, 16);
                encoder.submitted = submitted_log;
                Ok(encoder)
            },
            events,
        )
        .unwrap();

        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);
        receiver.join().unwrap();

        let levels: Vec<f32> = collect_events(&event_rx)
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Level(level) => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(levels.len(), 1);
        assert!((levels[0] - 0.5).abs() < 0.01);

        let submitted = submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_source_end_delivers_encoder_tail() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut wire = Vec::new();
            stream.read_to_end(&mut wire).unwrap();
            let mut reader = AdtsReader::new();
            reader.push(&wire);
            let mut payload_bytes = 0;
            while let Some((header, _)) = reader.next_frame().unwrap() {
                payload_bytes += header.payload_len();
            }
            assert_eq!(reader.buffered(), 0);
            payload_bytes
        });

        let (tx, rx) = unbounded();
        for _ in 0..8 {
            tx.send(vec![100i16; 1024]).unwrap();
        }
        tx.send(vec![100i16; 300]).unwrap();
        drop(tx);

        let session = StreamSession::start(
            local_config(port, 1),
            ChannelSource::new(rx),
            |settings| BufferedEncoder::new(*settings, RawPcmEncoder::for_settings(settings)),
            EventBus::new(),
        )
        .unwrap();

        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);
        // 8 full units plus the 300-sample tail flushed at end of input
        assert_eq!(receiver.join().unwrap(), (8 * 1024 + 300) * 2);
    }

    #[test]
    fn test_stop_with_threaded_encoder() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = AdtsReader::new();
            let mut buf = [0u8; 4096];
            let mut frames = 0;
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        reader.push(&buf[..n]);
                        while let Ok(Some(_)) = reader.next_frame() {
                            frames += 1;
                        }
                    }
                }
            }
            frames
        });

        let events = EventBus::new();
        let rx = events.subscribe();
        let session = StreamSession::start(
            local_config(port, 2),
            TestToneSource::new(44100, 2, 440.0, 0.5),
            |settings| BufferedEncoder::new(*settings, RawPcmEncoder::for_settings(settings)),
            events,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(300));
        assert_eq!(session.state(), PipelineState::Streaming);
        session.stop();
        assert_eq!(session.wait().unwrap(), PipelineState::Stopped);

        assert!(receiver.join().unwrap() > 0);
        let events = collect_events(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Level(level) if *level > 0.0)));
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Status(ConnectionStatus::NotConnected))
        );
    }
}
