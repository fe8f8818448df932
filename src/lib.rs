//! # ADTS Tone Streamer
//!
//! Real-time tone shaping, AAC/ADTS framing and TCP streaming of live PCM.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                         STREAMING WORKER THREAD                          │
//! │                                                                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   │
//! │  │ FrameSource │──▶│ Level Meter │──▶│ Tone Filter │──▶│   Volume    │   │
//! │  │ (i16 PCM)   │   │  (RMS, pre) │   │ bass/treble │   │ cubic+clip  │   │
//! │  └─────────────┘   └──────┬──────┘   └─────────────┘   └──────┬──────┘   │
//! │                           │ level event                       │          │
//! │                           ▼                                   ▼          │
//! │                    ┌─────────────┐                  ┌─────────────────┐  │
//! │                    │  EventBus   │                  │ EncoderAdapter  │  │
//! │                    └──────▲──────┘                  │ slot ▸ submit   │  │
//! │                           │ status / kbps           │ poll ▸ release  │  │
//! │                           │                         └────────┬────────┘  │
//! │                    ┌──────┴──────┐   ┌─────────────┐         │           │
//! │                    │ NetworkSink │◀──│ ADTS Framer │◀────────┘           │
//! │                    │  (TCP, 1s   │   │ 7-byte hdr  │                     │
//! │                    │   window)   │   └─────────────┘                     │
//! │                    └──────┬──────┘                                       │
//! └───────────────────────────┼──────────────────────────────────────────────┘
//!                             │ [hdr|payload][hdr|payload]...
//!                             ▼
//!                      remote endpoint
//! ```
//!
//! Volume, bass, treble and cancellation are written from other threads
//! through [`control::SharedControls`]; the worker picks up changes once per
//! loop iteration.

pub mod audio;
pub mod codec;
pub mod config;
pub mod control;
pub mod dsp;
pub mod error;
pub mod events;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for capture and encoding
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default encoder bitrate in bits per second
    pub const DEFAULT_BITRATE: u32 = 128_000;

    /// Default TCP port of the receiving endpoint
    pub const DEFAULT_SERVER_PORT: u16 = 8888;

    /// Default HTTP port for the control API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// PCM bytes pulled from the source per loop iteration
    pub const DEFAULT_FRAME_BYTES: usize = 2 * 1024;

    /// Low-shelf corner frequency
    pub const BASS_CENTER_HZ: f32 = 200.0;

    /// High-shelf corner frequency
    pub const TREBLE_CENTER_HZ: f32 = 3000.0;

    /// Shelf slope (Butterworth Q)
    pub const SHELF_Q: f64 = 0.707;

    /// PCM full-scale used for i16 <-> float conversion
    pub const PCM_FULL_SCALE: f32 = 32767.0;

    /// Length of the throughput accumulation window in milliseconds
    pub const STATS_WINDOW_MS: u64 = 1000;

    /// Input slots owned by the bundled encoder
    pub const ENCODER_INPUT_SLOTS: usize = 4;

    /// Samples per channel in one AAC access unit
    pub const AAC_FRAME_SAMPLES: usize = 1024;
}
