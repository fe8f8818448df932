//! Encoder boundary
//!
//! The pipeline talks to encoders only through [`EncoderAdapter`]. The
//! bundled [`BufferedEncoder`] implements that contract around any
//! synchronous [`FrameEncoder`].

pub mod adapter;
pub mod buffered;
pub mod raw;

pub use adapter::{EncodedPayload, EncoderAdapter, EncoderSettings, InputSlot};
pub use buffered::{BufferedEncoder, EncoderStats, FrameEncoder};
pub use raw::RawPcmEncoder;
