//! Audio input: PCM frames, frame sources and device capture

pub mod capture;
pub mod device;
pub mod frame;
pub mod source;

pub use capture::CaptureSource;
pub use device::{get_device_by_id, list_input_devices, AudioDevice};
pub use frame::AudioFrame;
pub use source::{ChannelSource, FrameSource, TestToneSource};
