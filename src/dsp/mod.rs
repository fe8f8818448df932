//! Signal processing: tone shelves, volume and level metering

pub mod biquad;
pub mod level;
pub mod tone;
pub mod volume;

pub use biquad::{Coefficients, FilterState, ShelfKind};
pub use level::{rms_level, LevelMeter};
pub use tone::{shape_block, Band, ToneFilter};
