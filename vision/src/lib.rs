//! Frame pipeline for seven-segment scoreboard displays.
//!
//! A captured frame flows through [`normalize`] (crop, rectify, rotate,
//! shear) and [`morphology`] (threshold, erode, dilate); every configured
//! [`group::DigitGroup`] then decodes its regions with [`segment`].
//! [`processor::FrameProcessor`] ties the stages together once per tick.

pub mod annotate;
pub mod group;
pub mod morphology;
pub mod normalize;
pub mod processor;
pub mod region;
pub mod segment;

pub use group::DigitGroup;
pub use processor::{FrameProcessor, PreviewFrames, TickOutput};
pub use segment::{DigitValue, SegmentDecoder};
