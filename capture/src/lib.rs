//! Video acquisition and the capture loop that drives the frame pipeline.

pub mod capture_loop;
pub mod observer;
pub mod source;

pub use capture_loop::{CaptureError, CaptureLoop, CaptureState};
pub use observer::{CaptureObserver, LifecycleEvent, StopReason};
pub use source::{Interrupt, SourceError, SourceOpener, SourceSpec, VideoSource};
