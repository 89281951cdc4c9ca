use scoreboard_common::frame::DecodedValues;
use scoreboard_vision::PreviewFrames;

/// Receives the output of every capture tick.
///
/// Called on the capture thread; implementations must hand heavy work off
/// instead of blocking the loop.
pub trait CaptureObserver: Send + Sync {
    fn notify(&self, values: &DecodedValues, previews: &PreviewFrames);

    fn on_lifecycle(&self, _event: &LifecycleEvent) {}

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started { source: String },
    StartupFailed { source: String, error: String },
    Paused,
    Resumed,
    Stopped { reason: StopReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Killed,
    EndOfStream,
    ReadFailure(String),
}
