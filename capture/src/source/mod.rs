mod ffmpeg;
mod mjpeg;
mod sequence;

pub use ffmpeg::FfmpegSource;
pub use mjpeg::{MjpegParser, MjpegSource};
pub use sequence::ImageSequenceSource;

use scoreboard_common::config::CaptureConfig;
use scoreboard_common::frame::FrameBuffer;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// A pull-based frame producer, exclusively owned by the capture thread.
pub trait VideoSource: Send {
    /// Next frame; `Ok(None)` marks a clean end of stream.
    fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError>;

    /// Release the underlying device/process/connection. Must be idempotent.
    fn release(&mut self);

    /// Handle that can unblock a pending `read_frame` from another thread.
    /// `None` when reads always return promptly.
    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        None
    }
}

/// Cuts short a blocked read. Idempotent; never releases the source.
pub trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// Opens a fresh [`VideoSource`]; the capture loop calls it from `start()`.
pub trait SourceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn VideoSource>, SourceError>;

    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open video source {uri}: {reason}")]
    Open { uri: String, reason: String },
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(std::io::Error),
    #[error("frame read failed: {0}")]
    Read(std::io::Error),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Where frames come from, parsed from the `capture.source` string.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// V4L2 device index, read through ffmpeg.
    Device(u32),
    /// Any file or URI ffmpeg can demux.
    Stream(String),
    /// Multipart JPEG over HTTP.
    Mjpeg(String),
    /// Directory of still images, played in file-name order.
    ImageSequence(PathBuf),
}

impl SourceKind {
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if let Ok(index) = source.parse::<u32>() {
            return SourceKind::Device(index);
        }
        if let Some(index) = source
            .strip_prefix("/dev/video")
            .and_then(|rest| rest.parse::<u32>().ok())
        {
            return SourceKind::Device(index);
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            return SourceKind::Mjpeg(source.to_string());
        }
        let path = PathBuf::from(source);
        if path.is_dir() {
            return SourceKind::ImageSequence(path);
        }
        SourceKind::Stream(source.to_string())
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Device(index) => write!(f, "/dev/video{index}"),
            SourceKind::Stream(uri) | SourceKind::Mjpeg(uri) => f.write_str(uri),
            SourceKind::ImageSequence(dir) => write!(f, "{}", dir.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub width: u32,
    pub height: u32,
    pub loop_sequence: bool,
}

impl SourceSpec {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            kind: SourceKind::parse(&config.source),
            width: config.width,
            height: config.height,
            loop_sequence: config.loop_sequence,
        }
    }
}

impl SourceOpener for SourceSpec {
    fn open(&self) -> Result<Box<dyn VideoSource>, SourceError> {
        debug!(source = %self.kind, width = self.width, height = self.height, "opening video source");
        Ok(match &self.kind {
            SourceKind::Device(index) => Box::new(FfmpegSource::open_device(*index, self.width, self.height)?),
            SourceKind::Stream(uri) => Box::new(FfmpegSource::open(uri, self.width, self.height)?),
            SourceKind::Mjpeg(url) => Box::new(MjpegSource::open(url)?),
            SourceKind::ImageSequence(dir) => Box::new(ImageSequenceSource::open(dir, self.loop_sequence)?),
        })
    }

    fn describe(&self) -> String {
        self.kind.to_string()
    }
}

/// Scoped ownership of an open source: `release()` runs exactly once, on
/// explicit release or on drop, whichever comes first.
pub struct SourceGuard {
    source: Option<Box<dyn VideoSource>>,
}

impl SourceGuard {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    pub fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        match self.source.as_mut() {
            Some(source) => source.read_frame(),
            None => Ok(None),
        }
    }

    pub fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        self.source.as_ref().and_then(|source| source.interrupter())
    }

    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}
