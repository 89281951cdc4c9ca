use chrono::Utc;
use scoreboard_common::frame::{FrameBuffer, PixelFormat};
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::{Interrupt, SourceError, VideoSource};

/// Decodes any ffmpeg-readable input (file, RTSP URI, V4L2 device) into
/// raw `bgr24` frames scaled to a fixed size.
pub struct FfmpegSource {
    /// Shared with [`ChildKiller`] so a blocked read can be cut short.
    child: Arc<Mutex<Child>>,
    stdout: ChildStdout,
    uri: String,
    width: u32,
    height: u32,
    seq: u64,
    /// First frame, read during `open` to prove the input is usable.
    primed: Option<FrameBuffer>,
    released: bool,
}

impl FfmpegSource {
    pub fn open(uri: &str, width: u32, height: u32) -> Result<Self, SourceError> {
        Self::spawn(uri, false, width, height)
    }

    pub fn open_device(index: u32, width: u32, height: u32) -> Result<Self, SourceError> {
        Self::spawn(&format!("/dev/video{index}"), true, width, height)
    }

    fn spawn(uri: &str, is_v4l: bool, width: u32, height: u32) -> Result<Self, SourceError> {
        let scale = format!("scale={width}:{height}");
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if is_v4l {
            cmd.args(["-f", "video4linux2"]);
        }
        cmd.args(["-i", uri, "-vf", &scale, "-pix_fmt", "bgr24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(SourceError::Spawn)?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Open {
                uri: uri.to_string(),
                reason: "could not get ffmpeg stdout handle".into(),
            });
        };

        let mut source = Self {
            child: Arc::new(Mutex::new(child)),
            stdout,
            uri: uri.to_string(),
            width,
            height,
            seq: 0,
            primed: None,
            released: false,
        };

        match source.read_raw() {
            Ok(Some(frame)) => {
                info!(uri, width, height, "ffmpeg source opened");
                source.primed = Some(frame);
                Ok(source)
            }
            Ok(None) => {
                source.release();
                Err(SourceError::Open {
                    uri: uri.to_string(),
                    reason: "ffmpeg produced no frames".into(),
                })
            }
            Err(e) => {
                source.release();
                Err(SourceError::Open {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn read_raw(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        let mut data = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(uri = %self.uri, "ffmpeg stream ended");
                return Ok(None);
            }
            Err(e) => return Err(SourceError::Read(e)),
        }
        let seq = self.seq;
        self.seq += 1;
        FrameBuffer::new(
            data,
            self.width,
            self.height,
            PixelFormat::Bgr8,
            Utc::now().timestamp_millis(),
            seq,
        )
        .map(Some)
        .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

impl VideoSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        if let Some(frame) = self.primed.take() {
            return Ok(Some(frame));
        }
        self.read_raw()
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        Some(Arc::new(ChildKiller {
            child: Arc::clone(&self.child),
            uri: self.uri.clone(),
        }))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = child.kill() {
            // already exited on its own
            debug!(uri = %self.uri, error = %e, "ffmpeg kill failed");
        }
        match child.wait() {
            Ok(status) => debug!(uri = %self.uri, %status, "ffmpeg source released"),
            Err(e) => warn!(uri = %self.uri, error = %e, "failed to reap ffmpeg"),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Kills the ffmpeg child so a read blocked on its pipe sees EOF. Reaping
/// stays with [`FfmpegSource::release`].
struct ChildKiller {
    child: Arc<Mutex<Child>>,
    uri: String,
}

impl Interrupt for ChildKiller {
    fn interrupt(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = child.kill() {
                    debug!(uri = %self.uri, error = %e, "ffmpeg interrupt failed");
                } else {
                    debug!(uri = %self.uri, "ffmpeg interrupted");
                }
            }
        }
    }
}
