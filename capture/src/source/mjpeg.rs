use bytes::BytesMut;
use chrono::Utc;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use scoreboard_common::frame::FrameBuffer;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Interrupt, SourceError, VideoSource};

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 16 * 1024;
/// Upper bound on a single connect or body read; a stalled camera fails
/// the read instead of blocking the capture thread forever.
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse state for the multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--<boundary>\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental `multipart/x-mixed-replace` splitter.
pub struct MjpegParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MjpegParser {
    pub fn new(boundary: &str) -> Self {
        let boundary = boundary.trim_start_matches("--");
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete JPEG body, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let blen = self.boundary.len();
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        let _ = self.buffer.split_to(pos + blen);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > blen {
                            let _ = self.buffer.split_to(self.buffer.len() - blen);
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let pos = find_subsequence(&self.buffer, HEADER_END)?;
                    let _ = self.buffer.split_to(pos + HEADER_END.len());
                    self.jpeg_start = 0;
                    self.state = ParseState::CollectingJpeg;
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], &self.boundary)
                    else {
                        // Resume the scan where this one stopped
                        self.jpeg_start = self.buffer.len().saturating_sub(blen);
                        return None;
                    };
                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + blen);
                    self.state = ParseState::SeekingHeaderEnd;
                    if !jpeg.is_empty() {
                        return Some(jpeg);
                    }
                }
            }
        }
    }
}

/// Blocking reader for an HTTP MJPEG camera stream.
pub struct MjpegSource {
    url: String,
    response: Option<Response>,
    parser: MjpegParser,
    seq: u64,
    primed: Option<FrameBuffer>,
    interrupted: Arc<AtomicBool>,
}

impl MjpegSource {
    pub fn open(url: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(IO_TIMEOUT)
            .timeout(IO_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        let response = client.get(url).send().map_err(|e| SourceError::Open {
            uri: url.to_string(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(SourceError::Open {
                uri: url.to_string(),
                reason: format!("HTTP status {}", response.status().as_u16()),
            });
        }

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        info!(url, status = %response.status(), boundary = %boundary, "connected to MJPEG stream");

        let mut source = Self {
            url: url.to_string(),
            response: Some(response),
            parser: MjpegParser::new(&boundary),
            seq: 0,
            primed: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        };
        match source.next_decoded() {
            Ok(Some(frame)) => {
                source.primed = Some(frame);
                Ok(source)
            }
            Ok(None) => Err(SourceError::Open {
                uri: url.to_string(),
                reason: "stream ended before the first frame".into(),
            }),
            Err(e) => Err(SourceError::Open {
                uri: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn next_decoded(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            while let Some(jpeg) = self.parser.next_frame() {
                match image::load_from_memory(&jpeg) {
                    Ok(img) => {
                        let seq = self.seq;
                        self.seq += 1;
                        debug!(seq, bytes = jpeg.len(), "decoded MJPEG frame");
                        return Ok(Some(FrameBuffer::from_rgb(
                            img.to_rgb8(),
                            Utc::now().timestamp_millis(),
                            seq,
                        )));
                    }
                    Err(e) => warn!(error = %e, bytes = jpeg.len(), "skipping undecodable JPEG"),
                }
            }
            if self.interrupted.load(Ordering::Acquire) {
                debug!(url = %self.url, "MJPEG read interrupted");
                return Ok(None);
            }
            let Some(response) = self.response.as_mut() else {
                return Ok(None);
            };
            let n = response.read(&mut chunk).map_err(SourceError::Read)?;
            if n == 0 {
                debug!(url = %self.url, "MJPEG stream ended");
                return Ok(None);
            }
            self.parser.push(&chunk[..n]);
        }
    }
}

impl VideoSource for MjpegSource {
    fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        if let Some(frame) = self.primed.take() {
            return Ok(Some(frame));
        }
        self.next_decoded()
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupt>> {
        Some(Arc::new(StopFlag(Arc::clone(&self.interrupted))))
    }

    fn release(&mut self) {
        if self.response.take().is_some() {
            debug!(url = %self.url, "MJPEG connection closed");
        }
    }
}

/// Makes the next chunk boundary end the stream; an in-flight read is
/// bounded by the client timeout.
struct StopFlag(Arc<AtomicBool>);

impl Interrupt for StopFlag {
    fn interrupt(&self) {
        self.0.store(true, Ordering::Release);
    }
}

fn boundary_from_content_type(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
