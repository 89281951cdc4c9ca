use chrono::{DateTime, Local};
use image::RgbImage;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// Channel order of a raw frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit blue/green/red, as produced by ffmpeg `bgr24`.
    Bgr8,
    Rgb8,
}

impl PixelFormat {
    pub fn channels(&self) -> u32 {
        3
    }
}

/// A single captured frame. Owned by the capture thread for one tick and
/// dropped as soon as the tick completes.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl FrameBuffer {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        captured_at_ms: i64,
        seq: u64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * format.channels() as usize;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            captured_at_ms,
            seq,
        })
    }

    /// Wrap an already-decoded RGB image.
    pub fn from_rgb(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            format: PixelFormat::Rgb8,
            captured_at_ms,
            seq,
        }
    }

    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    /// Convert to an RGB image, swapping channels for BGR input.
    pub fn to_rgb_image(&self) -> RgbImage {
        match self.format {
            PixelFormat::Rgb8 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| RgbImage::new(self.width, self.height)),
            PixelFormat::Bgr8 => {
                let mut rgb = Vec::with_capacity(self.data.len());
                for px in self.data.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                RgbImage::from_raw(self.width, self.height, rgb)
                    .unwrap_or_else(|| RgbImage::new(self.width, self.height))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame buffer has {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },
}

/// Per-tick result: every group's decoded string plus the local wall-clock
/// time the tick finished.
///
/// Serializes as a flat JSON object:
/// `{ "<group>": "<digits>", ..., "timestamp": "DD/MM/YYYY HH:MM:SS" }`
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValues {
    pub groups: BTreeMap<String, String>,
    pub timestamp: DateTime<Local>,
}

pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

impl DecodedValues {
    pub fn new(groups: BTreeMap<String, String>, timestamp: DateTime<Local>) -> Self {
        Self { groups, timestamp }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn get(&self, group: &str) -> Option<&str> {
        self.groups.get(group).map(String::as_str)
    }
}

impl Serialize for DecodedValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        for (name, digits) in &self.groups {
            map.serialize_entry(name, digits)?;
        }
        map.serialize_entry("timestamp", &self.formatted_timestamp())?;
        map.end()
    }
}
