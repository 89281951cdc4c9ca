use chrono::Utc;
use scoreboard_common::frame::FrameBuffer;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{SourceError, VideoSource};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays a directory of still images in file-name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    seq: u64,
    released: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, looping: bool) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            uri: dir.display().to_string(),
            reason,
        };
        let entries = fs::read_dir(dir).map_err(|e| open_err(e.to_string()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(open_err("directory contains no images".into()));
        }
        info!(dir = %dir.display(), count = files.len(), looping, "image sequence opened");

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            cursor: 0,
            looping,
            seq: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl VideoSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<FrameBuffer>, SourceError> {
        if self.released {
            return Ok(None);
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!(dir = %self.dir.display(), "image sequence wrapped");
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;
        let img = image::open(path)
            .map_err(|e| SourceError::Decode(format!("{}: {e}", path.display())))?;

        let seq = self.seq;
        self.seq += 1;
        Ok(Some(FrameBuffer::from_rgb(
            img.to_rgb8(),
            Utc::now().timestamp_millis(),
            seq,
        )))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!(dir = %self.dir.display(), frames = self.seq, "image sequence released");
        }
    }
}

fn is_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => {
            warn!(path = %path.display(), "ignoring file without extension");
            false
        }
    }
}
