//! Media produced for a single network during a run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use ts_rs::TS;

/// Image handed to a connector, either hosted or embedded.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ImageAsset {
    /// Public URL or `data:` URI
    pub url: String,
    pub is_inline_data: bool,
    /// Set when generation failed and the static placeholder is used instead
    pub is_fallback: bool,
}

/// Muxed vertical video. Owns the directory holding the file; dropping the
/// asset deletes it.
#[derive(Debug)]
pub struct VideoAsset {
    local_path: PathBuf,
    duration_seconds: f64,
    _dir: TempDir,
}

impl VideoAsset {
    pub fn new(dir: TempDir, local_path: PathBuf, duration_seconds: f64) -> Self {
        Self {
            local_path,
            duration_seconds,
            _dir: dir,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}

#[derive(Debug)]
pub enum MediaAsset {
    Image(ImageAsset),
    Video(VideoAsset),
}

impl MediaAsset {
    pub fn as_image(&self) -> Option<&ImageAsset> {
        match self {
            MediaAsset::Image(image) => Some(image),
            MediaAsset::Video(_) => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoAsset> {
        match self {
            MediaAsset::Video(video) => Some(video),
            MediaAsset::Image(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MediaAsset::Image(_) => "image",
            MediaAsset::Video(_) => "video",
        }
    }
}
