//! Discovery of the external binaries the media pipeline shells out to.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

/// Locates `name`, preferring an explicitly configured path.
///
/// Falls back to a handful of common install locations and then `PATH`.
pub fn find_executable(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("[EXTERNAL] Configured {} path {} does not exist", name, path.display());
    }

    let home = std::env::var("HOME").unwrap_or_default();
    let candidates = [
        format!("{home}/bin/{name}"),
        format!("{home}/.local/bin/{name}"),
        format!("/usr/local/bin/{name}"),
        format!("/opt/homebrew/bin/{name}"),
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| which::which(name).ok())
}

/// Availability of the audio/video toolchain.
#[derive(Debug, Clone, Serialize)]
pub struct MediaToolsStatus {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub ffmpeg_responds: bool,
}

impl MediaToolsStatus {
    pub fn is_ready(&self) -> bool {
        self.ffmpeg.is_some() && self.ffprobe.is_some() && self.ffmpeg_responds
    }
}

/// Checks that ffmpeg/ffprobe exist and that ffmpeg actually runs.
pub async fn check_media_tools(
    ffmpeg: Option<&Path>,
    ffprobe: Option<&Path>,
) -> MediaToolsStatus {
    let ffmpeg = find_executable("ffmpeg", ffmpeg);
    let ffprobe = find_executable("ffprobe", ffprobe);

    let ffmpeg_responds = match &ffmpeg {
        Some(path) => Command::new(path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false),
        None => false,
    };

    if ffmpeg_responds {
        info!("[EXTERNAL] ffmpeg available");
    } else {
        warn!("[EXTERNAL] ffmpeg unavailable; video synthesis will fail");
    }

    MediaToolsStatus {
        ffmpeg,
        ffprobe,
        ffmpeg_responds,
    }
}
