//! Short vertical video synthesis
//!
//! Turns adapted text into a narrated 9:16 clip:
//!
//! ```text
//! ExtractKeywords ─► SearchFootage ─► SynthesizeNarration ─► Mux ─► Done
//!        │                 │                   │              │
//!        └─────────────────┴───────────────────┴──────────────┴─► Failed
//! ```
//!
//! Stock footage comes from a [`FootageSource`], speech from a
//! [`SpeechSynthesizer`], and all audio/video processing goes through a
//! [`MediaToolkit`] (ffmpeg in production).

pub mod fallback;
pub mod ffmpeg;
pub mod footage;
pub mod keywords;
pub mod narration;
pub mod pipeline;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

use super::media::VideoAsset;

pub use fallback::FallbackCatalog;
pub use ffmpeg::{DurationPlan, FFmpegClient, MediaToolkit};
pub use footage::{
    CandidateOrigin, FootageConfig, FootageReserve, FootageSource, PexelsClient, VideoCandidate,
};
pub use keywords::{KeywordExtractor, KeywordSet};
pub use narration::{ElevenLabsSynthesizer, NarrationAudio, NarrationConfig, SpeechSynthesizer};
pub use pipeline::VideoSynthesisPipeline;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Process timed out after {0:?}")]
    Timeout(Duration),

    #[error("Footage error: {0}")]
    Footage(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Duration mismatch: video {video:.2}s, narration {narration:.2}s")]
    DurationMismatch { video: f64, narration: f64 },
}

pub type VideoResult<T> = Result<T, VideoError>;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Setup,
    ExtractKeywords,
    SearchFootage,
    SynthesizeNarration,
    Mux,
    Done,
    Failed,
}

/// A pipeline run that ended in `Failed`, with the stage it failed in.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    pub error: VideoError,
}

impl PipelineFailure {
    /// Stable machine-readable failure code.
    pub fn code(&self) -> &'static str {
        match self.stage {
            PipelineStage::Setup => "setup_failed",
            PipelineStage::ExtractKeywords => "keywords_failed",
            PipelineStage::SearchFootage => "footage_failed",
            PipelineStage::SynthesizeNarration => "narration_failed",
            PipelineStage::Mux | PipelineStage::Done | PipelineStage::Failed => "mux_failed",
        }
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Output frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub frame: FrameSpec,
    /// Allowed gap between muxed video and narration
    pub duration_tolerance_secs: f64,
    pub min_candidates: usize,
    pub max_candidates: usize,
    /// Scratch root for per-run directories; platform cache dir when unset
    pub scratch_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Concurrent ffmpeg/ffprobe processes across all runs
    pub max_processes: usize,
    pub process_timeout_secs: u64,
    pub footage: FootageConfig,
    pub narration: NarrationConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame: FrameSpec::default(),
            duration_tolerance_secs: 0.5,
            min_candidates: 2,
            max_candidates: 3,
            scratch_dir: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            max_processes: 2,
            process_timeout_secs: 180,
            footage: FootageConfig::default(),
            narration: NarrationConfig::default(),
        }
    }
}

impl VideoConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(utils::scratch::scratch_root)
    }
}

/// Input for one video.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    /// Original announcement, used for category fallbacks
    pub source_text: String,
    /// Network-adapted text
    pub adapted_text: String,
    /// Explicit voice-over script, preferred when present
    pub narration_script: Option<String>,
}

#[async_trait]
pub trait VideoProducer: Send + Sync {
    async fn produce(&self, request: &VideoRequest) -> Result<VideoAsset, PipelineFailure>;
}
