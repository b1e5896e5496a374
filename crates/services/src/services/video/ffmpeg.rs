//! FFmpeg wrapper for the clip normalise / concat / mux steps

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{FrameSpec, VideoConfig, VideoError, VideoResult};

/// How the muxed output reaches the narration length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPlan {
    /// Output length in seconds (the narration duration)
    pub target_seconds: f64,
    /// Loop the video track because it is shorter than the narration
    pub loop_video: bool,
}

impl DurationPlan {
    pub fn new(video_seconds: f64, narration_seconds: f64, tolerance: f64) -> Self {
        Self {
            target_seconds: narration_seconds,
            loop_video: video_seconds + tolerance < narration_seconds,
        }
    }

    pub fn within_tolerance(&self, actual: f64, tolerance: f64) -> bool {
        (actual - self.target_seconds).abs() <= tolerance
    }
}

/// The audio/video operations the pipeline needs.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> VideoResult<f64>;

    /// Speed audio up or down without changing pitch.
    async fn change_tempo(&self, input: &Path, output: &Path, factor: f64) -> VideoResult<()>;

    /// Scale/crop to the frame, fix the frame rate, drop audio.
    async fn normalize_clip(&self, input: &Path, output: &Path, frame: &FrameSpec)
    -> VideoResult<()>;

    /// Join clips through a concat list file written to `list_file`.
    async fn concat(&self, inputs: &[PathBuf], list_file: &Path, output: &Path) -> VideoResult<()>;

    /// Overlay `audio` on `video`, trimming or looping to the plan's length.
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        plan: &DurationPlan,
    ) -> VideoResult<()>;
}

/// `atempo` accepts 0.5..=2.0 per stage on older ffmpeg builds; chain stages
/// for factors outside that range.
pub fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor.clamp(0.25, 4.0);
    let mut stages = Vec::new();
    while remaining > 2.0 {
        stages.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={}", trim_float(remaining)));
    stages.join(",")
}

fn trim_float(value: f64) -> String {
    let s = format!("{:.4}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub fn normalize_filter(frame: &FrameSpec) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps}",
        w = frame.width,
        h = frame.height,
        fps = frame.fps
    )
}

/// Concat demuxer list; single quotes inside paths are escaped.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

pub fn mux_args(video: &Path, audio: &Path, output: &Path, plan: &DurationPlan) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into()];
    if plan.loop_video {
        args.extend(["-stream_loop".into(), "-1".into()]);
    }
    args.extend([
        "-i".into(),
        video.to_string_lossy().into_owned(),
        "-i".into(),
        audio.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-t".into(),
        format!("{:.3}", plan.target_seconds),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// FFmpeg client with a shared cap on concurrently running processes.
pub struct FFmpegClient {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    permits: Arc<Semaphore>,
    process_timeout: Duration,
}

impl FFmpegClient {
    pub fn new(config: &VideoConfig) -> VideoResult<Self> {
        let ffmpeg_path =
            utils::external_services::find_executable("ffmpeg", config.ffmpeg_path.as_deref())
                .ok_or_else(|| VideoError::FFmpeg("ffmpeg not found in PATH".to_string()))?;
        let ffprobe_path =
            utils::external_services::find_executable("ffprobe", config.ffprobe_path.as_deref())
                .ok_or_else(|| VideoError::FFmpeg("ffprobe not found in PATH".to_string()))?;

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
            permits: Arc::new(Semaphore::new(config.max_processes.max(1))),
            process_timeout: Duration::from_secs(config.process_timeout_secs),
        })
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    async fn run(&self, program: &Path, args: &[String]) -> VideoResult<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| VideoError::Process(e.to_string()))?;

        debug!("[FFMPEG] {} {}", program.display(), args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VideoError::Process(e.to_string()))?;

        let output = tokio::time::timeout(self.process_timeout, child.wait_with_output())
            .await
            .map_err(|_| VideoError::Timeout(self.process_timeout))?
            .map_err(|e| VideoError::Process(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(VideoError::FFmpeg(format!("{} ({})", tail, output.status)));
        }

        Ok(output.stdout)
    }

    fn require_input(path: &Path) -> VideoResult<()> {
        if path.exists() {
            Ok(())
        } else {
            Err(VideoError::FileNotFound(path.to_path_buf()))
        }
    }
}

#[async_trait]
impl MediaToolkit for FFmpegClient {
    async fn probe_duration(&self, path: &Path) -> VideoResult<f64> {
        Self::require_input(path)?;

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let stdout = self.run(&self.ffprobe_path, &args).await?;

        let json: Value =
            serde_json::from_slice(&stdout).map_err(|e| VideoError::FFmpeg(e.to_string()))?;
        json["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| VideoError::FFmpeg(format!("no duration for {}", path.display())))
    }

    async fn change_tempo(&self, input: &Path, output: &Path, factor: f64) -> VideoResult<()> {
        Self::require_input(input)?;
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-filter:a".to_string(),
            atempo_chain(factor),
            "-vn".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        self.run(&self.ffmpeg_path, &args).await.map(|_| ())
    }

    async fn normalize_clip(
        &self,
        input: &Path,
        output: &Path,
        frame: &FrameSpec,
    ) -> VideoResult<()> {
        Self::require_input(input)?;
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vf".to_string(),
            normalize_filter(frame),
            "-an".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        self.run(&self.ffmpeg_path, &args).await.map(|_| ())
    }

    async fn concat(&self, inputs: &[PathBuf], list_file: &Path, output: &Path) -> VideoResult<()> {
        for input in inputs {
            Self::require_input(input)?;
        }
        tokio::fs::write(list_file, concat_list(inputs)).await?;

        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_file.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        let result = self.run(&self.ffmpeg_path, &args).await.map(|_| ());

        let _ = tokio::fs::remove_file(list_file).await;
        result
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        plan: &DurationPlan,
    ) -> VideoResult<()> {
        Self::require_input(video)?;
        Self::require_input(audio)?;
        let args = mux_args(video, audio, output, plan);
        self.run(&self.ffmpeg_path, &args).await.map(|_| ())
    }
}
