//! Keyword → footage → narration → mux state machine.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{error, info, warn};

use super::fallback::FallbackCatalog;
use super::ffmpeg::{DurationPlan, FFmpegClient, MediaToolkit};
use super::footage::{self, FootageReserve, FootageSource, PexelsClient};
use super::keywords::{KeywordExtractor, KeywordSet};
use super::narration::{
    self, ElevenLabsSynthesizer, NarrationAudio, NarrationWriter, SpeechSynthesizer,
};
use super::{
    PipelineFailure, PipelineStage, VideoConfig, VideoError, VideoProducer, VideoRequest,
    VideoResult,
};
use crate::services::llm::LlmService;
use crate::services::media::VideoAsset;

const OUTPUT_FILE: &str = "final.mp4";

/// Tracks the current stage of one run and logs every transition.
struct RunState {
    stage: PipelineStage,
}

impl RunState {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Setup,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        info!("[VIDEO] {} -> {}", self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, error: VideoError) -> PipelineFailure {
        let failure = PipelineFailure {
            stage: self.stage,
            error,
        };
        error!("[VIDEO] {} -> {} ({})", self.stage, PipelineStage::Failed, failure);
        self.stage = PipelineStage::Failed;
        failure
    }
}

pub struct VideoSynthesisPipeline {
    keywords: KeywordExtractor,
    narration: NarrationWriter,
    footage: Arc<dyn FootageSource>,
    speech: Arc<dyn SpeechSynthesizer>,
    toolkit: Arc<dyn MediaToolkit>,
    catalog: Arc<FallbackCatalog>,
    config: VideoConfig,
}

impl VideoSynthesisPipeline {
    pub fn new(
        llm: LlmService,
        footage: Arc<dyn FootageSource>,
        speech: Arc<dyn SpeechSynthesizer>,
        toolkit: Arc<dyn MediaToolkit>,
        catalog: Arc<FallbackCatalog>,
        config: VideoConfig,
    ) -> Self {
        Self {
            keywords: KeywordExtractor::new(llm.clone(), catalog.clone()),
            narration: NarrationWriter::new(llm, &config.narration),
            footage,
            speech,
            toolkit,
            catalog,
            config,
        }
    }

    /// Production wiring: Pexels, ElevenLabs and the local ffmpeg install.
    pub fn from_config(
        llm: LlmService,
        catalog: Arc<FallbackCatalog>,
        config: VideoConfig,
    ) -> VideoResult<Self> {
        let toolkit = FFmpegClient::new(&config)?;
        let footage = PexelsClient::from_env(&config.footage);
        let speech = ElevenLabsSynthesizer::from_env(&config.narration);

        Ok(Self::new(
            llm,
            Arc::new(footage),
            Arc::new(speech),
            Arc::new(toolkit),
            catalog,
            config,
        ))
    }

    /// Downloads at least `min_candidates` clips, replacing failed
    /// downloads from the reserve. The reserve is handed on to the mux stage.
    async fn search_footage(
        &self,
        keywords: &KeywordSet,
        work: &Path,
    ) -> VideoResult<(Vec<PathBuf>, FootageReserve<'_>)> {
        let min = self.config.min_candidates;
        let candidates = footage::gather_candidates(
            self.footage.as_ref(),
            keywords,
            &self.catalog,
            min,
            self.config.max_candidates,
        )
        .await;

        let mut clips = footage::download_all(self.footage.as_ref(), &candidates, work).await;
        let mut reserve = FootageReserve::new(&self.catalog, &candidates);
        while clips.len() < min {
            match reserve.download_next(self.footage.as_ref(), work).await {
                Some(clip) => clips.push(clip),
                None => break,
            }
        }

        if clips.len() < min {
            return Err(VideoError::Footage(format!(
                "only {} clip(s) could be downloaded, {} required",
                clips.len(),
                min
            )));
        }

        info!("[VIDEO] {} clips downloaded ({} candidates)", clips.len(), candidates.len());
        Ok((clips, reserve))
    }

    async fn synthesize_narration(
        &self,
        request: &VideoRequest,
        work: &Path,
    ) -> VideoResult<NarrationAudio> {
        let script = self.narration.script(request).await?;
        narration::render_narration(
            self.speech.as_ref(),
            self.toolkit.as_ref(),
            &script,
            work,
            self.config.narration.speed_factor,
        )
        .await
    }

    /// Normalises, joins and overlays the narration. Clips that fail to
    /// normalise are replaced from `reserve` while below the minimum.
    /// Returns the probed duration of the muxed file.
    async fn mux(
        &self,
        clips: Vec<PathBuf>,
        reserve: &mut FootageReserve<'_>,
        narration: &NarrationAudio,
        work: &Path,
        output: &Path,
    ) -> VideoResult<f64> {
        let min = self.config.min_candidates;
        let mut pending: VecDeque<PathBuf> = clips.into();
        let mut normalized = Vec::with_capacity(pending.len());

        loop {
            let clip = match pending.pop_front() {
                Some(clip) => clip,
                None if normalized.len() < min => {
                    match reserve.download_next(self.footage.as_ref(), work).await {
                        Some(clip) => clip,
                        None => break,
                    }
                }
                None => break,
            };

            let out = work.join(format!("norm_{}.mp4", normalized.len()));
            match self.toolkit.normalize_clip(&clip, &out, &self.config.frame).await {
                Ok(()) => normalized.push(out),
                Err(e) => warn!("[VIDEO] Dropping clip {}: {}", clip.display(), e),
            }
        }

        if normalized.len() < min {
            return Err(VideoError::Footage(format!(
                "only {} clip(s) survived normalisation, {} required",
                normalized.len(),
                min
            )));
        }

        let joined = work.join("video_only.mp4");
        self.toolkit
            .concat(&normalized, &work.join("concat_list.txt"), &joined)
            .await?;

        let tolerance = self.config.duration_tolerance_secs;
        let video_seconds = self.toolkit.probe_duration(&joined).await?;
        let plan = DurationPlan::new(video_seconds, narration.duration_seconds, tolerance);
        if plan.loop_video {
            info!(
                "[VIDEO] Looping {:.2}s of footage to {:.2}s of narration",
                video_seconds, narration.duration_seconds
            );
        }

        self.toolkit
            .mux(&joined, &narration.local_path, output, &plan)
            .await?;

        let actual = self.toolkit.probe_duration(output).await?;
        if !plan.within_tolerance(actual, tolerance) {
            return Err(VideoError::DurationMismatch {
                video: actual,
                narration: narration.duration_seconds,
            });
        }
        Ok(actual)
    }

    fn scratch_dirs(&self) -> VideoResult<(TempDir, TempDir)> {
        let root = self.config.scratch_root();
        let output = utils::scratch::scoped_dir(&root, "herald-video-")?;
        let work = utils::scratch::scoped_dir(&root, "herald-work-")?;
        Ok((output, work))
    }
}

#[async_trait]
impl VideoProducer for VideoSynthesisPipeline {
    async fn produce(&self, request: &VideoRequest) -> Result<VideoAsset, PipelineFailure> {
        let mut run = RunState::new();

        // Dropping `work` removes every intermediate file on all exits.
        let (output_dir, work) = self.scratch_dirs().map_err(|e| run.fail(e))?;

        run.advance(PipelineStage::ExtractKeywords);
        let keywords = self
            .keywords
            .extract(&request.adapted_text, &request.source_text)
            .await;

        run.advance(PipelineStage::SearchFootage);
        let (clips, mut reserve) = self
            .search_footage(&keywords, work.path())
            .await
            .map_err(|e| run.fail(e))?;

        run.advance(PipelineStage::SynthesizeNarration);
        let narration = self
            .synthesize_narration(request, work.path())
            .await
            .map_err(|e| run.fail(e))?;

        run.advance(PipelineStage::Mux);
        let output = output_dir.path().join(OUTPUT_FILE);
        let duration = self
            .mux(clips, &mut reserve, &narration, work.path(), &output)
            .await
            .map_err(|e| run.fail(e))?;
        drop(work);

        run.advance(PipelineStage::Done);
        Ok(VideoAsset::new(output_dir, output, duration))
    }
}
