//! Drives one distribution run: validate, adapt, synthesize media, publish.
//!
//! Only three things end a run early: empty content, a rejected validation
//! and a run where no network could be adapted. Everything else is recorded
//! per network in the [`RunSummary`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use services::services::imaging::{ImageMode, ImageProducer, ImageSynthesizer};
use services::services::llm::LlmService;
use services::services::media::MediaAsset;
use services::services::social::{
    FailureKind, MediaRequirement, Network, NetworkCredentials, PublishContent, PublishResult,
    PublisherRegistry,
};
use services::services::video::{
    FallbackCatalog, VideoProducer, VideoRequest, VideoSynthesisPipeline,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::adapter::{Adaptation, NetworkAdapter, UNSUPPORTED_NETWORK};
use crate::config::HeraldConfig;
use crate::content::ContentItem;
use crate::validator::{ContentValidator, ValidationVerdict};
use crate::{HeraldError, Result};

pub const RUN_CANCELLED: &str = "run cancelled before this network started";
const PROMPT_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub validation: ValidationVerdict,
    /// Distinct network names requested
    pub total_requested: usize,
    /// Networks with a usable adaptation
    pub valid_count: usize,
    pub success_count: usize,
    /// Networks that reached media or publishing and failed there
    pub failure_count: usize,
    /// Networks never sent to publishing: unsupported, not adapted or cancelled
    pub skipped_count: usize,
    /// Share of the adapted networks that published
    pub success_rate: f64,
    pub duration_seconds: f64,
    pub adaptations: BTreeMap<String, Adaptation>,
    /// Keyed by the network name as requested
    pub results: BTreeMap<String, PublishResult>,
}

/// Collaborators of an orchestrator. Production wiring lives in
/// [`DistributionOrchestrator::from_config`].
pub struct OrchestratorParts {
    pub validator: ContentValidator,
    pub adapter: NetworkAdapter,
    pub images: Arc<dyn ImageProducer>,
    /// `None` when the video toolchain is unavailable; TikTok then fails
    /// with `media_generation_failed`
    pub video: Option<Arc<dyn VideoProducer>>,
    pub registry: PublisherRegistry,
}

/// Everything a spawned per-network task needs.
struct PublishBranch {
    images: Arc<dyn ImageProducer>,
    video: Option<Arc<dyn VideoProducer>>,
    registry: PublisherRegistry,
    institution: String,
}

pub struct DistributionOrchestrator {
    validator: ContentValidator,
    adapter: NetworkAdapter,
    branch: Arc<PublishBranch>,
    adaptation_concurrency: usize,
    cancel: CancellationToken,
}

/// Adapted text plus hashtags, unless the network takes none or the text
/// already carries one of them.
pub fn assemble_caption(network: Network, adaptation: &Adaptation) -> String {
    if network == Network::WhatsApp || adaptation.hashtags.is_empty() {
        return adaptation.text.clone();
    }
    if adaptation
        .hashtags
        .iter()
        .any(|tag| adaptation.text.contains(tag.as_str()))
    {
        return adaptation.text.clone();
    }
    format!("{}\n\n{}", adaptation.text, adaptation.hashtags.join(" "))
}

/// Trimmed, first occurrence wins (case-insensitive), order preserved.
fn dedup_targets(targets: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

impl PublishBranch {
    fn image_prompt(&self, network: Network, adaptation: &Adaptation, content: &ContentItem) -> String {
        let excerpt = content.excerpt(PROMPT_EXCERPT_CHARS);
        match network {
            Network::Instagram => adaptation
                .image_prompt
                .clone()
                .unwrap_or_else(|| format!("{}: {}", self.institution, excerpt)),
            _ => format!("{}, academic topic: {}", self.institution, excerpt),
        }
    }

    /// The media `network` needs, or the failure result to report.
    async fn prepare_media(
        &self,
        name: &str,
        network: Network,
        adaptation: &Adaptation,
        content: &ContentItem,
    ) -> std::result::Result<Option<MediaAsset>, PublishResult> {
        match network.media_requirement() {
            MediaRequirement::None => Ok(None),
            MediaRequirement::HostedImage | MediaRequirement::InlineImage => {
                let mode = if network.media_requirement() == MediaRequirement::HostedImage {
                    ImageMode::UrlHosted
                } else {
                    ImageMode::InlineData
                };
                let prompt = self.image_prompt(network, adaptation, content);
                let image = self.images.synthesize_image(&prompt, mode).await;
                if image.is_fallback {
                    warn!("[ORCHESTRATOR] {} is using the fallback image", name);
                }
                Ok(Some(MediaAsset::Image(image)))
            }
            MediaRequirement::Video => {
                let Some(video) = &self.video else {
                    return Err(PublishResult::failure(
                        name,
                        FailureKind::MediaGenerationFailed,
                        "video pipeline unavailable",
                        Value::Null,
                    ));
                };
                let request = VideoRequest {
                    source_text: content.raw_text().to_string(),
                    adapted_text: adaptation.text.clone(),
                    narration_script: adaptation.narration_script.clone(),
                };
                match video.produce(&request).await {
                    Ok(asset) => Ok(Some(MediaAsset::Video(asset))),
                    Err(failure) => Err(PublishResult::failure(
                        name,
                        FailureKind::MediaGenerationFailed,
                        failure.to_string(),
                        json!({ "stage": failure.stage, "code": failure.code() }),
                    )),
                }
            }
        }
    }

    async fn execute(
        self: Arc<Self>,
        name: String,
        network: Network,
        adaptation: Adaptation,
        content: ContentItem,
    ) -> PublishResult {
        let media = match self.prepare_media(&name, network, &adaptation, &content).await {
            Ok(media) => media,
            Err(failure) => {
                error!(
                    "[ORCHESTRATOR] {} media failed: {}",
                    name,
                    failure.error_detail.as_deref().unwrap_or("-")
                );
                return failure;
            }
        };

        let publish = PublishContent {
            caption: assemble_caption(network, &adaptation),
            hashtags: adaptation.hashtags.clone(),
        };
        let mut result = self.registry.publish(network, &publish, media.as_ref()).await;
        // Removes the video scratch directory, if any.
        drop(media);

        result.network = name;
        result
    }
}

impl DistributionOrchestrator {
    pub fn new(parts: OrchestratorParts, config: &HeraldConfig) -> Self {
        Self {
            validator: parts.validator,
            adapter: parts.adapter,
            branch: Arc::new(PublishBranch {
                images: parts.images,
                video: parts.video,
                registry: parts.registry,
                institution: config.institution.name.clone(),
            }),
            adaptation_concurrency: config.limits.adaptation_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Live providers, credentials from the environment.
    pub fn from_config(config: &HeraldConfig) -> Self {
        let institution = config.institution.name.clone();
        let llm = LlmService::new(Arc::new(config.llm.build_provider()), &config.llm);

        let video: Option<Arc<dyn VideoProducer>> = match VideoSynthesisPipeline::from_config(
            llm.clone(),
            Arc::new(FallbackCatalog::builtin()),
            config.video_config(),
        ) {
            Ok(pipeline) => Some(Arc::new(pipeline)),
            Err(e) => {
                warn!("[ORCHESTRATOR] Video pipeline disabled: {}", e);
                None
            }
        };

        let parts = OrchestratorParts {
            validator: ContentValidator::new(
                llm.clone(),
                institution.clone(),
                config.validation.fail_open,
            ),
            adapter: NetworkAdapter::new(llm, institution),
            images: Arc::new(ImageSynthesizer::from_config(&config.media.imaging)),
            video,
            registry: PublisherRegistry::with_defaults(
                &config.network_settings(),
                &NetworkCredentials::from_env(),
            ),
        };
        Self::new(parts, config)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn validator(&self) -> &ContentValidator {
        &self.validator
    }

    pub fn adapter(&self) -> &NetworkAdapter {
        &self.adapter
    }

    /// Adapts `targets` concurrently, keeping request order. Every
    /// adaptation carries its parsed network in `target`.
    pub async fn adapt_all(
        &self,
        content: &ContentItem,
        targets: &[(String, Network)],
    ) -> Vec<Adaptation> {
        stream::iter(targets.iter().cloned())
            .map(|(name, network)| async move {
                if self.cancel.is_cancelled() {
                    Adaptation::failed(name, RUN_CANCELLED).for_target(network)
                } else {
                    self.adapter.adapt_for(content, &name, network).await
                }
            })
            .buffered(self.adaptation_concurrency)
            .collect()
            .await
    }

    pub async fn run(&self, content: &ContentItem, targets: &[String]) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let requested = dedup_targets(targets);
        info!(
            "[ORCHESTRATOR] Run {} started for [{}]",
            run_id,
            requested.join(", ")
        );

        let validation = self.validator.validate(content).await;
        if !validation.is_eligible {
            info!("[ORCHESTRATOR] Run {} rejected: {}", run_id, validation.reason);
            return Err(HeraldError::ValidationRejected {
                reason: validation.reason,
            });
        }

        let mut results: BTreeMap<String, PublishResult> = BTreeMap::new();
        let mut reasons: BTreeMap<String, String> = BTreeMap::new();
        let mut supported = Vec::new();
        for name in &requested {
            match Network::parse(name) {
                Some(network) => supported.push((name.clone(), network)),
                None => {
                    warn!("[ORCHESTRATOR] Unsupported network '{}'", name);
                    reasons.insert(name.clone(), UNSUPPORTED_NETWORK.to_string());
                    results.insert(
                        name.clone(),
                        PublishResult::failure(
                            name.as_str(),
                            FailureKind::Unsupported,
                            UNSUPPORTED_NETWORK,
                            Value::Null,
                        ),
                    );
                }
            }
        }

        let mut adaptations = BTreeMap::new();
        let mut ready = Vec::new();
        for adaptation in self.adapt_all(content, &supported).await {
            let name = adaptation.network.clone();
            match (&adaptation.error, adaptation.target) {
                (None, Some(network)) => ready.push((name.clone(), network, adaptation.clone())),
                (error, _) => {
                    let reason = error.as_deref().unwrap_or(UNSUPPORTED_NETWORK);
                    let kind = if reason == RUN_CANCELLED {
                        FailureKind::ServiceUnavailable
                    } else {
                        FailureKind::AdaptationFailed
                    };
                    reasons.insert(name.clone(), reason.to_string());
                    results.insert(
                        name.clone(),
                        PublishResult::failure(name.as_str(), kind, reason, Value::Null),
                    );
                }
            }
            adaptations.insert(name, adaptation);
        }

        if ready.is_empty() {
            error!("[ORCHESTRATOR] Run {} has no valid networks", run_id);
            return Err(HeraldError::NoValidNetworks { reasons });
        }
        let valid_count = ready.len();

        let mut skipped_count = results.len();
        let mut handles = Vec::with_capacity(ready.len());
        for (name, network, adaptation) in ready {
            if self.cancel.is_cancelled() {
                skipped_count += 1;
                results.insert(
                    name.clone(),
                    PublishResult::failure(
                        name.as_str(),
                        FailureKind::ServiceUnavailable,
                        RUN_CANCELLED,
                        Value::Null,
                    ),
                );
                continue;
            }
            let task = tokio::spawn(self.branch.clone().execute(
                name.clone(),
                network,
                adaptation,
                content.clone(),
            ));
            handles.push((name, task));
        }

        for (name, task) in handles {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("[ORCHESTRATOR] {} task aborted: {}", name, e);
                    let detail = if e.is_panic() {
                        "publish task panicked"
                    } else {
                        "publish task cancelled"
                    };
                    PublishResult::failure(
                        name.as_str(),
                        FailureKind::PublishFailed,
                        detail,
                        Value::Null,
                    )
                }
            };
            if result.is_success() {
                info!("[ORCHESTRATOR] {} published", name);
            } else {
                error!(
                    "[ORCHESTRATOR] {} failed: {}",
                    name,
                    result.error_detail.as_deref().unwrap_or("-")
                );
            }
            results.insert(name, result);
        }

        let total_requested = requested.len();
        let success_count = results.values().filter(|r| r.is_success()).count();
        let failure_count = total_requested - success_count - skipped_count;
        let success_rate = if valid_count == 0 {
            0.0
        } else {
            success_count as f64 / valid_count as f64
        };

        let summary = RunSummary {
            run_id,
            validation,
            total_requested,
            valid_count,
            success_count,
            failure_count,
            skipped_count,
            success_rate,
            duration_seconds: started.elapsed().as_secs_f64(),
            adaptations,
            results,
        };

        info!(
            "[ORCHESTRATOR] Run {} finished: {}/{} published in {:.1}s",
            run_id, summary.success_count, summary.total_requested, summary.duration_seconds
        );
        Ok(summary)
    }
}
