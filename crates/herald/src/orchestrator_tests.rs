//! Run-level tests for the distribution orchestrator

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use services::services::imaging::{ImageMode, ImageProducer};
    use services::services::llm::{
        ChatRequest, LLMProviderTrait, LlmConfig, LlmService, ProviderError, ProviderResponse,
        ProviderType,
    };
    use services::services::llm::LlmTask;
    use services::services::media::{ImageAsset, MediaAsset, VideoAsset};
    use services::services::social::{
        FailureKind, Network, NetworkConnector, PublishContent, PublishReceipt, PublisherRegistry,
        SocialError,
    };
    use services::services::video::{
        PipelineFailure, PipelineStage, VideoError, VideoProducer, VideoRequest,
    };
    use tokio_util::sync::CancellationToken;

    use crate::orchestrator::{DistributionOrchestrator, OrchestratorParts, RUN_CANCELLED};
    use crate::{ContentItem, ContentValidator, HeraldConfig, HeraldError, NetworkAdapter};

    /// Answers validation with a fixed verdict and adaptation per network.
    struct FakeModel {
        verdict: &'static str,
        broken: HashSet<&'static str>,
        adapt_calls: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn eligible() -> Self {
            Self {
                verdict: r#"{"is_eligible": true, "reason": "institutional announcement"}"#,
                broken: HashSet::new(),
                adapt_calls: Mutex::new(Vec::new()),
            }
        }

        fn target(request: &ChatRequest) -> String {
            request.messages[1]
                .content
                .lines()
                .find_map(|line| line.strip_prefix("Target network: "))
                .unwrap_or_default()
                .to_string()
        }
    }

    #[async_trait]
    impl LLMProviderTrait for FakeModel {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
        fn name(&self) -> &'static str {
            "fake"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(&self, request: ChatRequest) -> Result<ProviderResponse, ProviderError> {
            let system = request.messages[0].content.as_str();
            let content = if system == LlmService::system_prompt(LlmTask::Validate) {
                self.verdict.to_string()
            } else {
                let network = Self::target(&request);
                self.adapt_calls.lock().unwrap().push(network.clone());
                if self.broken.contains(network.as_str()) {
                    "I cannot do that".to_string()
                } else {
                    serde_json::json!({
                        "text": format!("{} version", network),
                        "hashtags": ["#UAGRM", "#FICCT", "#Inscripciones"],
                        "suggested_image_prompt": "students queueing at the registration office",
                        "narration_script": "Inscripciones abiertas"
                    })
                    .to_string()
                }
            };
            Ok(ProviderResponse {
                content,
                usage: None,
            })
        }
    }

    #[derive(Default)]
    struct FakeImages {
        requests: Mutex<Vec<(String, ImageMode)>>,
    }

    #[async_trait]
    impl ImageProducer for FakeImages {
        async fn synthesize_image(&self, prompt: &str, mode: ImageMode) -> ImageAsset {
            self.requests.lock().unwrap().push((prompt.to_string(), mode));
            let inline = mode == ImageMode::InlineData;
            ImageAsset {
                url: if inline {
                    "data:image/jpeg;base64,AAAA".to_string()
                } else {
                    "https://i.imgur.com/generated.jpg".to_string()
                },
                is_inline_data: inline,
                is_fallback: false,
            }
        }
    }

    struct FakeVideo {
        fail: bool,
    }

    #[async_trait]
    impl VideoProducer for FakeVideo {
        async fn produce(&self, request: &VideoRequest) -> Result<VideoAsset, PipelineFailure> {
            assert_eq!(request.narration_script.as_deref(), Some("Inscripciones abiertas"));
            if self.fail {
                return Err(PipelineFailure {
                    stage: PipelineStage::Mux,
                    error: VideoError::DurationMismatch {
                        video: 9.0,
                        narration: 12.0,
                    },
                });
            }
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("final.mp4");
            std::fs::write(&path, b"video").unwrap();
            Ok(VideoAsset::new(dir, path, 12.0))
        }
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Panic,
    }

    #[derive(Debug, Clone)]
    struct Delivery {
        caption: String,
        media_kind: Option<&'static str>,
        inline: Option<bool>,
        video_path: Option<PathBuf>,
    }

    struct FakeConnector {
        network: Network,
        outcome: Outcome,
        deliveries: Arc<Mutex<Vec<Delivery>>>,
    }

    #[async_trait]
    impl NetworkConnector for FakeConnector {
        fn network(&self) -> Network {
            self.network
        }

        async fn publish(
            &self,
            content: &PublishContent,
            media: Option<&MediaAsset>,
        ) -> Result<PublishReceipt, SocialError> {
            self.deliveries.lock().unwrap().push(Delivery {
                caption: content.caption.clone(),
                media_kind: media.map(MediaAsset::kind),
                inline: media.and_then(MediaAsset::as_image).map(|i| i.is_inline_data),
                video_path: media
                    .and_then(MediaAsset::as_video)
                    .map(|v| v.local_path().to_path_buf()),
            });
            match self.outcome {
                Outcome::Succeed => Ok(PublishReceipt {
                    post_id: Some(format!("{}-1", self.network)),
                    link: Some(format!("https://example.test/{}", self.network)),
                    raw_response: serde_json::json!({"id": "1"}),
                }),
                Outcome::Fail => Err(SocialError::platform(
                    "Failed to publish",
                    r#"{"error":{"message":"Invalid OAuth access token"}}"#,
                )),
                Outcome::Panic => panic!("connector bug"),
            }
        }
    }

    struct Harness {
        model: Arc<FakeModel>,
        images: Arc<FakeImages>,
        deliveries: Arc<Mutex<Vec<Delivery>>>,
        orchestrator: DistributionOrchestrator,
    }

    impl Harness {
        fn publishes(&self) -> usize {
            self.deliveries.lock().unwrap().len()
        }
    }

    fn harness(model: FakeModel, outcomes: &[(Network, Outcome)], video: Option<FakeVideo>) -> Harness {
        let model = Arc::new(model);
        let images = Arc::new(FakeImages::default());
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let config = HeraldConfig::default();
        let llm = LlmService::new(model.clone(), &LlmConfig::default());

        let mut registry = PublisherRegistry::new(Duration::from_secs(5));
        for (network, outcome) in outcomes {
            registry.register(Arc::new(FakeConnector {
                network: *network,
                outcome: *outcome,
                deliveries: deliveries.clone(),
            }));
        }

        let parts = OrchestratorParts {
            validator: ContentValidator::new(llm.clone(), "UAGRM", true),
            adapter: NetworkAdapter::new(llm, "UAGRM"),
            images: images.clone(),
            video: video.map(|v| Arc::new(v) as Arc<dyn VideoProducer>),
            registry,
        };

        Harness {
            model,
            images,
            deliveries,
            orchestrator: DistributionOrchestrator::new(parts, &config),
        }
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn announcement() -> ContentItem {
        ContentItem::new("La Facultad anuncia inscripciones").unwrap()
    }

    #[tokio::test]
    async fn rejected_content_publishes_nothing() {
        let model = FakeModel {
            verdict: r#"{"is_eligible": false, "reason": "unrelated to institution"}"#,
            ..FakeModel::eligible()
        };
        let h = harness(model, &[(Network::Facebook, Outcome::Succeed)], None);

        let err = h
            .orchestrator
            .run(&announcement(), &targets(&["facebook", "instagram"]))
            .await
            .unwrap_err();

        assert!(matches!(err, HeraldError::ValidationRejected { ref reason } if reason == "unrelated to institution"));
        assert!(h.model.adapt_calls.lock().unwrap().is_empty());
        assert!(h.images.requests.lock().unwrap().is_empty());
        assert_eq!(h.publishes(), 0);
    }

    #[tokio::test]
    async fn facebook_is_text_only_and_instagram_gets_an_image() {
        let h = harness(
            FakeModel::eligible(),
            &[(Network::Facebook, Outcome::Succeed), (Network::Instagram, Outcome::Succeed)],
            None,
        );

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["facebook", "instagram"]))
            .await
            .unwrap();

        assert_eq!(summary.total_requested, 2);
        assert_eq!(summary.valid_count, 2);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.success_rate, 1.0);
        assert_eq!(summary.adaptations["instagram"].target, Some(Network::Instagram));
        assert!(summary.results["facebook"].is_success());
        assert_eq!(summary.results["instagram"].post_id.as_deref(), Some("instagram-1"));

        let images = h.images.requests.lock().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].0, "students queueing at the registration office");
        assert_eq!(images[0].1, ImageMode::UrlHosted);

        let deliveries = h.deliveries.lock().unwrap();
        let facebook = deliveries.iter().find(|d| d.caption.starts_with("facebook")).unwrap();
        assert_eq!(facebook.media_kind, None);
        assert_eq!(facebook.caption, "facebook version\n\n#UAGRM #FICCT #Inscripciones");
        let instagram = deliveries.iter().find(|d| d.caption.starts_with("instagram")).unwrap();
        assert_eq!(instagram.media_kind, Some("image"));
        assert_eq!(instagram.inline, Some(false));
    }

    #[tokio::test]
    async fn one_network_failing_or_panicking_does_not_stop_the_others() {
        let h = harness(
            FakeModel::eligible(),
            &[
                (Network::Facebook, Outcome::Succeed),
                (Network::LinkedIn, Outcome::Panic),
                (Network::Instagram, Outcome::Fail),
                (Network::WhatsApp, Outcome::Succeed),
            ],
            None,
        );

        let summary = h
            .orchestrator
            .run(
                &announcement(),
                &targets(&["facebook", "linkedin", "instagram", "whatsapp"]),
            )
            .await
            .unwrap();

        assert!(summary.results["facebook"].is_success());
        assert!(summary.results["whatsapp"].is_success());

        let linkedin = &summary.results["linkedin"];
        assert!(!linkedin.is_success());
        assert_eq!(linkedin.failure_kind, Some(FailureKind::PublishFailed));

        let instagram = &summary.results["instagram"];
        assert_eq!(instagram.failure_kind, Some(FailureKind::PublishFailed));
        assert_eq!(
            instagram.raw_response["error"]["message"],
            "Invalid OAuth access token"
        );

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 2);
        assert_eq!(summary.skipped_count, 0);
    }

    #[tokio::test]
    async fn unknown_network_is_reported_without_affecting_others() {
        let h = harness(FakeModel::eligible(), &[(Network::Facebook, Outcome::Succeed)], None);

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["facebook", "myspace"]))
            .await
            .unwrap();

        let myspace = &summary.results["myspace"];
        assert_eq!(myspace.failure_kind, Some(FailureKind::Unsupported));
        assert_eq!(myspace.network, "myspace");
        assert!(summary.results["facebook"].is_success());
        assert_eq!(summary.skipped_count, 1);
        assert!(!summary.adaptations.contains_key("myspace"));
        assert_eq!(*h.model.adapt_calls.lock().unwrap(), vec!["facebook"]);
    }

    #[tokio::test]
    async fn results_are_keyed_by_requested_name() {
        let h = harness(FakeModel::eligible(), &[(Network::LinkedIn, Outcome::Succeed)], None);

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["LinkedIn", "linkedin"]))
            .await
            .unwrap();

        assert_eq!(summary.total_requested, 1);
        assert_eq!(summary.results["LinkedIn"].network, "LinkedIn");
    }

    #[tokio::test]
    async fn failed_adaptation_is_isolated() {
        let model = FakeModel {
            broken: ["instagram"].into_iter().collect(),
            ..FakeModel::eligible()
        };
        let h = harness(
            model,
            &[(Network::Facebook, Outcome::Succeed), (Network::Instagram, Outcome::Succeed)],
            None,
        );

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["facebook", "instagram"]))
            .await
            .unwrap();

        assert_eq!(
            summary.results["instagram"].failure_kind,
            Some(FailureKind::AdaptationFailed)
        );
        assert!(summary.adaptations["instagram"].error.is_some());
        assert!(summary.results["facebook"].is_success());
        assert_eq!(summary.valid_count, 1);
        assert_eq!(summary.total_requested, 2);
        assert_eq!(summary.success_rate, 1.0);
        assert_eq!(h.publishes(), 1);
    }

    #[tokio::test]
    async fn no_adaptable_network_ends_the_run() {
        let model = FakeModel {
            broken: ["facebook"].into_iter().collect(),
            ..FakeModel::eligible()
        };
        let h = harness(model, &[(Network::Facebook, Outcome::Succeed)], None);

        let err = h
            .orchestrator
            .run(&announcement(), &targets(&["facebook", "myspace"]))
            .await
            .unwrap_err();

        match err {
            HeraldError::NoValidNetworks { reasons } => {
                assert_eq!(reasons.len(), 2);
                assert_eq!(reasons["myspace"], "unsupported network");
                assert!(reasons["facebook"].starts_with("adaptation failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.publishes(), 0);
    }

    #[tokio::test]
    async fn whatsapp_gets_an_inline_image_and_no_hashtags() {
        let h = harness(FakeModel::eligible(), &[(Network::WhatsApp, Outcome::Succeed)], None);

        h.orchestrator
            .run(&announcement(), &targets(&["whatsapp"]))
            .await
            .unwrap();

        let images = h.images.requests.lock().unwrap();
        assert_eq!(
            images[0].0,
            "UAGRM, academic topic: La Facultad anuncia inscripciones"
        );
        assert_eq!(images[0].1, ImageMode::InlineData);

        let deliveries = h.deliveries.lock().unwrap();
        assert_eq!(deliveries[0].caption, "whatsapp version");
        assert_eq!(deliveries[0].inline, Some(true));
    }

    #[tokio::test]
    async fn tiktok_video_is_removed_after_publishing() {
        let h = harness(
            FakeModel::eligible(),
            &[(Network::TikTok, Outcome::Succeed)],
            Some(FakeVideo { fail: false }),
        );

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["tiktok"]))
            .await
            .unwrap();

        assert!(summary.results["tiktok"].is_success());
        let deliveries = h.deliveries.lock().unwrap();
        assert_eq!(deliveries[0].media_kind, Some("video"));
        let path = deliveries[0].video_path.clone().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn video_failure_only_fails_tiktok() {
        let h = harness(
            FakeModel::eligible(),
            &[(Network::TikTok, Outcome::Succeed), (Network::Facebook, Outcome::Succeed)],
            Some(FakeVideo { fail: true }),
        );

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["tiktok", "facebook"]))
            .await
            .unwrap();

        let tiktok = &summary.results["tiktok"];
        assert_eq!(tiktok.failure_kind, Some(FailureKind::MediaGenerationFailed));
        assert_eq!(tiktok.raw_response["code"], "mux_failed");
        assert!(summary.results["facebook"].is_success());
        assert_eq!(h.publishes(), 1);
    }

    #[tokio::test]
    async fn missing_video_pipeline_fails_tiktok() {
        let h = harness(FakeModel::eligible(), &[(Network::TikTok, Outcome::Succeed)], None);

        let summary = h
            .orchestrator
            .run(&announcement(), &targets(&["tiktok"]))
            .await
            .unwrap();

        assert_eq!(
            summary.results["tiktok"].failure_kind,
            Some(FailureKind::MediaGenerationFailed)
        );
        assert_eq!(h.publishes(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_starts_no_network_work() {
        let token = CancellationToken::new();
        let h = harness(FakeModel::eligible(), &[(Network::Facebook, Outcome::Succeed)], None);
        let orchestrator = h.orchestrator.with_cancellation(token.clone());
        token.cancel();

        let err = orchestrator
            .run(&announcement(), &targets(&["facebook"]))
            .await
            .unwrap_err();

        assert!(matches!(err, HeraldError::NoValidNetworks { ref reasons } if reasons["facebook"] == RUN_CANCELLED));
        assert!(h.model.adapt_calls.lock().unwrap().is_empty());
        assert_eq!(h.deliveries.lock().unwrap().len(), 0);
    }
}
