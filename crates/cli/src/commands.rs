//! Subcommand implementations

use std::collections::BTreeMap;

use anyhow::Result;
use herald::adapter::UNSUPPORTED_NETWORK;
use herald::{Adaptation, ContentItem, DistributionOrchestrator, HeraldConfig, HeraldError};
use serde::Serialize;
use services::services::social::{Network, NetworkCredentials};
use tracing::{info, warn};
use utils::external_services::{check_media_tools, MediaToolsStatus};

use crate::output;
use crate::OutputFormat;

/// Cancels the run on Ctrl-C; work already in flight finishes or times out.
fn cancel_on_ctrl_c(orchestrator: &DistributionOrchestrator) {
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[CLI] Interrupted; no new network work will start");
            token.cancel();
        }
    });
}

pub async fn publish(
    config: &HeraldConfig,
    text: &str,
    networks: &[String],
    caller: &str,
    format: OutputFormat,
) -> Result<()> {
    let content = ContentItem::new(text)?;
    info!("[CLI] publish requested by {} for {}", caller, networks.join(","));

    let orchestrator = DistributionOrchestrator::from_config(config);
    cancel_on_ctrl_c(&orchestrator);

    match orchestrator.run(&content, networks).await {
        Ok(summary) => {
            output::emit(&summary, format, output::print_summary)?;
            Ok(())
        }
        Err(HeraldError::ValidationRejected { reason }) => {
            output::print_rejection(&reason, format)?;
            anyhow::bail!("content rejected: {}", reason)
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptReport {
    pub validation: herald::ValidationVerdict,
    pub adaptations: BTreeMap<String, Adaptation>,
}

pub async fn adapt(
    config: &HeraldConfig,
    text: &str,
    networks: &[String],
    format: OutputFormat,
) -> Result<()> {
    let content = ContentItem::new(text)?;
    let orchestrator = DistributionOrchestrator::from_config(config);

    let validation = orchestrator.validator().validate(&content).await;
    if !validation.is_eligible {
        output::print_rejection(&validation.reason, format)?;
        anyhow::bail!("content rejected: {}", validation.reason);
    }

    let mut adaptations = BTreeMap::new();
    let mut supported = Vec::new();
    for name in networks {
        let name = name.trim().to_string();
        match Network::parse(&name) {
            Some(network) => supported.push((name, network)),
            None => {
                adaptations.insert(name.clone(), Adaptation::failed(name, UNSUPPORTED_NETWORK));
            }
        }
    }
    for adaptation in orchestrator.adapt_all(&content, &supported).await {
        adaptations.insert(adaptation.network.clone(), adaptation);
    }

    let report = AdaptReport {
        validation,
        adaptations,
    };
    output::emit(&report, format, |r| output::print_adaptations(&r.adaptations))
}

pub async fn validate(config: &HeraldConfig, text: &str, format: OutputFormat) -> Result<()> {
    let content = ContentItem::new(text)?;
    let orchestrator = DistributionOrchestrator::from_config(config);
    let verdict = orchestrator.validator().validate(&content).await;
    output::emit(&verdict, format, output::print_verdict)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub configured_networks: Vec<Network>,
    pub missing_networks: Vec<Network>,
    pub llm_key_present: bool,
    pub media_tools: MediaToolsStatus,
    pub services: BTreeMap<&'static str, bool>,
}

fn env_present(name: &str) -> bool {
    std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

pub async fn doctor(config: &HeraldConfig, format: OutputFormat) -> Result<()> {
    let configured = NetworkCredentials::from_env().configured_networks();
    let missing = [
        Network::Facebook,
        Network::Instagram,
        Network::LinkedIn,
        Network::WhatsApp,
        Network::TikTok,
    ]
    .into_iter()
    .filter(|n| !configured.contains(n))
    .collect();

    let video = &config.media.video;
    let media_tools =
        check_media_tools(video.ffmpeg_path.as_deref(), video.ffprobe_path.as_deref()).await;

    let services = [
        ("pexels", env_present("PEXELS_API_KEY")),
        ("elevenlabs", env_present("ELEVENLABS_API_KEY")),
        ("imgur", env_present("IMGUR_CLIENT_ID")),
    ]
    .into_iter()
    .collect();

    let report = DoctorReport {
        configured_networks: configured,
        missing_networks: missing,
        llm_key_present: config.llm.provider.api_key_env().is_none_or(env_present),
        media_tools,
        services,
    };
    output::emit(&report, format, output::print_doctor)
}
