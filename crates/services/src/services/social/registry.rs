//! Connector lookup plus failure containment for a single publish.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{error, info};

use super::connectors::{
    facebook::FacebookConnector, instagram::InstagramConnector, linkedin::LinkedInConnector,
    tiktok::TikTokConnector, whatsapp::WhatsAppConnector,
};
use super::{
    FailureKind, Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishResult, SocialError,
};
use crate::services::media::MediaAsset;

pub struct PublisherRegistry {
    connectors: HashMap<Network, Arc<dyn NetworkConnector>>,
    publish_timeout: Duration,
}

impl PublisherRegistry {
    pub fn new(publish_timeout: Duration) -> Self {
        Self {
            connectors: HashMap::new(),
            publish_timeout,
        }
    }

    /// Registry with a live connector for every supported network.
    pub fn with_defaults(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        let mut registry = Self::new(Duration::from_secs(settings.publish_timeout_secs));
        registry.register(Arc::new(FacebookConnector::new(settings, credentials)));
        registry.register(Arc::new(InstagramConnector::new(settings, credentials)));
        registry.register(Arc::new(LinkedInConnector::new(settings, credentials)));
        registry.register(Arc::new(WhatsAppConnector::new(settings, credentials)));
        registry.register(Arc::new(TikTokConnector::new(settings, credentials)));
        registry
    }

    /// Adds or replaces the connector for its network.
    pub fn register(&mut self, connector: Arc<dyn NetworkConnector>) {
        self.connectors.insert(connector.network(), connector);
    }

    pub fn get(&self, network: Network) -> Option<Arc<dyn NetworkConnector>> {
        self.connectors.get(&network).cloned()
    }

    pub fn networks(&self) -> Vec<Network> {
        let mut networks: Vec<Network> = self.connectors.keys().copied().collect();
        networks.sort();
        networks
    }

    /// Publishes through the network's connector. Never fails: errors,
    /// timeouts and panics all come back as an error [`PublishResult`].
    pub async fn publish(
        &self,
        network: Network,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> PublishResult {
        let Some(connector) = self.get(network) else {
            return PublishResult::failure(
                network.to_string(),
                FailureKind::Unsupported,
                format!("no connector registered for {}", network),
                serde_json::Value::Null,
            );
        };

        let attempt = AssertUnwindSafe(connector.publish(content, media)).catch_unwind();
        let outcome = match tokio::time::timeout(self.publish_timeout, attempt).await {
            Err(_) => Err(SocialError::Timeout(self.publish_timeout.as_secs())),
            Ok(Err(_panic)) => {
                error!("[PUBLISH] {} connector panicked", network);
                return PublishResult::failure(
                    network.to_string(),
                    FailureKind::PublishFailed,
                    "connector panicked",
                    serde_json::Value::Null,
                );
            }
            Ok(Ok(result)) => result,
        };

        match outcome {
            Ok(receipt) => {
                info!(
                    "[PUBLISH] {} published (post_id={})",
                    network,
                    receipt.post_id.as_deref().unwrap_or("-")
                );
                PublishResult::success(network.to_string(), receipt)
            }
            Err(e) => {
                error!("[PUBLISH] {} failed: {}", network, e);
                PublishResult::from_error(network.to_string(), &e)
            }
        }
    }
}
