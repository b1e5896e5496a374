//! Social network publishing
//!
//! One connector per network behind [`NetworkConnector`]; the
//! [`PublisherRegistry`] turns every connector outcome, including panics and
//! timeouts, into a [`PublishResult`].

pub mod connectors;
pub mod registry;

pub use registry::PublisherRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use ts_rs::TS;

use super::media::MediaAsset;

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("Credentials not configured: {0}")]
    NotConfigured(String),
    #[error("Missing media: {0}")]
    MissingMedia(String),
    #[error("Platform API error: {message}")]
    PlatformError {
        message: String,
        body: serde_json::Value,
    },
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Publish timed out after {0}s")]
    Timeout(u64),
}

impl SocialError {
    /// Builds a [`SocialError::PlatformError`] keeping the provider body,
    /// parsed as JSON when possible.
    pub fn platform(message: impl Into<String>, body: &str) -> Self {
        let body = serde_json::from_str(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
        SocialError::PlatformError {
            message: message.into(),
            body,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SocialError::NetworkError(_) | SocialError::Timeout(_) => {
                FailureKind::ServiceUnavailable
            }
            _ => FailureKind::PublishFailed,
        }
    }

    pub fn raw_response(&self) -> serde_json::Value {
        match self {
            SocialError::PlatformError { body, .. } => body.clone(),
            _ => serde_json::Value::Null,
        }
    }
}

impl From<reqwest::Error> for SocialError {
    fn from(err: reqwest::Error) -> Self {
        SocialError::NetworkError(err.to_string())
    }
}

/// Supported target networks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    TS,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Network {
    Facebook,
    Instagram,
    LinkedIn,
    WhatsApp,
    TikTok,
}

/// Media a network needs before it can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequirement {
    None,
    HostedImage,
    InlineImage,
    Video,
}

impl Network {
    /// Parse a request string, tolerating surrounding whitespace and case.
    pub fn parse(name: &str) -> Option<Network> {
        name.trim().parse().ok()
    }

    pub fn media_requirement(&self) -> MediaRequirement {
        match self {
            Network::Facebook | Network::LinkedIn => MediaRequirement::None,
            Network::Instagram => MediaRequirement::HostedImage,
            Network::WhatsApp => MediaRequirement::InlineImage,
            Network::TikTok => MediaRequirement::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Success,
    Error,
}

/// Where a per-network branch of a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    Unsupported,
    AdaptationFailed,
    MediaGenerationFailed,
    PublishFailed,
    ServiceUnavailable,
}

/// What a connector reports after a successful publish.
#[derive(Debug, Clone, Default)]
pub struct PublishReceipt {
    pub post_id: Option<String>,
    pub link: Option<String>,
    pub raw_response: serde_json::Value,
}

/// Outcome of one network's branch of a run.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    /// Network name as requested by the caller
    pub network: String,
    pub status: PublishStatus,
    pub post_id: Option<String>,
    pub link: Option<String>,
    pub raw_response: serde_json::Value,
    pub error_detail: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl PublishResult {
    pub fn success(network: impl Into<String>, receipt: PublishReceipt) -> Self {
        Self {
            network: network.into(),
            status: PublishStatus::Success,
            post_id: receipt.post_id,
            link: receipt.link,
            raw_response: receipt.raw_response,
            error_detail: None,
            failure_kind: None,
        }
    }

    pub fn failure(
        network: impl Into<String>,
        kind: FailureKind,
        detail: impl Into<String>,
        raw_response: serde_json::Value,
    ) -> Self {
        Self {
            network: network.into(),
            status: PublishStatus::Error,
            post_id: None,
            link: None,
            raw_response,
            error_detail: Some(detail.into()),
            failure_kind: Some(kind),
        }
    }

    pub fn from_error(network: impl Into<String>, error: &SocialError) -> Self {
        Self::failure(network, error.failure_kind(), error.to_string(), error.raw_response())
    }

    pub fn is_success(&self) -> bool {
        self.status == PublishStatus::Success
    }
}

/// Text handed to a connector. `caption` already carries any hashtags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishContent {
    pub caption: String,
    pub hashtags: Vec<String>,
}

/// Access tokens and account ids, sourced from the environment.
#[derive(Debug, Clone, Default)]
pub struct NetworkCredentials {
    pub meta_access_token: Option<String>,
    pub facebook_page_id: Option<String>,
    pub instagram_account_id: Option<String>,
    pub linkedin_access_token: Option<String>,
    pub whapi_token: Option<String>,
    pub tiktok_access_token: Option<String>,
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl NetworkCredentials {
    pub fn from_env() -> Self {
        Self {
            meta_access_token: env_secret("META_ACCESS_TOKEN"),
            facebook_page_id: env_secret("FACEBOOK_PAGE_ID"),
            instagram_account_id: env_secret("INSTAGRAM_ACCOUNT_ID"),
            linkedin_access_token: env_secret("LINKEDIN_ACCESS_TOKEN"),
            whapi_token: env_secret("WHAPI_TOKEN"),
            tiktok_access_token: env_secret("TIKTOK_ACCESS_TOKEN"),
        }
    }

    /// Networks whose credentials are all present.
    pub fn configured_networks(&self) -> Vec<Network> {
        let mut networks = Vec::new();
        if self.meta_access_token.is_some() && self.facebook_page_id.is_some() {
            networks.push(Network::Facebook);
        }
        if self.meta_access_token.is_some() && self.instagram_account_id.is_some() {
            networks.push(Network::Instagram);
        }
        if self.linkedin_access_token.is_some() {
            networks.push(Network::LinkedIn);
        }
        if self.whapi_token.is_some() {
            networks.push(Network::WhatsApp);
        }
        if self.tiktok_access_token.is_some() {
            networks.push(Network::TikTok);
        }
        networks
    }
}

/// Endpoints and publish behaviour shared by the connectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub graph_api_base: String,
    pub linkedin_api_base: String,
    pub whapi_base: String,
    pub tiktok_api_base: String,
    /// Account handle used to build public TikTok links
    pub tiktok_username: Option<String>,
    pub tiktok_privacy_level: String,
    pub tiktok_status_poll_interval_secs: u64,
    pub tiktok_status_poll_attempts: usize,
    pub request_timeout_secs: u64,
    /// Upper bound for one network's whole publish step
    pub publish_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            graph_api_base: "https://graph.facebook.com/v19.0".to_string(),
            linkedin_api_base: "https://api.linkedin.com".to_string(),
            whapi_base: "https://gate.whapi.cloud".to_string(),
            tiktok_api_base: "https://open.tiktokapis.com".to_string(),
            tiktok_username: None,
            tiktok_privacy_level: "SELF_ONLY".to_string(),
            tiktok_status_poll_interval_secs: 3,
            tiktok_status_poll_attempts: 10,
            request_timeout_secs: 60,
            publish_timeout_secs: 300,
        }
    }
}

impl NetworkSettings {
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    }
}

#[async_trait]
pub trait NetworkConnector: Send + Sync {
    fn network(&self) -> Network;

    async fn publish(
        &self,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn network_parsing_is_case_insensitive() {
        assert_eq!(Network::parse("Facebook"), Some(Network::Facebook));
        assert_eq!(Network::parse(" LINKEDIN "), Some(Network::LinkedIn));
        assert_eq!(Network::parse("whatsapp"), Some(Network::WhatsApp));
        assert_eq!(Network::parse("tiktok"), Some(Network::TikTok));
        assert_eq!(Network::parse("myspace"), None);
    }

    #[test]
    fn network_display_round_trips() {
        for network in Network::iter() {
            assert_eq!(Network::parse(&network.to_string()), Some(network));
            let json = serde_json::to_value(network).unwrap();
            assert_eq!(json, serde_json::json!(network.to_string()));
        }
    }

    #[test]
    fn media_requirements() {
        assert_eq!(Network::Facebook.media_requirement(), MediaRequirement::None);
        assert_eq!(Network::Instagram.media_requirement(), MediaRequirement::HostedImage);
        assert_eq!(Network::WhatsApp.media_requirement(), MediaRequirement::InlineImage);
        assert_eq!(Network::TikTok.media_requirement(), MediaRequirement::Video);
    }

    #[test]
    fn platform_error_keeps_json_body() {
        let err = SocialError::platform("bad", r#"{"error":{"code":190}}"#);
        assert_eq!(err.raw_response()["error"]["code"], 190);
        assert_eq!(err.failure_kind(), FailureKind::PublishFailed);

        let err = SocialError::platform("bad", "<html>oops</html>");
        assert_eq!(err.raw_response(), serde_json::json!("<html>oops</html>"));
    }

    #[test]
    fn failure_result_serializes_camel_case() {
        let result = PublishResult::from_error("tiktok", &SocialError::NetworkError("reset".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["failureKind"], "service_unavailable");
        assert!(json["errorDetail"].as_str().unwrap().contains("reset"));
    }

    #[test]
    fn configured_networks_follow_credentials() {
        let creds = NetworkCredentials {
            meta_access_token: Some("t".into()),
            instagram_account_id: Some("1".into()),
            whapi_token: Some("w".into()),
            ..Default::default()
        };
        assert_eq!(
            creds.configured_networks(),
            vec![Network::Instagram, Network::WhatsApp]
        );
    }
}
