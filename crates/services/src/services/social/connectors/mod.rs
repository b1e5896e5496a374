//! Network-specific connectors
//!
//! Each connector implements [`NetworkConnector`](super::NetworkConnector) for one network.

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod whatsapp;

use super::SocialError;

/// Reads a non-success response into a [`SocialError::PlatformError`].
pub(crate) async fn platform_failure(context: &str, response: reqwest::Response) -> SocialError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SocialError::platform(format!("{} ({})", context, status), &body)
}

/// Requires a credential, naming the environment variable when absent.
pub(crate) fn require<'a>(value: &'a Option<String>, env_name: &str) -> Result<&'a str, SocialError> {
    value
        .as_deref()
        .ok_or_else(|| SocialError::NotConfigured(format!("{} not set", env_name)))
}
