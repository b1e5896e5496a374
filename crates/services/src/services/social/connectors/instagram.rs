//! Instagram connector
//!
//! Graph API content publishing for business accounts: create a media
//! container from a hosted image, publish it, then read back the permalink.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::{platform_failure, require};
use crate::services::media::MediaAsset;
use crate::services::social::{
    Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishReceipt, SocialError,
};

/// Graph error subcode returned when the account id is not an Instagram business account
const INVALID_ACCOUNT_SUBCODE: i64 = 33;

pub struct InstagramConnector {
    client: Client,
    graph_api_base: String,
    access_token: Option<String>,
    account_id: Option<String>,
}

impl InstagramConnector {
    pub fn new(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        Self {
            client: settings.http_client(),
            graph_api_base: settings.graph_api_base.clone(),
            access_token: credentials.meta_access_token.clone(),
            account_id: credentials.instagram_account_id.clone(),
        }
    }

    fn hosted_image_url(media: Option<&MediaAsset>) -> Result<&str, SocialError> {
        match media.and_then(MediaAsset::as_image) {
            Some(image) if !image.is_inline_data => Ok(image.url.as_str()),
            Some(_) => Err(SocialError::MissingMedia(
                "Instagram needs a publicly fetchable image URL, not inline data".to_string(),
            )),
            None => Err(SocialError::MissingMedia(
                "Instagram requires an image".to_string(),
            )),
        }
    }

    async fn create_container(
        &self,
        account_id: &str,
        token: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<String, SocialError> {
        let response = self
            .client
            .post(format!("{}/{}/media", self.graph_api_base, account_id))
            .form(&[("image_url", image_url), ("caption", caption), ("access_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = platform_failure("Failed to create media container", response).await;
            if let SocialError::PlatformError { body, .. } = &err {
                if body["error"]["error_subcode"].as_i64() == Some(INVALID_ACCOUNT_SUBCODE) {
                    warn!(
                        "[INSTAGRAM] INSTAGRAM_ACCOUNT_ID does not look like a business account id linked to the page"
                    );
                }
            }
            return Err(err);
        }

        let container: IdResponse = response
            .json()
            .await
            .map_err(|e| SocialError::platform("Unreadable container response", &e.to_string()))?;
        Ok(container.id)
    }

    async fn publish_container(
        &self,
        account_id: &str,
        token: &str,
        container_id: &str,
    ) -> Result<serde_json::Value, SocialError> {
        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.graph_api_base, account_id))
            .form(&[("creation_id", container_id), ("access_token", token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("Failed to publish", response).await);
        }

        response
            .json()
            .await
            .map_err(|e| SocialError::platform("Unreadable publish response", &e.to_string()))
    }

    /// Best effort; a missing permalink does not fail the publish.
    async fn fetch_permalink(&self, media_id: &str, token: &str) -> Option<String> {
        let response = self
            .client
            .get(format!("{}/{}", self.graph_api_base, media_id))
            .query(&[("fields", "id,permalink"), ("access_token", token)])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            warn!("[INSTAGRAM] Permalink lookup for {} returned {}", media_id, response.status());
            return None;
        }

        let body: PermalinkResponse = response.json().await.ok()?;
        body.permalink
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    permalink: Option<String>,
}

#[async_trait]
impl NetworkConnector for InstagramConnector {
    fn network(&self) -> Network {
        Network::Instagram
    }

    async fn publish(
        &self,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError> {
        let token = require(&self.access_token, "META_ACCESS_TOKEN")?;
        let account_id = require(&self.account_id, "INSTAGRAM_ACCOUNT_ID")?;
        let image_url = Self::hosted_image_url(media)?;

        let container_id = self
            .create_container(account_id, token, image_url, &content.caption)
            .await?;
        let raw = self.publish_container(account_id, token, &container_id).await?;

        let media_id = raw["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SocialError::platform("Publish response without id", &raw.to_string()))?;

        let link = self.fetch_permalink(&media_id, token).await;

        Ok(PublishReceipt {
            post_id: Some(media_id),
            link,
            raw_response: raw,
        })
    }
}
