//! Facebook Page connector (Graph API)
//!
//! Text goes to `/{page}/feed`; a hosted image switches to `/{page}/photos`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{platform_failure, require};
use crate::services::media::MediaAsset;
use crate::services::social::{
    Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishReceipt, SocialError,
};

pub struct FacebookConnector {
    client: Client,
    graph_api_base: String,
    access_token: Option<String>,
    page_id: Option<String>,
}

impl FacebookConnector {
    pub fn new(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        Self {
            client: settings.http_client(),
            graph_api_base: settings.graph_api_base.clone(),
            access_token: credentials.meta_access_token.clone(),
            page_id: credentials.facebook_page_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    id: Option<String>,
    post_id: Option<String>,
}

/// `{page}_{post}` ids map onto `/{page}/posts/{post}`.
pub fn permalink(post_id: &str) -> String {
    format!("https://www.facebook.com/{}", post_id.replacen('_', "/posts/", 1))
}

#[async_trait]
impl NetworkConnector for FacebookConnector {
    fn network(&self) -> Network {
        Network::Facebook
    }

    async fn publish(
        &self,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError> {
        let token = require(&self.access_token, "META_ACCESS_TOKEN")?;
        let page_id = require(&self.page_id, "FACEBOOK_PAGE_ID")?;

        let image_url = media
            .and_then(MediaAsset::as_image)
            .filter(|img| !img.is_inline_data)
            .map(|img| img.url.as_str());

        let request = match image_url {
            Some(url) => self
                .client
                .post(format!("{}/{}/photos", self.graph_api_base, page_id))
                .form(&[("url", url), ("caption", content.caption.as_str()), ("access_token", token)]),
            None => self
                .client
                .post(format!("{}/{}/feed", self.graph_api_base, page_id))
                .form(&[("message", content.caption.as_str()), ("access_token", token)]),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(platform_failure("Facebook publish failed", response).await);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SocialError::platform("Facebook response unreadable", &e.to_string()))?;
        let parsed: PostResponse = serde_json::from_value(raw.clone())
            .map_err(|e| SocialError::platform(e.to_string(), &raw.to_string()))?;

        let post_id = parsed
            .post_id
            .or(parsed.id)
            .ok_or_else(|| SocialError::platform("Facebook response without id", &raw.to_string()))?;

        Ok(PublishReceipt {
            link: Some(permalink(&post_id)),
            post_id: Some(post_id),
            raw_response: raw,
        })
    }
}
