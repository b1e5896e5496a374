//! LinkedIn connector
//!
//! Resolves the member id from `/v2/userinfo`, then posts a text share
//! through the UGC Posts API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{platform_failure, require};
use crate::services::media::MediaAsset;
use crate::services::social::{
    Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishReceipt, SocialError,
};

pub struct LinkedInConnector {
    client: Client,
    api_base: String,
    access_token: Option<String>,
}

impl LinkedInConnector {
    pub fn new(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        Self {
            client: settings.http_client(),
            api_base: settings.linkedin_api_base.clone(),
            access_token: credentials.linkedin_access_token.clone(),
        }
    }

    async fn member_urn(&self, token: &str) -> Result<String, SocialError> {
        let response = self
            .client
            .get(format!("{}/v2/userinfo", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("Failed to fetch LinkedIn user info", response).await);
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| SocialError::platform("Unreadable userinfo response", &e.to_string()))?;
        Ok(format!("urn:li:person:{}", info.sub))
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Debug, Serialize)]
struct LinkedInShareContent {
    author: String,
    #[serde(rename = "lifecycleState")]
    lifecycle_state: &'static str,
    #[serde(rename = "specificContent")]
    specific_content: LinkedInSpecificContent,
    visibility: LinkedInVisibility,
}

#[derive(Debug, Serialize)]
struct LinkedInSpecificContent {
    #[serde(rename = "com.linkedin.ugc.ShareContent")]
    share_content: LinkedInShareBody,
}

#[derive(Debug, Serialize)]
struct LinkedInShareBody {
    #[serde(rename = "shareCommentary")]
    share_commentary: LinkedInText,
    #[serde(rename = "shareMediaCategory")]
    share_media_category: &'static str,
}

#[derive(Debug, Serialize)]
struct LinkedInText {
    text: String,
}

#[derive(Debug, Serialize)]
struct LinkedInVisibility {
    #[serde(rename = "com.linkedin.ugc.MemberNetworkVisibility")]
    visibility: &'static str,
}

fn share_payload(author: String, text: &str) -> LinkedInShareContent {
    LinkedInShareContent {
        author,
        lifecycle_state: "PUBLISHED",
        specific_content: LinkedInSpecificContent {
            share_content: LinkedInShareBody {
                share_commentary: LinkedInText {
                    text: text.to_string(),
                },
                share_media_category: "NONE",
            },
        },
        visibility: LinkedInVisibility {
            visibility: "PUBLIC",
        },
    }
}

/// Numeric/opaque id at the end of a share URN.
pub fn post_id_from_urn(urn: &str) -> &str {
    urn.rsplit(':').next().unwrap_or(urn)
}

pub fn permalink(urn: &str) -> String {
    format!("https://www.linkedin.com/feed/update/{}", urn)
}

#[async_trait]
impl NetworkConnector for LinkedInConnector {
    fn network(&self) -> Network {
        Network::LinkedIn
    }

    async fn publish(
        &self,
        content: &PublishContent,
        _media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError> {
        let token = require(&self.access_token, "LINKEDIN_ACCESS_TOKEN")?;
        let author = self.member_urn(token).await?;

        let response = self
            .client
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&share_payload(author, &content.caption))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("LinkedIn publish failed", response).await);
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        let urn = raw["id"]
            .as_str()
            .map(str::to_string)
            .or(header_id)
            .ok_or_else(|| SocialError::platform("LinkedIn response without id", &raw.to_string()))?;

        Ok(PublishReceipt {
            post_id: Some(post_id_from_urn(&urn).to_string()),
            link: Some(permalink(&urn)),
            raw_response: raw,
        })
    }
}
