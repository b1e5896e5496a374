//! TikTok connector (Content Posting API, direct post)
//!
//! Three steps: initialise a single-chunk FILE_UPLOAD, PUT the bytes to the
//! returned upload URL, then poll the publish status until TikTok reports a
//! terminal state or the polling budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{platform_failure, require};
use crate::services::media::MediaAsset;
use crate::services::social::{
    Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishReceipt, SocialError,
};

const TITLE_MAX_CHARS: usize = 150;

pub struct TikTokConnector {
    client: Client,
    api_base: String,
    access_token: Option<String>,
    username: Option<String>,
    privacy_level: String,
    poll_interval: Duration,
    poll_attempts: usize,
}

#[derive(Debug, Deserialize)]
struct InitEnvelope {
    data: Option<InitData>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

/// Outcome of one status fetch that is not yet final.
#[derive(Debug)]
enum StatusPoll {
    Pending(serde_json::Value),
    Failed(SocialError),
}

impl TikTokConnector {
    pub fn new(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        Self {
            client: settings.http_client(),
            api_base: settings.tiktok_api_base.trim_end_matches('/').to_string(),
            access_token: credentials.tiktok_access_token.clone(),
            username: settings.tiktok_username.clone(),
            privacy_level: settings.tiktok_privacy_level.clone(),
            poll_interval: Duration::from_secs(settings.tiktok_status_poll_interval_secs),
            poll_attempts: settings.tiktok_status_poll_attempts,
        }
    }

    fn init_payload(&self, caption: &str, video_size: u64) -> serde_json::Value {
        let title: String = caption.chars().take(TITLE_MAX_CHARS).collect();
        serde_json::json!({
            "post_info": {
                "title": title,
                "privacy_level": self.privacy_level,
                "disable_duet": false,
                "disable_comment": false,
                "disable_stitch": false,
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": video_size,
                "total_chunk_count": 1,
            }
        })
    }

    async fn init_upload(
        &self,
        token: &str,
        caption: &str,
        video_size: u64,
    ) -> Result<InitData, SocialError> {
        let response = self
            .client
            .post(format!("{}/v2/post/publish/video/init/", self.api_base))
            .bearer_auth(token)
            .json(&self.init_payload(caption, video_size))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("TikTok upload init failed", response).await);
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SocialError::platform("Unreadable init response", &e.to_string()))?;
        let envelope: InitEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| SocialError::platform(e.to_string(), &raw.to_string()))?;

        envelope
            .data
            .ok_or_else(|| SocialError::platform("TikTok init without upload URL", &raw.to_string()))
    }

    async fn upload(&self, upload_url: &str, bytes: Vec<u8>) -> Result<(), SocialError> {
        let size = bytes.len() as u64;
        let response = self
            .client
            .put(upload_url)
            .header("Content-Type", "video/mp4")
            .header("Content-Length", size.to_string())
            .header("Content-Range", content_range(size))
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("upload_failed", response).await);
        }
        Ok(())
    }

    async fn fetch_status(&self, token: &str, publish_id: &str) -> Result<serde_json::Value, StatusPoll> {
        let response = self
            .client
            .post(format!("{}/v2/post/publish/status/fetch/", self.api_base))
            .bearer_auth(token)
            .json(&serde_json::json!({ "publish_id": publish_id }))
            .send()
            .await
            .map_err(|e| StatusPoll::Failed(e.into()))?;

        if !response.status().is_success() {
            return Err(StatusPoll::Failed(
                platform_failure("TikTok status fetch failed", response).await,
            ));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| StatusPoll::Failed(SocialError::platform("Unreadable status", &e.to_string())))?;

        match raw["data"]["status"].as_str().unwrap_or_default() {
            "PUBLISH_COMPLETE" | "PUBLISHED" | "SEND_TO_USER_INBOX" => Ok(raw),
            "FAILED" => {
                let reason = raw["data"]["fail_reason"].as_str().unwrap_or("unknown").to_string();
                Err(StatusPoll::Failed(SocialError::platform(
                    format!("TikTok publish failed: {}", reason),
                    &raw.to_string(),
                )))
            }
            _ => Err(StatusPoll::Pending(raw)),
        }
    }

    fn share_url(&self, status: &serde_json::Value) -> Option<String> {
        let username = self.username.as_deref()?;
        let post_id = public_post_id(status)?;
        Some(format!("https://www.tiktok.com/@{}/video/{}", username, post_id))
    }
}

fn content_range(size: u64) -> String {
    format!("bytes 0-{}/{}", size.saturating_sub(1), size)
}

/// First id in TikTok's (misspelled) public post id list.
fn public_post_id(status: &serde_json::Value) -> Option<String> {
    let id = status["data"]["publicaly_available_post_id"].as_array()?.first()?;
    id.as_str()
        .map(str::to_string)
        .or_else(|| id.as_u64().map(|n| n.to_string()))
}

#[async_trait]
impl NetworkConnector for TikTokConnector {
    fn network(&self) -> Network {
        Network::TikTok
    }

    async fn publish(
        &self,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError> {
        let token = require(&self.access_token, "TIKTOK_ACCESS_TOKEN")?;
        let video = media
            .and_then(MediaAsset::as_video)
            .ok_or_else(|| SocialError::MissingMedia("TikTok requires a video".to_string()))?;

        let bytes = tokio::fs::read(video.local_path()).await.map_err(|e| {
            SocialError::MissingMedia(format!(
                "video file not found at {}: {}",
                video.local_path().display(),
                e
            ))
        })?;

        let init = self.init_upload(token, &content.caption, bytes.len() as u64).await?;
        info!("[TIKTOK] Upload initialised (publish_id={})", init.publish_id);
        self.upload(&init.upload_url, bytes).await?;

        let polled = (|| self.fetch_status(token, &init.publish_id))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.poll_attempts),
            )
            .when(|e| matches!(e, StatusPoll::Pending(_)))
            .notify(|_, dur: Duration| {
                debug!("[TIKTOK] Still processing, checking again in {:.1}s", dur.as_secs_f64());
            })
            .await;

        match polled {
            Ok(status) => Ok(PublishReceipt {
                link: self.share_url(&status),
                post_id: public_post_id(&status).or(Some(init.publish_id)),
                raw_response: status,
            }),
            Err(StatusPoll::Pending(last)) => {
                warn!(
                    "[TIKTOK] {} still processing after polling budget",
                    init.publish_id
                );
                Ok(PublishReceipt {
                    post_id: Some(init.publish_id),
                    link: None,
                    raw_response: serde_json::json!({ "status": "processing", "last_status": last }),
                })
            }
            Err(StatusPoll::Failed(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(username: Option<&str>) -> TikTokConnector {
        let settings = NetworkSettings {
            tiktok_username: username.map(str::to_string),
            ..Default::default()
        };
        TikTokConnector::new(&settings, &NetworkCredentials::default())
    }

    #[test]
    fn init_payload_is_single_chunk_upload() {
        let payload = connector(None).init_payload(&"x".repeat(400), 1_048_576);
        assert_eq!(payload["source_info"]["source"], "FILE_UPLOAD");
        assert_eq!(payload["source_info"]["video_size"], 1_048_576);
        assert_eq!(payload["source_info"]["chunk_size"], 1_048_576);
        assert_eq!(payload["source_info"]["total_chunk_count"], 1);
        assert_eq!(payload["post_info"]["privacy_level"], "SELF_ONLY");
        assert_eq!(payload["post_info"]["title"].as_str().unwrap().len(), 150);
    }

    #[test]
    fn content_range_covers_whole_file() {
        assert_eq!(content_range(1000), "bytes 0-999/1000");
    }

    #[test]
    fn share_url_needs_username_and_public_id() {
        let status = serde_json::json!({
            "data": { "status": "PUBLISH_COMPLETE", "publicaly_available_post_id": [7345678901234u64] }
        });
        assert_eq!(
            connector(Some("uagrm")).share_url(&status).as_deref(),
            Some("https://www.tiktok.com/@uagrm/video/7345678901234")
        );
        assert!(connector(None).share_url(&status).is_none());
        assert!(connector(Some("uagrm")).share_url(&serde_json::json!({})).is_none());
    }

    #[tokio::test]
    async fn missing_video_is_rejected() {
        let credentials = NetworkCredentials {
            tiktok_access_token: Some("tok".into()),
            ..Default::default()
        };
        let connector = TikTokConnector::new(&NetworkSettings::default(), &credentials);
        let content = PublishContent {
            caption: "hola".into(),
            hashtags: vec![],
        };
        let err = connector.publish(&content, None).await.unwrap_err();
        assert!(matches!(err, SocialError::MissingMedia(_)));
    }
}
