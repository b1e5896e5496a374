//! WhatsApp status connector (Whapi.Cloud stories endpoint)

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use super::{platform_failure, require};
use crate::services::media::MediaAsset;
use crate::services::social::{
    Network, NetworkConnector, NetworkCredentials, NetworkSettings, PublishContent,
    PublishReceipt, SocialError,
};

const TEXT_STORY_BACKGROUND: &str = "#1F2937";
const TEXT_STORY_CAPTION_COLOR: &str = "#FFFFFF";

pub struct WhatsAppConnector {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl WhatsAppConnector {
    pub fn new(settings: &NetworkSettings, credentials: &NetworkCredentials) -> Self {
        Self {
            client: settings.http_client(),
            base_url: settings.whapi_base.trim_end_matches('/').to_string(),
            token: credentials.whapi_token.clone(),
        }
    }
}

/// Image story when an image is available, coloured text story otherwise.
fn story_payload(caption: &str, media: Option<&MediaAsset>) -> serde_json::Value {
    match media.and_then(MediaAsset::as_image) {
        Some(image) => serde_json::json!({
            "media": image.url,
            "caption": caption,
        }),
        None => serde_json::json!({
            "background_color": TEXT_STORY_BACKGROUND,
            "caption": caption,
            "caption_color": TEXT_STORY_CAPTION_COLOR,
            "font_type": "SYSTEM",
        }),
    }
}

#[async_trait]
impl NetworkConnector for WhatsAppConnector {
    fn network(&self) -> Network {
        Network::WhatsApp
    }

    async fn publish(
        &self,
        content: &PublishContent,
        media: Option<&MediaAsset>,
    ) -> Result<PublishReceipt, SocialError> {
        let token = require(&self.token, "WHAPI_TOKEN")?;

        let response = self
            .client
            .post(format!("{}/stories", self.base_url))
            .bearer_auth(token)
            .json(&story_payload(&content.caption, media))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(platform_failure("WhatsApp story failed", response).await);
        }

        let body = response.text().await?;
        Ok(story_receipt(&body))
    }
}

/// Builds the receipt from a successful story response. An unreadable body
/// still counts as published and is kept verbatim.
fn story_receipt(body: &str) -> PublishReceipt {
    let raw = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("[WHATSAPP] Story accepted but response is not JSON: {}", e);
            serde_json::Value::String(body.to_string())
        }
    };
    let post_id = raw["id"]
        .as_str()
        .or_else(|| raw["message"]["id"].as_str())
        .map(str::to_string);

    PublishReceipt {
        post_id,
        link: None,
        raw_response: raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media::ImageAsset;

    #[test]
    fn story_receipt_reads_nested_id() {
        let receipt = story_receipt(r#"{"sent":true,"message":{"id":"story-42"}}"#);
        assert_eq!(receipt.post_id.as_deref(), Some("story-42"));
        assert!(receipt.link.is_none());
    }

    #[test]
    fn unreadable_story_response_is_kept_verbatim() {
        let receipt = story_receipt("<html>ok</html>");
        assert!(receipt.post_id.is_none());
        assert_eq!(receipt.raw_response, serde_json::json!("<html>ok</html>"));
    }

    #[test]
    fn text_story_uses_fixed_palette() {
        let payload = story_payload("Hola comunidad", None);
        assert_eq!(payload["background_color"], "#1F2937");
        assert_eq!(payload["caption_color"], "#FFFFFF");
        assert_eq!(payload["font_type"], "SYSTEM");
        assert!(payload.get("media").is_none());
    }

    #[test]
    fn image_story_embeds_media() {
        let media = MediaAsset::Image(ImageAsset {
            url: "data:image/jpeg;base64,AAAA".into(),
            is_inline_data: true,
            is_fallback: false,
        });
        let payload = story_payload("Hola", Some(&media));
        assert_eq!(payload["media"], "data:image/jpeg;base64,AAAA");
        assert_eq!(payload["caption"], "Hola");
    }
}
