//! Prompt-to-image synthesis with hosted or inline delivery.
//!
//! Image generation is best effort: whatever goes wrong, callers receive a
//! usable [`ImageAsset`], falling back to a static placeholder URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::media::ImageAsset;

const DEFAULT_GENERATOR_BASE: &str = "https://image.pollinations.ai/prompt";
const DEFAULT_HOST_ENDPOINT: &str = "https://api.imgur.com/3/upload";
const DEFAULT_FALLBACK_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/f/fc/University_Lecture_Hall.jpg/1200px-University_Lecture_Hall.jpg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image generation failed: {0}")]
    Generation(String),
    #[error("Image upload failed: {0}")]
    Upload(String),
    #[error("Image host not configured")]
    HostNotConfigured,
    #[error("HTTP request error: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        ImageError::Request(err.to_string())
    }
}

/// How the image reaches the network connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMode {
    /// Uploaded to the image host; the connector receives a public URL
    UrlHosted,
    /// Embedded as a `data:` URI
    InlineData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    pub generator_base: String,
    pub host_endpoint: String,
    pub fallback_url: String,
    pub width: u32,
    pub height: u32,
    pub prompt_max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            generator_base: DEFAULT_GENERATOR_BASE.to_string(),
            host_endpoint: DEFAULT_HOST_ENDPOINT.to_string(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            width: 800,
            height: 800,
            prompt_max_chars: 300,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl GeneratedImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError>;
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload and return the public URL.
    async fn upload(&self, image: &GeneratedImage) -> Result<String, ImageError>;
}

/// Anything that turns a prompt into a deliverable image. Never fails.
#[async_trait]
pub trait ImageProducer: Send + Sync {
    async fn synthesize_image(&self, prompt: &str, mode: ImageMode) -> ImageAsset;
}

/// Pollinations-style generator: GET `{base}/{prompt}` returns image bytes.
pub struct PollinationsGenerator {
    client: Client,
    base_url: String,
    width: u32,
    height: u32,
}

impl PollinationsGenerator {
    pub fn new(config: &ImagingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.generator_base.trim_end_matches('/').to_string(),
            width: config.width,
            height: config.height,
        }
    }

    fn request_url(&self, prompt: &str) -> String {
        format!(
            "{}/{}?width={}&height={}&nologo=true",
            self.base_url,
            urlencoding::encode(prompt),
            self.width,
            self.height
        )
    }
}

#[async_trait]
impl ImageGenerator for PollinationsGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError> {
        let response = self.client.get(self.request_url(prompt)).send().await?;

        if !response.status().is_success() {
            return Err(ImageError::Generation(format!(
                "generator returned {}",
                response.status()
            )));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ImageError::Generation("empty image body".to_string()));
        }

        Ok(GeneratedImage { bytes, mime })
    }
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgurData>,
}

#[derive(Debug, Deserialize)]
struct ImgurData {
    link: Option<String>,
}

/// Imgur-style anonymous upload host (`Client-ID` auth).
pub struct ImgurHost {
    client: Client,
    endpoint: String,
    client_id: Option<String>,
}

impl ImgurHost {
    pub fn new(config: &ImagingConfig, client_id: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: config.host_endpoint.clone(),
            client_id: client_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn from_env(config: &ImagingConfig) -> Self {
        Self::new(config, std::env::var("IMGUR_CLIENT_ID").ok())
    }
}

#[async_trait]
impl ImageHost for ImgurHost {
    async fn upload(&self, image: &GeneratedImage) -> Result<String, ImageError> {
        let client_id = self.client_id.as_ref().ok_or(ImageError::HostNotConfigured)?;

        let part = reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name("image.jpg")
            .mime_str(&image.mime)
            .map_err(|e| ImageError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Client-ID {}", client_id))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: ImgurResponse = response
            .json()
            .await
            .map_err(|e| ImageError::Upload(format!("status {}: {}", status, e)))?;

        match body {
            ImgurResponse {
                success: true,
                data: Some(ImgurData { link: Some(link) }),
            } => Ok(link),
            _ => Err(ImageError::Upload(format!("host rejected upload ({})", status))),
        }
    }
}

/// Generates an image and delivers it in the requested mode.
pub struct ImageSynthesizer {
    generator: Arc<dyn ImageGenerator>,
    host: Arc<dyn ImageHost>,
    fallback_url: String,
    prompt_max_chars: usize,
}

impl ImageSynthesizer {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        host: Arc<dyn ImageHost>,
        config: &ImagingConfig,
    ) -> Self {
        Self {
            generator,
            host,
            fallback_url: config.fallback_url.clone(),
            prompt_max_chars: config.prompt_max_chars,
        }
    }

    pub fn from_config(config: &ImagingConfig) -> Self {
        Self::new(
            Arc::new(PollinationsGenerator::new(config)),
            Arc::new(ImgurHost::from_env(config)),
            config,
        )
    }

    fn fallback(&self) -> ImageAsset {
        ImageAsset {
            url: self.fallback_url.clone(),
            is_inline_data: false,
            is_fallback: true,
        }
    }

    async fn try_synthesize(&self, prompt: &str, mode: ImageMode) -> Result<ImageAsset, ImageError> {
        let prompt: String = prompt.trim().chars().take(self.prompt_max_chars).collect();
        if prompt.is_empty() {
            return Err(ImageError::Generation("empty prompt".to_string()));
        }

        let image = self.generator.generate(&prompt).await?;

        match mode {
            ImageMode::InlineData => Ok(ImageAsset {
                url: image.to_data_uri(),
                is_inline_data: true,
                is_fallback: false,
            }),
            ImageMode::UrlHosted => Ok(ImageAsset {
                url: self.host.upload(&image).await?,
                is_inline_data: false,
                is_fallback: false,
            }),
        }
    }
}

#[async_trait]
impl ImageProducer for ImageSynthesizer {
    async fn synthesize_image(&self, prompt: &str, mode: ImageMode) -> ImageAsset {
        match self.try_synthesize(prompt, mode).await {
            Ok(asset) => {
                info!("[IMAGE] Generated {:?} image", mode);
                asset
            }
            Err(e) => {
                warn!("[IMAGE] {}; using fallback image", e);
                self.fallback()
            }
        }
    }
}
