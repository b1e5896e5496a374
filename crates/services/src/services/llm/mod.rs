//! Language-model access: a chat-completions provider plus a JSON task
//! service used by validation, adaptation, keyword extraction and narration.

pub mod json;
pub mod openai;
pub mod provider_trait;
pub mod service;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

pub use openai::OpenAIProvider;
pub use provider_trait::{
    ChatConfig, ChatMessage, ChatRequest, LLMProviderTrait, ProviderError, ProviderResponse,
    ProviderType,
};
pub use service::LlmService;

/// What a request to the model is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    Validate,
    Adapt,
    ExtractKeywords,
    Narrate,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed LLM response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Transport-level failure rather than a bad answer.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout(_)
                | LlmError::Provider(ProviderError::RequestFailed(_))
                | LlmError::Provider(ProviderError::RateLimited)
        )
    }
}

/// LLM settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderType,
    /// Model name; empty means the provider default
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Override for the chat-completions URL
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            model: String::new(),
            temperature: 0.4,
            max_tokens: 2048,
            endpoint: None,
            timeout_secs: 45,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn chat_config(&self) -> ChatConfig {
        let model = if self.model.trim().is_empty() {
            self.provider.default_model().to_string()
        } else {
            self.model.clone()
        };
        ChatConfig {
            model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: true,
        }
    }

    /// Build the configured provider, reading credentials from the environment.
    pub fn build_provider(&self) -> OpenAIProvider {
        let provider = OpenAIProvider::from_env(self.provider, self.timeout());
        match &self.endpoint {
            Some(endpoint) => provider.with_endpoint(endpoint.clone()),
            None => provider,
        }
    }
}
