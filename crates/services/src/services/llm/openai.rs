//! OpenAI-compatible chat-completions provider (OpenAI, Gemini, Ollama)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::provider_trait::{
    ChatMessage, ChatRequest, LLMProviderTrait, MessageRole, ProviderError, ProviderResponse,
    ProviderType, TokenUsage,
};

pub struct OpenAIProvider {
    client: Client,
    provider_type: ProviderType,
    api_key: Option<String>,
    endpoint: String,
}

impl OpenAIProvider {
    /// Create a provider reading its API key from the environment variable
    /// the provider type expects.
    pub fn from_env(provider_type: ProviderType, timeout: Duration) -> Self {
        let api_key = provider_type
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty());

        match (provider_type.api_key_env(), &api_key) {
            (Some(var), None) => {
                tracing::warn!("{} provider created without API key - {} not set", provider_type, var)
            }
            _ => tracing::info!("{} provider initialized", provider_type),
        }

        Self::new(provider_type, api_key, timeout)
    }

    pub fn new(provider_type: ProviderType, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            provider_type,
            api_key,
            endpoint: provider_type.default_endpoint().to_string(),
        }
    }

    /// Point at a custom endpoint (proxy, self-hosted gateway)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn message_to_openai(&self, msg: &ChatMessage) -> serde_json::Value {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        serde_json::json!({ "role": role, "content": msg.content })
    }

    fn build_payload(&self, request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| self.message_to_openai(m))
            .collect();

        let mut payload = serde_json::json!({
            "model": request.config.model,
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
            "messages": messages
        });

        if request.config.json_mode {
            payload["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        payload
    }

    fn parse_response(&self, json: &serde_json::Value) -> Result<ProviderResponse, ProviderError> {
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::ParseError("missing choices[0].message.content".into()))?
            .trim()
            .to_string();

        let usage = json.get("usage").and_then(|u| {
            Some(TokenUsage {
                input_tokens: u["prompt_tokens"].as_u64()? as u32,
                output_tokens: u["completion_tokens"].as_u64()? as u32,
                total_tokens: u["total_tokens"].as_u64()? as u32,
            })
        });

        Ok(ProviderResponse { content, usage })
    }
}

#[async_trait]
impl LLMProviderTrait for OpenAIProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn name(&self) -> &'static str {
        match self.provider_type {
            ProviderType::OpenAI => "OpenAI",
            ProviderType::Gemini => "Gemini",
            ProviderType::Ollama => "Ollama",
        }
    }

    fn is_configured(&self) -> bool {
        self.provider_type.api_key_env().is_none() || self.api_key.is_some()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ProviderResponse, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::AuthError(format!(
                "No {} API key configured",
                self.name()
            )));
        }

        let payload = self.build_payload(&request);

        tracing::debug!(
            "[{}] Sending request: model={}, messages={}",
            self.name(),
            request.config.model,
            request.messages.len()
        );

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        self.parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::provider_trait::ChatConfig;

    fn provider() -> OpenAIProvider {
        OpenAIProvider::new(ProviderType::OpenAI, Some("sk-test".into()), Duration::from_secs(5))
    }

    #[test]
    fn test_message_conversion() {
        let provider = provider();
        let json = provider.message_to_openai(&ChatMessage::user("Hola"));
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "Hola");

        let json = provider.message_to_openai(&ChatMessage::system("Solo JSON"));
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn json_mode_sets_response_format() {
        let provider = provider();
        let request = ChatRequest {
            messages: vec![ChatMessage::user("x")],
            config: ChatConfig::default(),
        };
        let payload = provider.build_payload(&request);
        assert_eq!(payload["response_format"]["type"], "json_object");

        let request = ChatRequest {
            config: ChatConfig {
                json_mode: false,
                ..ChatConfig::default()
            },
            ..request
        };
        assert!(provider.build_payload(&request).get("response_format").is_none());
    }

    #[test]
    fn parses_content_and_usage() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "  {\"ok\": true}\n" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let response = provider().parse_response(&body).unwrap();
        assert_eq!(response.text(), "{\"ok\": true}");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn missing_content_is_parse_error() {
        let body = serde_json::json!({ "choices": [] });
        assert!(matches!(
            provider().parse_response(&body),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[test]
    fn ollama_is_configured_without_key() {
        let provider = OpenAIProvider::new(ProviderType::Ollama, None, Duration::from_secs(5));
        assert!(provider.is_configured());
        let provider = OpenAIProvider::new(ProviderType::Gemini, None, Duration::from_secs(5));
        assert!(!provider.is_configured());
    }
}
