use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::json::{expect_object, extract_json};
use super::provider_trait::{ChatConfig, ChatMessage, ChatRequest, LLMProviderTrait};
use super::{LlmConfig, LlmError, LlmTask};

/// Issues JSON-producing tasks against a chat provider with a hard timeout.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LLMProviderTrait>,
    chat_config: ChatConfig,
    timeout: Duration,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LLMProviderTrait>, config: &LlmConfig) -> Self {
        Self {
            provider,
            chat_config: config.chat_config(),
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn system_prompt(task: LlmTask) -> &'static str {
        match task {
            LlmTask::Validate => {
                "You classify announcements for a university communications office. \
                 Reply with a single JSON object and nothing else."
            }
            LlmTask::Adapt => {
                "You are a social media editor for a university. Rewrite content for the \
                 requested network in the language of the source. Reply with a single JSON \
                 object and nothing else."
            }
            LlmTask::ExtractKeywords => {
                "You pick English search phrases for stock video libraries. \
                 Reply with a single JSON object and nothing else."
            }
            LlmTask::Narrate => {
                "You write short voice-over scripts meant to be read aloud. \
                 Reply with a single JSON object and nothing else."
            }
        }
    }

    /// Raw text answer for `task`.
    pub async fn complete(&self, task: LlmTask, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(Self::system_prompt(task)),
                ChatMessage::user(prompt),
            ],
            config: self.chat_config.clone(),
        };

        debug!("[LLM] task={} provider={}", task, self.provider.name());

        let response = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| {
                warn!("[LLM] task={} timed out after {:?}", task, self.timeout);
                LlmError::Timeout(self.timeout)
            })??;

        Ok(response.content)
    }

    /// Parsed JSON answer for `task`, any shape.
    pub async fn request_json(&self, task: LlmTask, prompt: &str) -> Result<Value, LlmError> {
        let raw = self.complete(task, prompt).await?;
        extract_json(&raw)
    }

    /// Parsed JSON answer for `task` coerced to an object.
    pub async fn request_object(
        &self,
        task: LlmTask,
        prompt: &str,
    ) -> Result<Map<String, Value>, LlmError> {
        expect_object(self.request_json(task, prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::provider_trait::{
        ProviderError, ProviderResponse, ProviderType,
    };
    use async_trait::async_trait;

    struct Scripted(&'static str);

    #[async_trait]
    impl LLMProviderTrait for Scripted {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: self.0.to_string(),
                usage: None,
            })
        }
    }

    struct Stalled;

    #[async_trait]
    impl LLMProviderTrait for Stalled {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(ProviderError::RequestFailed("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn request_object_unwraps_fenced_list() {
        let service = LlmService::new(
            Arc::new(Scripted("```json\n[{\"text\": \"hola\"}]\n```")),
            &LlmConfig::default(),
        );
        let obj = service.request_object(LlmTask::Adapt, "x").await.unwrap();
        assert_eq!(obj["text"], "hola");
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let service = LlmService::new(Arc::new(Stalled), &LlmConfig::default())
            .with_timeout(Duration::from_millis(20));
        let err = service.request_json(LlmTask::Validate, "x").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
        assert!(err.is_unavailable());
    }
}
