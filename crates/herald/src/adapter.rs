//! Per-network rewriting of the source announcement.
//!
//! Each [`Network`] has a fixed [`NetworkProfile`] (length ceiling, hashtag
//! band, tone). The model's answer is parsed into an [`Adaptation`]; any
//! malformed answer becomes an adaptation with `error` set rather than an
//! `Err`, so one network's bad answer never affects the others.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use services::services::llm::{LlmService, LlmTask};
use services::services::social::Network;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::content::ContentItem;

pub const UNSUPPORTED_NETWORK: &str = "unsupported network";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkProfile {
    pub max_chars: usize,
    pub min_hashtags: usize,
    pub max_hashtags: usize,
    pub tone: &'static str,
    pub guidance: &'static str,
}

impl NetworkProfile {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Facebook => NetworkProfile {
                max_chars: 63_206,
                min_hashtags: 2,
                max_hashtags: 3,
                tone: "professional but warm",
                guidance: "Clear and informative for students; moderate emoji.",
            },
            Network::Instagram => NetworkProfile {
                max_chars: 2_200,
                min_hashtags: 5,
                max_hashtags: 8,
                tone: "visual and energetic",
                guidance: "Most important line first; generous but tasteful emoji. \
                           Add \"suggested_image_prompt\" describing an illustrative image.",
            },
            Network::LinkedIn => NetworkProfile {
                max_chars: 3_000,
                min_hashtags: 3,
                max_hashtags: 5,
                tone: "professional and corporate",
                guidance: "Few, professional emoji. Add \"tone\" naming the register used.",
            },
            Network::WhatsApp => NetworkProfile {
                max_chars: 4_096,
                min_hashtags: 0,
                max_hashtags: 0,
                tone: "conversational",
                guidance: "Greeting, then the information, then a call to action, separated \
                           by line breaks. No hashtags. Add \"format\": \"conversational\".",
            },
            Network::TikTok => NetworkProfile {
                max_chars: 2_200,
                min_hashtags: 3,
                max_hashtags: 5,
                tone: "young, hook-first",
                guidance: "Add \"video_hook\" (the opening line of the video) and \
                           \"narration_script\" (a voice-over under 60 words, no hashtags).",
            },
        }
    }
}

/// Network-specific fields of a model answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "network", rename_all = "lowercase")]
pub enum NetworkFields {
    Facebook,
    Instagram {
        suggested_image_prompt: Option<String>,
    },
    LinkedIn { tone: Option<String> },
    WhatsApp { format: Option<String> },
    TikTok {
        video_hook: Option<String>,
        narration_script: Option<String>,
    },
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl NetworkFields {
    pub fn from_response(network: Network, obj: &Map<String, Value>) -> Self {
        match network {
            Network::Facebook => NetworkFields::Facebook,
            Network::Instagram => NetworkFields::Instagram {
                suggested_image_prompt: text_field(obj, "suggested_image_prompt"),
            },
            Network::LinkedIn => NetworkFields::LinkedIn {
                tone: text_field(obj, "tone"),
            },
            Network::WhatsApp => NetworkFields::WhatsApp {
                format: text_field(obj, "format"),
            },
            Network::TikTok => NetworkFields::TikTok {
                video_hook: text_field(obj, "video_hook"),
                narration_script: text_field(obj, "narration_script"),
            },
        }
    }
}

/// One network's rewrite of the source. `error` set means adaptation failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Adaptation {
    /// Network name as requested
    pub network: String,
    /// Parsed network; `None` only for unsupported names
    pub target: Option<Network>,
    pub text: String,
    pub hashtags: Vec<String>,
    pub image_prompt: Option<String>,
    pub narration_script: Option<String>,
    pub video_hook: Option<String>,
    pub tone: Option<String>,
    pub format: Option<String>,
    pub error: Option<String>,
}

impl Adaptation {
    pub fn failed(network: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            target: None,
            text: String::new(),
            hashtags: Vec::new(),
            image_prompt: None,
            narration_script: None,
            video_hook: None,
            tone: None,
            format: None,
            error: Some(error.into()),
        }
    }

    pub fn for_target(mut self, network: Network) -> Self {
        self.target = Some(network);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Adds `tag` when the adaptation carries fewer hashtags than the
    /// profile asks for. Returns how many are still missing.
    fn top_up_hashtags(&mut self, tag: Option<&str>, profile: &NetworkProfile) -> usize {
        if let Some(tag) = tag {
            let present = self.hashtags.iter().any(|t| t.eq_ignore_ascii_case(tag));
            if self.hashtags.len() < profile.min_hashtags && !present {
                self.hashtags.push(tag.to_string());
            }
        }
        profile.min_hashtags.saturating_sub(self.hashtags.len())
    }

    fn apply(&mut self, fields: NetworkFields) {
        match fields {
            NetworkFields::Facebook => {}
            NetworkFields::Instagram {
                suggested_image_prompt,
            } => self.image_prompt = suggested_image_prompt,
            NetworkFields::LinkedIn { tone } => self.tone = tone,
            NetworkFields::WhatsApp { format } => self.format = format,
            NetworkFields::TikTok {
                video_hook,
                narration_script,
            } => {
                self.video_hook = video_hook;
                self.narration_script = narration_script;
            }
        }
    }
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Single leading `#`, no inner whitespace, de-duplicated case-insensitively,
/// at most `max` entries.
pub fn normalize_hashtags(raw: &[Value], max: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for value in raw {
        let Some(tag) = value.as_str() else { continue };
        let body: String = tag
            .trim()
            .trim_start_matches('#')
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if body.is_empty() {
            continue;
        }
        let tag = format!("#{}", body);
        if tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            continue;
        }
        if tags.len() == max {
            break;
        }
        tags.push(tag);
    }
    tags
}

/// Validates a model answer for `network`.
pub fn parse_adaptation(network: Network, name: &str, obj: &Map<String, Value>) -> Adaptation {
    let profile = NetworkProfile::for_network(network);

    let Some(text) = text_field(obj, "text") else {
        return Adaptation::failed(name, "adaptation response has no text").for_target(network);
    };

    let hashtags = obj
        .get("hashtags")
        .and_then(Value::as_array)
        .map(|raw| normalize_hashtags(raw, profile.max_hashtags))
        .unwrap_or_default();

    let mut adaptation = Adaptation {
        network: name.to_string(),
        target: Some(network),
        text: truncate_chars(&text, profile.max_chars),
        hashtags,
        image_prompt: None,
        narration_script: None,
        video_hook: None,
        tone: None,
        format: None,
        error: None,
    };
    adaptation.apply(NetworkFields::from_response(network, obj));
    adaptation
}

/// `#` plus the alphanumeric characters of `name`, if any.
pub fn institution_hashtag(name: &str) -> Option<String> {
    let body: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
    (!body.is_empty()).then(|| format!("#{}", body))
}

pub struct NetworkAdapter {
    llm: LlmService,
    institution: String,
    institution_tag: Option<String>,
}

impl NetworkAdapter {
    pub fn new(llm: LlmService, institution: impl Into<String>) -> Self {
        let institution = institution.into();
        Self {
            llm,
            institution_tag: institution_hashtag(&institution),
            institution,
        }
    }

    fn prompt(&self, content: &ContentItem, network: Network) -> String {
        let profile = NetworkProfile::for_network(network);
        format!(
            "Target network: {network}\n\
             Institution: {institution}\n\
             Tone: {tone}. Up to {max_chars} characters. {min}-{max} hashtags.\n\
             {guidance}\n\
             Respond as {{\"text\": \"...\", \"hashtags\": [\"#...\"]}} plus any extra fields above.\n\n\
             Title: {title}\n\
             Content:\n{content}",
            network = network,
            institution = self.institution,
            tone = profile.tone,
            max_chars = profile.max_chars,
            min = profile.min_hashtags,
            max = profile.max_hashtags,
            guidance = profile.guidance,
            title = content.title(),
            content = content.raw_text(),
        )
    }

    /// Never fails; problems are reported through `Adaptation::error`.
    pub async fn adapt(&self, content: &ContentItem, network_name: &str) -> Adaptation {
        match Network::parse(network_name) {
            Some(network) => self.adapt_for(content, network_name, network).await,
            None => Adaptation::failed(network_name, UNSUPPORTED_NETWORK),
        }
    }

    /// Like [`adapt`](Self::adapt) for a name the caller already parsed.
    pub async fn adapt_for(
        &self,
        content: &ContentItem,
        network_name: &str,
        network: Network,
    ) -> Adaptation {
        debug!("[ADAPTER] Adapting for {}", network);
        let mut adaptation = match self
            .llm
            .request_object(LlmTask::Adapt, &self.prompt(content, network))
            .await
        {
            Ok(obj) => parse_adaptation(network, network_name, &obj),
            Err(e) => Adaptation::failed(network_name, format!("adaptation failed: {}", e))
                .for_target(network),
        };

        if let Some(error) = &adaptation.error {
            warn!("[ADAPTER] {} adaptation failed: {}", network, error);
            return adaptation;
        }

        let profile = NetworkProfile::for_network(network);
        let missing = adaptation.top_up_hashtags(self.institution_tag.as_deref(), &profile);
        if missing > 0 {
            warn!(
                "[ADAPTER] {} adaptation has {} hashtag(s), profile asks for {}-{}",
                network,
                adaptation.hashtags.len(),
                profile.min_hashtags,
                profile.max_hashtags
            );
        }
        adaptation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use services::services::llm::{
        ChatRequest, LLMProviderTrait, LlmConfig, ProviderError, ProviderResponse, ProviderType,
    };

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    struct Reply(&'static str);

    #[async_trait]
    impl LLMProviderTrait for Reply {
        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
        fn name(&self) -> &'static str {
            "reply"
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

    fn adapter(reply: &'static str) -> NetworkAdapter {
        NetworkAdapter::new(
            LlmService::new(Arc::new(Reply(reply)), &LlmConfig::default()),
            "UAGRM",
        )
    }

    #[test]
    fn hashtags_are_normalised_and_clipped() {
        let raw = vec![
            json!("UAGRM"),
            json!("##Universidad"),
            json!("#uagrm"),
            json!("  #Vida Universitaria "),
            json!(7),
            json!("#"),
            json!("#Extra"),
        ];
        assert_eq!(
            normalize_hashtags(&raw, 3),
            vec!["#UAGRM", "#Universidad", "#VidaUniversitaria"]
        );
    }

    #[test]
    fn whatsapp_keeps_no_hashtags() {
        let obj = object(json!({"text": "Hola 👋", "hashtags": ["#UAGRM"], "format": "conversational"}));
        let adaptation = parse_adaptation(Network::WhatsApp, "whatsapp", &obj);
        assert!(adaptation.is_ok());
        assert!(adaptation.hashtags.is_empty());
        assert_eq!(adaptation.format.as_deref(), Some("conversational"));
    }

    #[test]
    fn text_over_ceiling_is_truncated_on_chars() {
        let long = "é".repeat(2_500);
        let obj = object(json!({"text": long, "hashtags": []}));
        let adaptation = parse_adaptation(Network::Instagram, "instagram", &obj);
        assert_eq!(adaptation.text.chars().count(), 2_200);
    }

    #[test]
    fn missing_text_is_an_adaptation_error() {
        let obj = object(json!({"text": "   ", "hashtags": ["#a"]}));
        let adaptation = parse_adaptation(Network::Facebook, "facebook", &obj);
        assert!(!adaptation.is_ok());
    }

    #[test]
    fn tiktok_fields_are_kept() {
        let obj = object(json!({
            "text": "¿Sabías esto?",
            "hashtags": ["#a", "#b", "#c"],
            "video_hook": "¡Atención!",
            "narration_script": "Inscripciones abiertas"
        }));
        let adaptation = parse_adaptation(Network::TikTok, "TikTok", &obj);
        assert_eq!(adaptation.network, "TikTok");
        assert_eq!(adaptation.video_hook.as_deref(), Some("¡Atención!"));
        assert_eq!(adaptation.narration_script.as_deref(), Some("Inscripciones abiertas"));
    }

    #[test]
    fn network_fields_serialize_tagged() {
        let fields = NetworkFields::LinkedIn {
            tone: Some("professional".into()),
        };
        assert_eq!(
            serde_json::to_value(fields).unwrap(),
            json!({"network": "linkedin", "tone": "professional"})
        );
    }

    #[tokio::test]
    async fn unsupported_network_skips_the_model() {
        let adaptation = adapter("{}")
            .adapt(&ContentItem::new("x").unwrap(), "myspace")
            .await;
        assert_eq!(adaptation.error.as_deref(), Some(UNSUPPORTED_NETWORK));
        assert!(adaptation.target.is_none());
    }

    #[tokio::test]
    async fn short_hashtag_list_gets_the_institution_tag() {
        let adaptation = adapter(r##"{"text": "Becas 2025", "hashtags": ["#Becas"]}"##)
            .adapt(&ContentItem::new("Convocatoria de becas").unwrap(), "Facebook")
            .await;
        assert!(adaptation.is_ok());
        assert_eq!(adaptation.network, "Facebook");
        assert_eq!(adaptation.target, Some(Network::Facebook));
        assert_eq!(adaptation.hashtags, vec!["#Becas", "#UAGRM"]);
    }

    #[test]
    fn institution_hashtag_drops_spaces_and_symbols() {
        assert_eq!(
            institution_hashtag("Universidad Autónoma G.R.M.").as_deref(),
            Some("#UniversidadAutónomaGRM")
        );
        assert_eq!(institution_hashtag(" - "), None);
    }

    #[tokio::test]
    async fn non_json_answer_is_an_adaptation_error() {
        let adaptation = adapter("Sorry, I can't help with that")
            .adapt(&ContentItem::new("x").unwrap(), "facebook")
            .await;
        assert!(adaptation.error.unwrap().starts_with("adaptation failed"));
    }

    #[tokio::test]
    async fn instagram_prompt_is_extracted() {
        let adaptation = adapter(r##"```json
{"text": "Nuevo semestre", "hashtags": ["#UAGRM"], "suggested_image_prompt": "students on campus"}
```"##)
            .adapt(&ContentItem::new("Nuevo semestre").unwrap(), "instagram")
            .await;
        assert!(adaptation.is_ok());
        assert_eq!(adaptation.image_prompt.as_deref(), Some("students on campus"));
        assert_eq!(adaptation.hashtags, vec!["#UAGRM"]);
    }
}
