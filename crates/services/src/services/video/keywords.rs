//! Search-phrase extraction for stock footage.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::fallback::FallbackCatalog;
use crate::services::llm::{LlmService, LlmTask};

pub const MIN_PHRASES: usize = 3;
pub const MAX_PHRASES: usize = 5;
const MIN_WORDS: usize = 2;
const MAX_WORDS: usize = 5;
const TOPICAL_SUFFIX: &str = "university campus";

/// Ordered footage search phrases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordSet {
    phrases: Vec<String>,
    from_fallback: bool,
}

impl KeywordSet {
    pub fn new(phrases: Vec<String>, from_fallback: bool) -> Self {
        Self {
            phrases,
            from_fallback,
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// True when the catalog replaced the model's answer entirely.
    pub fn from_fallback(&self) -> bool {
        self.from_fallback
    }
}

/// Cleans one phrase: lowercase, letters/digits/spaces only, 2..=5 words.
pub fn normalize_phrase(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    words.truncate(MAX_WORDS);

    let mut phrase = words.join(" ");
    if words.len() < MIN_WORDS {
        phrase.push(' ');
        phrase.push_str(TOPICAL_SUFFIX);
    }
    Some(phrase)
}

/// Pulls the phrase list out of `{"keywords": [...]}` or a bare list.
fn phrase_values(value: &Value) -> Vec<String> {
    let list = match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("keywords")
            .or_else(|| map.get("phrases"))
            .and_then(Value::as_array),
        _ => None,
    };

    list.map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Validates model output and tops it up from `fallback` to 3..=5 phrases.
pub fn build_keyword_set(candidates: &[String], fallback: &[String]) -> KeywordSet {
    let mut phrases: Vec<String> = Vec::new();
    for phrase in candidates.iter().filter_map(|p| normalize_phrase(p)) {
        if !phrases.contains(&phrase) {
            phrases.push(phrase);
        }
    }
    phrases.truncate(MAX_PHRASES);

    if phrases.is_empty() {
        return KeywordSet::new(fallback.to_vec(), true);
    }

    for extra in fallback {
        if phrases.len() >= MIN_PHRASES {
            break;
        }
        if !phrases.contains(extra) {
            phrases.push(extra.clone());
        }
    }

    KeywordSet::new(phrases, false)
}

pub struct KeywordExtractor {
    llm: LlmService,
    catalog: Arc<FallbackCatalog>,
}

impl KeywordExtractor {
    pub fn new(llm: LlmService, catalog: Arc<FallbackCatalog>) -> Self {
        Self { llm, catalog }
    }

    fn prompt(adapted_text: &str) -> String {
        format!(
            "Give 3 to 5 English search phrases (2 to 5 words each) describing visual scenes \
             that would illustrate this announcement in a vertical stock video. \
             Prefer concrete, filmable subjects.\n\
             Respond as {{\"keywords\": [\"...\"]}}.\n\nAnnouncement:\n{}",
            adapted_text
        )
    }

    /// Never fails; falls back to the category table on any error.
    pub async fn extract(&self, adapted_text: &str, source_text: &str) -> KeywordSet {
        let fallback = self.catalog.phrases_for(source_text);

        match self
            .llm
            .request_json(LlmTask::ExtractKeywords, &Self::prompt(adapted_text))
            .await
        {
            Ok(value) => {
                let set = build_keyword_set(&phrase_values(&value), fallback);
                if set.from_fallback() {
                    warn!("[KEYWORDS] Model returned no usable phrases; using category fallback");
                } else {
                    info!("[KEYWORDS] Extracted {:?}", set.phrases());
                }
                set
            }
            Err(e) => {
                warn!("[KEYWORDS] Extraction failed ({}); using category fallback", e);
                KeywordSet::new(fallback.to_vec(), true)
            }
        }
    }
}
