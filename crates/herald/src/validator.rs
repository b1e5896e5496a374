//! Academic relevance gate run once per distribution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use services::services::llm::{LlmService, LlmTask};
use tracing::{info, warn};
use ts_rs::TS;

use crate::content::ContentItem;

pub const UNAVAILABLE_REASON: &str = "validation unavailable, defaulting to allow";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub is_eligible: bool,
    pub reason: String,
    /// The classifier could not answer and the verdict came from policy
    pub fail_open: bool,
}

pub struct ContentValidator {
    llm: LlmService,
    institution: String,
    fail_open: bool,
}

impl ContentValidator {
    pub fn new(llm: LlmService, institution: impl Into<String>, fail_open: bool) -> Self {
        Self {
            llm,
            institution: institution.into(),
            fail_open,
        }
    }

    fn prompt(&self, content: &ContentItem) -> String {
        format!(
            "Decide whether this text is suitable for the official social media accounts of \
             {institution}. Anything about the institution, its faculties, students, staff, \
             academic calendar, events or community is eligible, including sensitive or \
             critical topics that concern it. Unrelated commercial, political or personal \
             content is not.\n\
             Respond as {{\"is_eligible\": true|false, \"reason\": \"short explanation\"}}.\n\n\
             Text:\n{text}",
            institution = self.institution,
            text = content.raw_text()
        )
    }

    /// Classifies `content`. A classifier failure yields the policy verdict
    /// instead of an error.
    pub async fn validate(&self, content: &ContentItem) -> ValidationVerdict {
        let outcome = self
            .llm
            .request_object(LlmTask::Validate, &self.prompt(content))
            .await
            .map_err(|e| e.to_string())
            .and_then(|obj| parse_verdict(&obj).ok_or_else(|| "missing is_eligible".to_string()));

        match outcome {
            Ok((is_eligible, reason)) => {
                info!("[VALIDATOR] eligible={} reason={}", is_eligible, reason);
                ValidationVerdict {
                    is_eligible,
                    reason,
                    fail_open: false,
                }
            }
            Err(e) if self.fail_open => {
                warn!("[VALIDATOR] Classifier failed ({}); allowing content", e);
                ValidationVerdict {
                    is_eligible: true,
                    reason: UNAVAILABLE_REASON.to_string(),
                    fail_open: true,
                }
            }
            Err(e) => {
                warn!("[VALIDATOR] Classifier failed ({}); rejecting content", e);
                ValidationVerdict {
                    is_eligible: false,
                    reason: UNAVAILABLE_REASON.to_string(),
                    fail_open: false,
                }
            }
        }
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Reads `is_eligible`/`reason`, or the legacy `es_academico`/`razon` pair.
fn parse_verdict(obj: &Map<String, Value>) -> Option<(bool, String)> {
    let is_eligible = obj
        .get("is_eligible")
        .or_else(|| obj.get("es_academico"))
        .and_then(as_flag)?;
    let reason = obj
        .get("reason")
        .or_else(|| obj.get("razon"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    Some((is_eligible, reason))
}
