use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{HeraldError, Result};

const TITLE_CHARS: usize = 50;

/// The announcement distributed by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    raw_text: String,
}

impl ContentItem {
    /// Fails on blank text.
    pub fn new(raw_text: impl Into<String>) -> Result<Self> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(HeraldError::EmptyContent);
        }
        Ok(Self { raw_text })
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// First 50 characters, used as the headline in prompts.
    pub fn title(&self) -> String {
        self.raw_text.trim().chars().take(TITLE_CHARS).collect()
    }

    /// First `n` characters, used in image prompts.
    pub fn excerpt(&self, n: usize) -> String {
        self.raw_text.chars().take(n).collect()
    }
}
