//! Voice-over script preparation and speech synthesis.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::ffmpeg::MediaToolkit;
use super::{VideoError, VideoRequest, VideoResult};
use crate::services::llm::{LlmService, LlmTask};

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid url regex"));
static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[\p{L}\p{N}_]+").expect("valid hashtag regex"));
static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[\p{L}\p{N}_.]+").expect("valid mention regex"));
static EMOJI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\x{FE0F}\x{200D}\x{20E3}]").expect("valid emoji regex")
});
static SYMBOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[*_~|<>\[\]{}=+^\\/#@•►▶→←✓✔]+").expect("valid symbol regex")
});
static REPEATED_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([!?¡¿.,;:])[!?¡¿.,;:]+").expect("valid punctuation regex"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub fn default_acronyms() -> BTreeMap<String, String> {
    [
        ("UAGRM", "Universidad Autónoma Gabriel René Moreno"),
        (
            "FICCT",
            "Facultad de Ingeniería en Ciencias de la Computación y Telecomunicaciones",
        ),
        ("FCS", "Facultad de Ciencias de la Salud"),
        ("FCE", "Facultad de Ciencias Económicas"),
        ("FACICO", "Facultad de Ciencias Contables"),
        ("FIA", "Facultad de Ingeniería Agrícola"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub api_base: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
    /// Tempo applied to the synthesized audio
    pub speed_factor: f64,
    /// Uppercase acronym -> spoken form
    pub acronyms: BTreeMap<String, String>,
    pub max_script_chars: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io".to_string(),
            voice_id: "onwK4e9ZLuTAKqWW03F9".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            timeout_secs: 60,
            speed_factor: 1.5,
            acronyms: default_acronyms(),
            max_script_chars: 900,
        }
    }
}

/// Rewrites `text` into something a TTS voice can read: URLs, mentions,
/// hashtags, emoji and symbol runs are removed, acronyms are spelled out and
/// whitespace is collapsed.
pub fn spoken_rewrite(text: &str, acronyms: &BTreeMap<String, String>) -> String {
    let mut out = URL_RE.replace_all(text, " ").into_owned();
    out = MENTION_RE.replace_all(&out, " ").into_owned();
    out = HASHTAG_RE.replace_all(&out, " ").into_owned();
    out = EMOJI_RE.replace_all(&out, " ").into_owned();

    for (acronym, spoken) in acronyms {
        let pattern = format!(r"\b{}\b", regex::escape(acronym));
        match Regex::new(&pattern) {
            Ok(re) => out = re.replace_all(&out, spoken.as_str()).into_owned(),
            Err(e) => warn!("[NARRATION] Skipping acronym '{}': {}", acronym, e),
        }
    }

    out = SYMBOL_RE.replace_all(&out, " ").into_owned();
    out = REPEATED_PUNCT_RE.replace_all(&out, "$1").into_owned();
    WHITESPACE_RE.replace_all(&out, " ").trim().to_string()
}

/// Cuts at the last word boundary within `max_chars` characters.
fn clamp_script(script: String, max_chars: usize) -> String {
    if script.chars().count() <= max_chars {
        return script;
    }
    let cut: String = script.chars().take(max_chars).collect();
    if script.chars().nth(max_chars).is_some_and(char::is_whitespace) {
        return cut;
    }
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}

fn narration_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["narration", "script", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    };
    text.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Chooses the voice-over text for a video.
pub struct NarrationWriter {
    llm: LlmService,
    acronyms: BTreeMap<String, String>,
    max_chars: usize,
}

impl NarrationWriter {
    pub fn new(llm: LlmService, config: &NarrationConfig) -> Self {
        Self {
            llm,
            acronyms: config.acronyms.clone(),
            max_chars: config.max_script_chars,
        }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Rewrite this announcement as a voice-over of at most 60 words, in its own \
             language. No hashtags, links, emoji or lists; spell out abbreviations.\n\
             Respond as {{\"narration\": \"...\"}}.\n\nAnnouncement:\n{}",
            text
        )
    }

    /// Explicit script first, then the model's rewrite, then the cleaned
    /// adapted text. The result is always cleaned.
    pub async fn script(&self, request: &VideoRequest) -> VideoResult<String> {
        let explicit = request
            .narration_script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let raw = match explicit {
            Some(script) => script.to_string(),
            None => match self
                .llm
                .request_json(LlmTask::Narrate, &Self::prompt(&request.adapted_text))
                .await
            {
                Ok(value) => narration_value(&value).unwrap_or_else(|| {
                    warn!("[NARRATION] Empty model narration; cleaning adapted text");
                    request.adapted_text.clone()
                }),
                Err(e) => {
                    warn!("[NARRATION] Narrate task failed ({}); cleaning adapted text", e);
                    request.adapted_text.clone()
                }
            },
        };

        let script = clamp_script(spoken_rewrite(&raw, &self.acronyms), self.max_chars);
        if script.is_empty() {
            return Err(VideoError::Speech("nothing left to narrate".to_string()));
        }
        Ok(script)
    }
}

/// Text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Writes encoded audio for `text` to `dest`.
    async fn synthesize(&self, text: &str, dest: &Path) -> VideoResult<()>;
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct SpeechPayload<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub struct ElevenLabsSynthesizer {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    voice_id: String,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &NarrationConfig, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        }
    }

    pub fn from_env(config: &NarrationConfig) -> Self {
        Self::new(config, std::env::var("ELEVENLABS_API_KEY").ok())
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, dest: &Path) -> VideoResult<()> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| VideoError::Speech("ELEVENLABS_API_KEY not configured".to_string()))?;

        let payload = SpeechPayload {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        debug!("[NARRATION] Synthesizing {} chars with voice {}", text.len(), self.voice_id);

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.api_base, self.voice_id))
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&payload)
            .send()
            .await
            .map_err(|e| VideoError::Speech(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VideoError::Speech(format!("TTS returned {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VideoError::Speech(e.to_string()))?;
        if bytes.is_empty() {
            return Err(VideoError::Speech("TTS returned no audio".to_string()));
        }

        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

/// Speed-adjusted narration track ready for muxing.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationAudio {
    pub local_path: PathBuf,
    pub duration_seconds: f64,
}

/// Synthesizes `script` into `work_dir`, applies the tempo factor and probes
/// the result.
pub async fn render_narration(
    speech: &dyn SpeechSynthesizer,
    toolkit: &dyn MediaToolkit,
    script: &str,
    work_dir: &Path,
    speed_factor: f64,
) -> VideoResult<NarrationAudio> {
    let raw = work_dir.join("narration_raw.mp3");
    speech.synthesize(script, &raw).await?;

    let local_path = if (speed_factor - 1.0).abs() > f64::EPSILON {
        let sped = work_dir.join("narration.mp3");
        toolkit.change_tempo(&raw, &sped, speed_factor).await?;
        sped
    } else {
        raw
    };

    let duration_seconds = toolkit.probe_duration(&local_path).await?;
    if duration_seconds <= 0.0 {
        return Err(VideoError::Speech("narration audio has no duration".to_string()));
    }

    info!("[NARRATION] {:.2}s of narration at x{}", duration_seconds, speed_factor);
    Ok(NarrationAudio {
        local_path,
        duration_seconds,
    })
}
