//! Configuration loaded from `~/.herald/config.toml`.
//!
//! Every section has defaults, so a missing file or a partial file is fine.
//! Secrets stay in the environment (a `.env` file is honoured).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use services::services::imaging::ImagingConfig;
use services::services::llm::LlmConfig;
use services::services::social::NetworkSettings;
use services::services::video::VideoConfig;

use crate::{HeraldError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub institution: InstitutionConfig,
    pub llm: LlmConfig,
    pub validation: ValidationConfig,
    pub limits: LimitsConfig,
    pub media: MediaConfig,
    pub networks: NetworkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstitutionConfig {
    pub name: String,
    /// Extra spoken forms for narration, merged over the built-in table
    pub acronyms: BTreeMap<String, String>,
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            name: "UAGRM".to_string(),
            acronyms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Allow content when the classifier cannot answer
    pub fail_open: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { fail_open: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub adaptation_concurrency: usize,
    pub publish_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            adaptation_concurrency: 3,
            publish_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub imaging: ImagingConfig,
    pub video: VideoConfig,
}

impl HeraldConfig {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".herald")
            .join("config.toml")
    }

    /// Loads `path`, or the default location when `None`. A missing file
    /// gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        if !path.exists() {
            tracing::debug!("[CONFIG] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| HeraldError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
            .map_err(|e| HeraldError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HeraldError::Config(e.to_string()))
    }

    /// Reads `.env` into the process environment if present.
    pub fn load_env() {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!("[CONFIG] Loaded environment from {}", path.display());
        }
    }

    /// Video settings with the institution's acronyms merged in.
    pub fn video_config(&self) -> VideoConfig {
        let mut video = self.media.video.clone();
        video.narration.acronyms.extend(
            self.institution
                .acronyms
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        video
    }

    /// Connector settings with the publish timeout from `limits`.
    pub fn network_settings(&self) -> NetworkSettings {
        NetworkSettings {
            publish_timeout_secs: self.limits.publish_timeout_secs,
            ..self.networks.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = HeraldConfig::from_toml(
            r#"
            [institution]
            name = "Universidad Demo"

            [institution.acronyms]
            UD = "Universidad Demo"

            [limits]
            adaptation_concurrency = 5

            [media.video]
            duration_tolerance_secs = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.institution.name, "Universidad Demo");
        assert_eq!(config.limits.adaptation_concurrency, 5);
        assert_eq!(config.limits.publish_timeout_secs, 300);
        assert!(config.validation.fail_open);
        assert_eq!(config.media.video.duration_tolerance_secs, 0.25);
        assert_eq!(config.media.video.frame.height, 1920);
        assert_eq!(config.media.imaging.width, 800);

        let video = config.video_config();
        assert_eq!(video.narration.acronyms["UD"], "Universidad Demo");
        assert!(video.narration.acronyms.contains_key("UAGRM"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HeraldConfig::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.limits.adaptation_concurrency, 3);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "limits = [").unwrap();
        assert!(matches!(HeraldConfig::load(Some(&path)), Err(HeraldError::Config(_))));
    }

    #[test]
    fn publish_timeout_comes_from_limits() {
        let mut config = HeraldConfig::default();
        config.limits.publish_timeout_secs = 42;
        assert_eq!(config.network_settings().publish_timeout_secs, 42);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = HeraldConfig::default().to_toml().unwrap();
        let back = HeraldConfig::from_toml(&text).unwrap();
        assert_eq!(back.institution.name, "UAGRM");
    }
}
