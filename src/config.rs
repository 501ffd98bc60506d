use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::auth::{DEFAULT_REDIRECT_URI, DEFAULT_TOKEN_URL};
use crate::error::AdlensError;
use crate::fallback::CandidateList;
use crate::providers::groq;
use crate::report::adsense::DEFAULT_API_BASE_URL;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB

pub const DEFAULT_MODELS: [&str; 3] = [
    "openai/gpt-oss-120b",
    "openai/gpt-oss-20b",
    "openai/gpt-oss-safeguard-20b",
];

// --- TOML deserialization structs (map 1:1 to the file) ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub llm: LlmConfig,
    pub adsense: AdsenseConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Fallback order: first entry is tried first.
    pub models: Vec<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdsenseConfig {
    pub api_base_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub max_analysis_rows: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub path: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: groq::DEFAULT_BASE_URL.to_owned(),
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_owned()).collect(),
            temperature: 0.5,
            timeout_secs: 60,
        }
    }
}

impl Default for AdsenseConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            token_url: DEFAULT_TOKEN_URL.to_owned(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_owned(),
            max_analysis_rows: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".adlens/session.json"),
        }
    }
}

impl FromStr for Config {
    type Err = AdlensError;

    /// Parse and validate a config from a TOML string. Missing keys take
    /// their defaults.
    fn from_str(content: &str) -> Result<Self, AdlensError> {
        let config: Config = toml::from_str(content).map_err(|e| AdlensError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, AdlensError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| AdlensError::Config(format!("cannot read {}: {e}", path.display())))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(AdlensError::Config(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AdlensError::Config(format!("cannot read {}: {e}", path.display())))?;

        content.parse()
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, AdlensError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn candidates(&self) -> CandidateList {
        CandidateList::new(self.llm.models.iter().cloned())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    // An empty model list is accepted here; the requester reports it when a
    // completion is attempted.
    fn validate(&self) -> Result<(), AdlensError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AdlensError::Config(format!(
                "llm.temperature must be within 0..=2, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(AdlensError::Config("llm.timeout_secs must be positive".to_owned()));
        }
        if let Some(blank) = self.llm.models.iter().position(|m| m.trim().is_empty()) {
            return Err(AdlensError::Config(format!("llm.models[{blank}] is blank")));
        }
        if self.adsense.max_analysis_rows == 0 {
            return Err(AdlensError::Config(
                "adsense.max_analysis_rows must be positive".to_owned(),
            ));
        }
        for (key, value) in [
            ("llm.base_url", &self.llm.base_url),
            ("adsense.api_base_url", &self.adsense.api_base_url),
            ("adsense.token_url", &self.adsense.token_url),
        ] {
            url::Url::parse(value).map_err(|e| AdlensError::Config(format!("{key}: {e}")))?;
        }
        Ok(())
    }
}

/// Secrets read from the environment (after `.env` is loaded).
pub struct Credentials {
    pub groq_api_key: Option<SecretString>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<SecretString>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            groq_api_key: var("GROQ_API_KEY").map(SecretString::from),
            google_client_id: var("GOOGLE_CLIENT_ID"),
            google_client_secret: var("GOOGLE_CLIENT_SECRET").map(SecretString::from),
        }
    }
}

/// Missing secret, reported with the variable to set.
pub fn require<T>(value: Option<T>, name: &str) -> Result<T, AdlensError> {
    value.ok_or_else(|| AdlensError::Config(format!("{name} is not set")))
}
