use filing_dialogue::{DialogueConfig, HttpEndpoints};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::info;

const ENV_CONFIG_PATH: &str = "FILING_CHAT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
const DEFAULT_FILINGS_DIR: &str = "filings";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// YAML configuration file structure; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub backend_url: Option<String>,
    pub extraction_url: Option<String>,
    pub analysis_url: Option<String>,
    pub feedback_url: Option<String>,
    pub filings_dir: Option<PathBuf>,
    pub notification_ttl_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
    pub session_idle_secs: Option<u64>,
    pub default_form_type: Option<String>,
}

impl ConfigFile {
    /// Missing file means defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub endpoints: HttpEndpoints,
    pub filings_dir: PathBuf,
    /// Sessions untouched for this long are evicted
    pub session_idle: Duration,
    pub dialogue: DialogueConfig,
}

impl ServiceConfig {
    /// Load configuration.
    ///
    /// Values are resolved from:
    /// 1. environment variables (`HOST`, `PORT`, `BACKEND_URL`, `EXTRACTION_URL`,
    ///    `ANALYSIS_URL`, `FEEDBACK_URL`, `FILINGS_DIR`, `NOTIFICATION_TTL_MS`,
    ///    `CALL_TIMEOUT_MS`, `SESSION_IDLE_SECS`)
    /// 2. the YAML file named by `FILING_CHAT_CONFIG` (default `config.yaml`)
    /// 3. built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let file = ConfigFile::load(Path::new(&path))?;
        info!(path = %path, "Loaded configuration");
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |key: &str, from_file: Option<String>| env(key).or(from_file);

        let port = match env("PORT") {
            Some(value) => parse(value, "PORT")?,
            None => file.port.unwrap_or(3000),
        };
        let ttl_ms = match env("NOTIFICATION_TTL_MS") {
            Some(value) => parse(value, "NOTIFICATION_TTL_MS")?,
            None => file.notification_ttl_ms.unwrap_or(3000),
        };
        let call_timeout_ms = match env("CALL_TIMEOUT_MS") {
            Some(value) => parse(value, "CALL_TIMEOUT_MS")?,
            None => file.call_timeout_ms.unwrap_or(120_000),
        };
        let session_idle_secs = match env("SESSION_IDLE_SECS") {
            Some(value) => parse(value, "SESSION_IDLE_SECS")?,
            None => file.session_idle_secs.unwrap_or(1800),
        };

        let backend = pick("BACKEND_URL", file.backend_url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let endpoints = HttpEndpoints {
            extraction_url: pick("EXTRACTION_URL", file.extraction_url)
                .unwrap_or_else(|| backend.clone()),
            analysis_url: pick("ANALYSIS_URL", file.analysis_url)
                .unwrap_or_else(|| backend.clone()),
            feedback_url: pick("FEEDBACK_URL", file.feedback_url).unwrap_or(backend),
        };

        let mut dialogue = DialogueConfig {
            notification_ttl: Duration::from_millis(ttl_ms),
            call_timeout: Duration::from_millis(call_timeout_ms),
            ..DialogueConfig::default()
        };
        if let Some(form_type) = file.default_form_type {
            dialogue.default_form_type = form_type;
        }

        Ok(Self {
            host: pick("HOST", file.host).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            endpoints,
            filings_dir: env("FILINGS_DIR")
                .map(PathBuf::from)
                .or(file.filings_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILINGS_DIR)),
            session_idle: Duration::from_secs(session_idle_secs),
            dialogue,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: std::str::FromStr>(value: String, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}
