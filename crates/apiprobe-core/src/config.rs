//! Project configuration for API test runs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::retry::RetryPolicy;

/// How the synthesizer treats non-required object properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionalFields {
    /// Per-property coin flip
    #[default]
    Random,
    /// Always include optional properties
    Always,
    /// Never include optional properties
    Never,
}

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenAPI document path (JSON or YAML)
    pub spec: PathBuf,

    /// Base URL of the server to test
    pub base_url: String,

    /// Worker count; 0 or negative picks the core count (max 10)
    pub concurrency: i64,

    /// Retries per request on 5xx / transient transport errors (0-10)
    pub max_retries: i64,

    /// First backoff delay in milliseconds (at least 100)
    pub initial_delay_ms: u64,

    /// Per-request client timeout in seconds
    pub timeout_secs: u64,

    /// Static HTTP headers sent with every request
    pub headers: HashMap<String, String>,

    /// Credentials attached to every request
    pub auth: AuthConfig,

    /// Seed for request synthesis; unset means a fresh seed per run
    pub seed: Option<u64>,

    pub optional_fields: OptionalFields,

    /// Attach a request/response trace to every result
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("openapi.yaml"),
            base_url: "http://localhost:8080".to_string(),
            concurrency: 0,
            max_retries: 3,
            initial_delay_ms: 100,
            timeout_secs: 10,
            headers: HashMap::new(),
            auth: AuthConfig::default(),
            seed: None,
            optional_fields: OptionalFields::default(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Load from default location (.apiprobe.toml)
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [".apiprobe.toml", ".apiprobe.json", "apiprobe.toml"];

        for name in candidates {
            let path = Path::new(name);
            if path.exists() {
                return Self::load(path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
        )
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# apiprobe configuration

# OpenAPI document (local file path, JSON or YAML)
spec = "openapi.yaml"

# Server to test
base_url = "http://localhost:8080"

# Worker threads (0 = number of cores, at most 10)
concurrency = 0

# Retries on 5xx and transient network errors (0-10), exponential backoff
max_retries = 3
initial_delay_ms = 100

# Per-request timeout
timeout_secs = 10

# Fixed seed for reproducible request bodies
# seed = 42

# Optional body properties: "random", "always" or "never"
optional_fields = "random"

# Static headers
[headers]
# X-Request-Source = "apiprobe"

# Credentials: type = "none" | "bearer" | "api_key" | "basic"
[auth]
type = "none"
# token = "your-token-here"
# api_key_location = "header"
# api_key_name = "X-API-Key"
# username = "user"
# password = "pass"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
}
