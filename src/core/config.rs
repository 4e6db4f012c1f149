//! Configuration management
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables, so a bare deployment only needs API keys exported.

use crate::core::error::{Error, Result};
use crate::limit::RatePolicy;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "MEDQUERY_CONFIG";

/// Default listen port (matches the hosting platform's convention)
pub const DEFAULT_PORT: u16 = 8000;

/// Longest upstream timeout accepted for any provider call
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub query: QueryConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Use the first X-Forwarded-For entry as the client address
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub instant_answer: RatePolicy,
    pub generate_image: RatePolicy,
    /// How often idle client windows are dropped (seconds)
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Minimum question length in characters
    pub min_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub perplexity: PerplexityConfig,
    pub google: GoogleConfig,
}

/// Chat completion and image generation provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub image_model: String,
    pub image_size: String,
    pub image_timeout_secs: u64,
}

/// Research-search provider (OpenAI-compatible chat API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerplexityConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

/// Web-search provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub api_key: Option<String>,
    /// Programmable search engine id (`cx`)
    pub cse_id: Option<String>,
    pub base_url: String,
    /// Results requested per query
    pub results: u32,
    /// Snippets kept from the top of the result list
    pub snippets: usize,
    /// Maximum characters of joined snippet text
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            trust_forwarded_for: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            instant_answer: RatePolicy::new(30, 60),
            generate_image: RatePolicy::new(10, 60),
            sweep_interval_secs: 300,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { min_length: 3 }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4".to_string(),
            system_prompt: "You are an expert medical research assistant.".to_string(),
            max_tokens: 800,
            temperature: 0.3,
            timeout_secs: 8,
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            image_timeout_secs: 30,
        }
    }
}

impl Default for PerplexityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.perplexity.ai".to_string(),
            model: "llama-3.1-sonar-large-128k-online".to_string(),
            system_prompt: "You are a medical research expert.".to_string(),
            max_tokens: 600,
            temperature: 0.2,
            top_p: 0.9,
            timeout_secs: 8,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cse_id: None,
            base_url: "https://www.googleapis.com".to_string(),
            results: 3,
            snippets: 2,
            max_chars: 400,
            timeout_secs: 5,
        }
    }
}

/// Treat blank credentials the same as missing ones
fn credential(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl OpenAiConfig {
    pub fn api_key(&self) -> Option<&str> {
        credential(&self.api_key)
    }
}

impl PerplexityConfig {
    pub fn api_key(&self) -> Option<&str> {
        credential(&self.api_key)
    }
}

impl GoogleConfig {
    /// Both the API key and the engine id, or nothing
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((credential(&self.api_key)?, credential(&self.cse_id)?))
    }
}

impl Config {
    /// Load configuration from file (if any) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_path(path)? {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "medquery", "medquery")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        match requested {
            Some(path) if path.exists() => Ok(Some(path)),
            Some(path) => Err(Error::ConfigNotFound { path }),
            None => Ok(Self::default_path().filter(|p| p.exists())),
        }
    }

    /// Override settings from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(port) = var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid PORT value: {}", port),
            }
        }
        if let Some(host) = var("MEDQUERY_HOST") {
            self.server.host = host;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.providers.openai.api_key = Some(key);
        }
        if let Some(key) = var("PERPLEXITY_API_KEY") {
            self.providers.perplexity.api_key = Some(key);
        }
        if let Some(key) = var("GOOGLE_API_KEY") {
            self.providers.google.api_key = Some(key);
        }
        if let Some(cx) = var("GOOGLE_CSE_ID") {
            self.providers.google.cse_id = Some(cx);
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        for (route, policy) in [
            ("instant_answer", &self.limits.instant_answer),
            ("generate_image", &self.limits.generate_image),
        ] {
            if policy.max_calls == 0 || policy.period_secs == 0 {
                return Err(Error::ConfigError {
                    message: format!("limits.{} needs max_calls and period_secs above 0", route),
                });
            }
        }
        let providers = &self.providers;
        for (name, secs) in [
            ("openai.timeout_secs", providers.openai.timeout_secs),
            ("openai.image_timeout_secs", providers.openai.image_timeout_secs),
            ("perplexity.timeout_secs", providers.perplexity.timeout_secs),
            ("google.timeout_secs", providers.google.timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(Error::ConfigError {
                    message: format!(
                        "providers.{} must be between 1 and {} seconds (got {})",
                        name, MAX_TIMEOUT_SECS, secs
                    ),
                });
            }
        }
        if self.query.min_length == 0 {
            return Err(Error::ConfigError {
                message: "query.min_length must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.limits.instant_answer, RatePolicy::new(30, 60));
        assert_eq!(config.query.min_length, 3);
        assert_eq!(config.providers.google.max_chars, 400);
        assert!(config.providers.openai.api_key().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("PORT", "9100"),
            ("OPENAI_API_KEY", "sk-test"),
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_CSE_ID", "engine"),
        ]));

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.providers.openai.api_key(), Some("sk-test"));
        assert_eq!(config.providers.google.credentials(), Some(("g-key", "engine")));
        assert!(config.providers.perplexity.api_key().is_none());
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(lookup(&[("PORT", "not-a-port"), ("OPENAI_API_KEY", "  ")]));

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.providers.openai.api_key().is_none());
    }

    #[test]
    fn test_google_needs_both_credentials() {
        let mut config = Config::default();
        config.providers.google.api_key = Some("g-key".to_string());
        assert!(config.providers.google.credentials().is_none());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[limits.instant_answer]
max_calls = 5
period_secs = 10

[providers.perplexity]
model = "sonar"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.limits.instant_answer, RatePolicy::new(5, 10));
        assert_eq!(config.limits.generate_image, RatePolicy::new(10, 60));
        assert_eq!(config.providers.perplexity.model, "sonar");
        assert_eq!(config.providers.perplexity.max_tokens, 600);
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/medquery.toml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.limits.generate_image = RatePolicy::new(0, 60);
        assert!(matches!(config.validate(), Err(Error::ConfigError { .. })));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut config = Config::default();
        config.providers.openai.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::ConfigError { .. })));

        let mut config = Config::default();
        config.providers.openai.timeout_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(Error::ConfigError { .. })));

        let mut config = Config::default();
        config.providers.openai.image_timeout_secs = MAX_TIMEOUT_SECS + 1;
        assert!(matches!(config.validate(), Err(Error::ConfigError { .. })));

        let mut config = Config::default();
        config.providers.google.timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_huge_timeout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[providers.perplexity]\ntimeout_secs = 9223372036854775807").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::ConfigError { .. }));
    }
}
