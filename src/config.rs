// SPDX-License-Identifier: MIT

//! YAML configuration with environment overrides
//!
//! Configuration is read from a YAML file (`config.yaml` by default, or the
//! path given with `--config`); a missing default file means defaults. A few
//! values can be overridden from the environment so deployments never have
//! to edit the file: `LOG_LEVEL` and `OPENAI_BASE_URL`. The OpenAI API key
//! is read from the environment only, never from the file.

use crate::error::MixragError;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub workflow: WorkflowConfig,
    pub app: AppSection,
}

/// Model names and sampling settings for the OpenAI-compatible endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model used for routing decisions and answer generation
    pub response_model: String,
    /// Model used for binary relevance grading; defaults to `response_model`
    pub grading_model: Option<String>,
    /// Model used for query rewriting; defaults to `response_model`
    pub rewrite_model: Option<String>,
    pub temperature: f32,
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            response_model: "gpt-4o-mini".to_string(),
            grading_model: None,
            rewrite_model: None,
            temperature: 0.0,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn grading_model(&self) -> &str {
        self.grading_model.as_deref().unwrap_or(&self.response_model)
    }

    pub fn rewrite_model(&self) -> &str {
        self.rewrite_model.as_deref().unwrap_or(&self.response_model)
    }
}

/// Where the external retrieval service lives and how many chunks to ask for
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub endpoint: String,
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8500/retrieve".to_string(),
            top_k: 5,
        }
    }
}

/// Bounds for the adaptive workflow
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum rewrite cycles per run
    pub max_rewrites: u32,
    /// Per-capability-call timeout in seconds
    pub capability_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_rewrites: 2,
            capability_timeout_secs: 30,
        }
    }
}

impl WorkflowConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist; the default path is optional and falls
    /// back to built-in defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self, MixragError> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|e| {
                    MixragError::config(format!("cannot read config file {}: {}", p.display(), e))
                })?;
                Self::parse_yaml(&raw)?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    log::info!("loading configuration from {}", DEFAULT_CONFIG_PATH);
                    Self::parse_yaml(&fs::read_to_string(default)?)?
                } else {
                    AppConfig::default()
                }
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML configuration document
    pub fn parse_yaml(raw: &str) -> Result<Self, MixragError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.app.log_level = level;
        }
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            self.model.base_url = base_url;
        }
    }

    fn validate(&self) -> Result<(), MixragError> {
        url::Url::parse(&self.retrieval.endpoint).map_err(|e| {
            MixragError::config(format!(
                "invalid retrieval endpoint '{}': {}",
                self.retrieval.endpoint, e
            ))
        })?;
        if self.retrieval.top_k == 0 {
            return Err(MixragError::config("retrieval.top_k must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.model.response_model, "gpt-4o-mini");
        assert_eq!(config.model.grading_model(), "gpt-4o-mini");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.workflow.max_rewrites, 2);
        assert_eq!(config.workflow.capability_timeout(), Duration::from_secs(30));
        assert_eq!(config.app.log_level, "info");
    }

    #[test]
    fn test_parse_yaml_partial_sections() {
        let yaml = r#"
model:
  response_model: gpt-4o
  grading_model: gpt-4o-mini
  temperature: 0.2

workflow:
  max_rewrites: 3
"#;

        let config = AppConfig::parse_yaml(yaml).expect("Failed to parse YAML");

        assert_eq!(config.model.response_model, "gpt-4o");
        assert_eq!(config.model.grading_model(), "gpt-4o-mini");
        assert_eq!(config.model.rewrite_model(), "gpt-4o");
        assert_eq!(config.workflow.max_rewrites, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.workflow.capability_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_yaml_returns_error() {
        let yaml = r#"
retrieval:
  top_k:
    - not a number
"#;

        assert!(AppConfig::parse_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = AppConfig::default();
        config.retrieval.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_env_override() {
        env::set_var("LOG_LEVEL", "debug");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        env::remove_var("LOG_LEVEL");

        assert_eq!(config.app.log_level, "debug");
    }
}
