//! Configuration management for the CLI
//!
//! Values are layered: built-in defaults, then the optional
//! `~/.config/k8smed/config.json`, then `K8SMED_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "K8SMED";

/// CLI configuration
///
/// Keys are read in snake_case (`ai_provider`, `K8SMED_AI_PROVIDER`) and
/// printed in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct Config {
    /// Text-generation provider: `openai` or `localai`
    pub ai_provider: String,
    /// Model name sent with every completion request
    pub ai_model: String,
    /// Custom endpoint, required for `localai`
    pub ai_endpoint: Option<String>,
    /// Kubeconfig path used when `--kubeconfig` is not given
    pub kubeconfig: Option<String>,
    /// Anonymize `analyze` queries even without `--anonymize`
    #[serde(rename(serialize = "anonymizeByDefault"))]
    pub anonymize_default: bool,
    /// Output format used when `--format` is not given
    pub output_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai_provider: "openai".to_string(),
            ai_model: "gpt-3.5-turbo".to_string(),
            ai_endpoint: None,
            kubeconfig: None,
            anonymize_default: false,
            output_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and the process environment
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(Some(&path), config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an explicit file and environment source
    pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let settings = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("k8smed").join("config.json"))
    }
}
