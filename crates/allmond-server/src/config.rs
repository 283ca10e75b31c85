//! Service configuration

use crate::cli::Cli;
use allmond_core::Result;
use allmond_sentiment::ComposerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base model and adapter to compose at startup
    #[serde(default)]
    pub model: ComposerConfig,

    /// Maximum number of texts accepted by one /analyze call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl ServiceConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| allmond_core::Error::config(format!("Invalid config file: {}", e)))
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(base_model) = &cli.base_model {
            self.model.base_model = base_model.clone();
        }
        if let Some(revision) = &cli.base_revision {
            self.model.base_revision = revision.clone();
        }
        if let Some(adapter_path) = &cli.adapter_path {
            self.model.adapter_path = adapter_path.clone();
        }
        if let Some(device) = cli.device {
            self.model.device = device;
        }
        if let Some(max_length) = cli.max_length {
            self.model.max_length = max_length;
        }
        if let Some(max_batch_size) = cli.max_batch_size {
            self.max_batch_size = max_batch_size;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.base_model.trim().is_empty() {
            return Err(allmond_core::Error::config("model.base_model must not be empty"));
        }
        if self.model.max_length == 0 {
            return Err(allmond_core::Error::config("model.max_length must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(allmond_core::Error::config("max_batch_size must be positive"));
        }
        if self.body_limit == 0 {
            return Err(allmond_core::Error::config("body_limit must be positive"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            model: ComposerConfig::default(),
            max_batch_size: default_max_batch_size(),
            body_limit: default_body_limit(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_batch_size() -> usize {
    64
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}
