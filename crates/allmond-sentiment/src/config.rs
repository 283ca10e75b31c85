//! Composer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Base model used when none is configured
pub const DEFAULT_BASE_MODEL: &str = "distilbert-base-uncased";

/// Where a trained adapter is expected by default
pub const DEFAULT_ADAPTER_PATH: &str = "./models/sentiment";

/// Maximum number of tokens fed to the model per text
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// Inputs to model composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Base model identifier: a local directory or a Hugging Face repo id
    #[serde(default = "default_base_model")]
    pub base_model: String,

    /// Hub revision for the base model
    #[serde(default = "default_revision")]
    pub base_revision: String,

    /// Directory that may hold a trained LoRA adapter
    #[serde(default = "default_adapter_path")]
    pub adapter_path: PathBuf,

    /// Device selection policy
    #[serde(default)]
    pub device: DevicePreference,

    /// Truncation length in tokens
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_base_model() -> String {
    DEFAULT_BASE_MODEL.to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_adapter_path() -> PathBuf {
    PathBuf::from(DEFAULT_ADAPTER_PATH)
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            base_model: default_base_model(),
            base_revision: default_revision(),
            adapter_path: default_adapter_path(),
            device: DevicePreference::default(),
            max_length: default_max_length(),
        }
    }
}

impl ComposerConfig {
    /// Create a configuration for a base model and adapter directory
    pub fn new(base_model: impl Into<String>, adapter_path: impl Into<PathBuf>) -> Self {
        Self {
            base_model: base_model.into(),
            adapter_path: adapter_path.into(),
            ..Default::default()
        }
    }

    /// Set device preference
    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Set truncation length
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Set Hugging Face revision for the base model
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.base_revision = revision.into();
        self
    }

    /// Resolve where the base model comes from
    pub fn base_source(&self) -> ModelSource {
        ModelSource::from_id(&self.base_model, &self.base_revision)
    }
}

/// Device selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is available, otherwise CPU
    #[default]
    Auto,
    /// Always use the CPU
    Cpu,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("unknown device preference '{}' (expected auto or cpu)", other)),
        }
    }
}

/// Source location for base model files
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Load from local file system
    Local { path: PathBuf },

    /// Download from Hugging Face Hub
    HuggingFace { repo: String, revision: String },
}

impl ModelSource {
    /// An identifier naming an existing directory is local; anything else is a hub repo
    pub fn from_id(id: &str, revision: &str) -> Self {
        let path = Path::new(id);
        if path.is_dir() {
            Self::Local {
                path: path.to_path_buf(),
            }
        } else {
            Self::HuggingFace {
                repo: id.to_string(),
                revision: revision.to_string(),
            }
        }
    }
}
