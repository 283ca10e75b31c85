use allmond_sentiment::DevicePreference;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "allmond-server")]
#[command(author, version, about = "Review sentiment inference service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALLMOND_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, env = "ALLMOND_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "ALLMOND_PORT")]
    pub port: Option<u16>,

    /// Base model: local directory or Hugging Face repo id
    #[arg(short, long, env = "ALLMOND_BASE_MODEL")]
    pub base_model: Option<String>,

    /// Hugging Face revision of the base model
    #[arg(long, env = "ALLMOND_BASE_REVISION")]
    pub base_revision: Option<String>,

    /// Directory that may hold a trained LoRA adapter
    #[arg(short, long, env = "ALLMOND_ADAPTER_PATH")]
    pub adapter_path: Option<PathBuf>,

    /// Device preference: auto or cpu
    #[arg(short, long, env = "ALLMOND_DEVICE")]
    pub device: Option<DevicePreference>,

    /// Truncation length in tokens
    #[arg(long, env = "ALLMOND_MAX_LENGTH")]
    pub max_length: Option<usize>,

    /// Maximum number of texts per /analyze request
    #[arg(long, env = "ALLMOND_MAX_BATCH_SIZE")]
    pub max_batch_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "ALLMOND_LOG_JSON")]
    pub log_json: bool,
}
