//! Base model file resolution and loading helpers

use crate::config::ModelSource;
use allmond_core::Result;
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokenizers::{
    PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection, TruncationParams,
};

/// Weights file expected in every model directory
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Resolve the base model to a local directory, downloading from the hub if needed
pub fn resolve_model_dir(source: &ModelSource) -> Result<PathBuf> {
    match source {
        ModelSource::Local { path } => {
            if !path.exists() {
                return Err(allmond_core::Error::startup(format!(
                    "Model path does not exist: {}",
                    path.display()
                )));
            }
            Ok(path.clone())
        }
        ModelSource::HuggingFace { repo, revision } => download_from_huggingface(repo, revision),
    }
}

fn download_from_huggingface(repo: &str, revision: &str) -> Result<PathBuf> {
    tracing::info!("Downloading base model from HuggingFace: {} @ {}", repo, revision);

    let api = Api::new().map_err(|e| {
        allmond_core::Error::startup(format!("Failed to initialize HuggingFace API: {}", e))
    })?;
    let repo_obj = api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config_path = repo_obj.get("config.json").map_err(|e| {
        allmond_core::Error::startup(format!("Failed to download config.json from {}: {}", repo, e))
    })?;

    repo_obj.get(WEIGHTS_FILE).map_err(|e| {
        allmond_core::Error::startup(format!(
            "Failed to download {} from {}: {}",
            WEIGHTS_FILE, repo, e
        ))
    })?;

    let mut found_tokenizer = false;
    for file in ["tokenizer.json", "vocab.txt"] {
        match repo_obj.get(file) {
            Ok(_) => {
                tracing::debug!("Found tokenizer file: {}", file);
                found_tokenizer = true;
                break;
            }
            Err(e) => tracing::debug!("Tokenizer file {} unavailable: {}", file, e),
        }
    }

    if !found_tokenizer {
        return Err(allmond_core::Error::startup(format!(
            "No tokenizer found in {} (tried tokenizer.json, vocab.txt)",
            repo
        )));
    }

    let model_dir = config_path
        .parent()
        .ok_or_else(|| allmond_core::Error::startup("Invalid HuggingFace cache path"))?;

    tracing::info!("Base model available at: {}", model_dir.display());
    Ok(model_dir.to_path_buf())
}

/// Load the tokenizer and configure truncation and padding
pub fn load_tokenizer(model_path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = read_tokenizer(model_path)?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            direction: TruncationDirection::Right,
            ..Default::default()
        }))
        .map_err(|e| {
            allmond_core::Error::startup(format!("Failed to configure truncation: {}", e))
        })?;

    let pad_token = "[PAD]".to_string();
    let pad_id = tokenizer.token_to_id(&pad_token).unwrap_or(0);
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token,
        ..Default::default()
    }));

    Ok(tokenizer)
}

fn read_tokenizer(model_path: &Path) -> Result<Tokenizer> {
    let tokenizer_json_path = model_path.join("tokenizer.json");
    if tokenizer_json_path.exists() {
        tracing::debug!("Loading tokenizer from tokenizer.json");
        return Tokenizer::from_file(&tokenizer_json_path).map_err(|e| {
            allmond_core::Error::startup(format!("Failed to load tokenizer.json: {}", e))
        });
    }

    let vocab_path = model_path.join("vocab.txt");
    if vocab_path.exists() {
        tracing::debug!("Building tokenizer from vocab.txt");

        use tokenizers::models::wordpiece::WordPiece;
        use tokenizers::normalizers::BertNormalizer;
        use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
        use tokenizers::processors::bert::BertProcessing;

        let wordpiece = WordPiece::from_file(vocab_path.to_string_lossy().as_ref())
            .unk_token("[UNK]".to_string())
            .build()
            .map_err(|e| {
                allmond_core::Error::startup(format!("Failed to build WordPiece model: {}", e))
            })?;

        let mut tokenizer = Tokenizer::new(wordpiece);
        tokenizer.with_normalizer(Some(BertNormalizer::default()));
        tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

        let sep = tokenizer.token_to_id("[SEP]").unwrap_or(102);
        let cls = tokenizer.token_to_id("[CLS]").unwrap_or(101);
        tokenizer.with_post_processor(Some(BertProcessing::new(
            ("[SEP]".to_string(), sep),
            ("[CLS]".to_string(), cls),
        )));

        return Ok(tokenizer);
    }

    Err(allmond_core::Error::startup(format!(
        "No tokenizer found in {} (tried tokenizer.json, vocab.txt)",
        model_path.display()
    )))
}

/// Read and deserialize a JSON config file
pub fn parse_json_config<T: DeserializeOwned>(config_path: &Path) -> Result<T> {
    let config_str = std::fs::read_to_string(config_path).map_err(|e| {
        allmond_core::Error::startup(format!(
            "Failed to read config {}: {}",
            config_path.display(),
            e
        ))
    })?;

    serde_json::from_str(&config_str).map_err(|e| {
        allmond_core::Error::startup(format!(
            "Failed to parse config {}: {}",
            config_path.display(),
            e
        ))
    })
}

/// Path of the base weights, which must exist
pub fn weights_path(model_path: &Path) -> Result<PathBuf> {
    let path = model_path.join(WEIGHTS_FILE);
    if !path.exists() {
        return Err(allmond_core::Error::startup(format!(
            "{} not found in {}",
            WEIGHTS_FILE,
            model_path.display()
        )));
    }
    Ok(path)
}

/// Memory-map base weights directly onto the target device
pub fn load_var_builder(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    // SAFETY: the weights file is treated as read-only for the process lifetime.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device).map_err(|e| {
            allmond_core::Error::startup(format!("Failed to load weights: {}", e))
        })?
    };

    Ok(vb)
}
