//! Test fixtures: tiny on-disk models, adapters, and a keyword classifier
//!
//! The DistilBERT fixture is small enough to build and run in milliseconds
//! while exercising the same loading path as a hub checkpoint.

#![allow(dead_code)]

use allmond_core::ModelVariant;
use allmond_sentiment::adapter::{ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE};
use allmond_sentiment::loaders::load_tokenizer;
use allmond_sentiment::{ModelHandle, SequenceClassifier};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use std::collections::HashMap;
use std::path::Path;

pub const HIDDEN: usize = 8;
pub const MAX_LENGTH: usize = 16;

/// Vocabulary shared by every fixture tokenizer
pub const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "great", "phone", "terrible", "battery", "good", "bad",
    "boom", "the", "is", "amazing",
];

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("allmond_sentiment=debug")
        .with_test_writer()
        .try_init();
}

pub fn token_id(token: &str) -> i64 {
    VOCAB
        .iter()
        .position(|t| *t == token)
        .map(|i| i as i64)
        .unwrap()
}

fn config_json() -> serde_json::Value {
    serde_json::json!({
        "vocab_size": 16,
        "dim": HIDDEN,
        "n_layers": 1,
        "n_heads": 2,
        "hidden_dim": 16,
        "activation": "gelu",
        "max_position_embeddings": 32,
        "initializer_range": 0.02,
        "pad_token_id": 0,
        "model_type": "distilbert"
    })
}

pub fn write_vocab(dir: &Path, tokens: &[&str]) {
    std::fs::write(dir.join("vocab.txt"), tokens.join("\n")).unwrap();
}

/// Write a randomly initialized DistilBERT base checkpoint without a
/// classification head, like `distilbert-base-uncased` on the hub.
pub fn write_base_model(dir: &Path) {
    let config: DistilBertConfig = serde_json::from_value(config_json()).unwrap();

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    DistilBertModel::load(vb.pp("distilbert"), &config).unwrap();
    varmap.save(dir.join("model.safetensors")).unwrap();

    std::fs::write(
        dir.join("config.json"),
        serde_json::to_string_pretty(&config_json()).unwrap(),
    )
    .unwrap();
    write_vocab(dir, VOCAB);
}

/// LoRA adapter over the fixture base.
///
/// Adapts the attention projections and ships a head whose bias pushes every input to
/// `Positive`, so composition is observable in predictions.
pub struct AdapterFixture {
    pub rank: usize,
    pub head_labels: usize,
    pub base_model_name: String,
}

impl Default for AdapterFixture {
    fn default() -> Self {
        Self {
            rank: 2,
            head_labels: 3,
            base_model_name: "distilbert-base-uncased".to_string(),
        }
    }
}

impl AdapterFixture {
    pub fn write(&self, dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        let config = serde_json::json!({
            "peft_type": "LORA",
            "task_type": "SEQ_CLS",
            "r": self.rank,
            "lora_alpha": 16,
            "lora_dropout": 0.1,
            "target_modules": ["q_lin", "v_lin"],
            "modules_to_save": ["pre_classifier", "classifier"],
            "base_model_name_or_path": self.base_model_name,
        });
        std::fs::write(
            dir.join(ADAPTER_CONFIG_FILE),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();

        let device = Device::Cpu;
        let layer = "base_model.model.distilbert.transformer.layer.0.attention";
        let mut tensors = HashMap::new();
        for module in ["q_lin", "v_lin"] {
            tensors.insert(
                format!("{}.{}.lora_A.weight", layer, module),
                Tensor::randn(0f32, 0.1, (self.rank, HIDDEN), &device).unwrap(),
            );
            tensors.insert(
                format!("{}.{}.lora_B.weight", layer, module),
                Tensor::randn(0f32, 0.1, (HIDDEN, self.rank), &device).unwrap(),
            );
        }

        tensors.insert(
            "base_model.model.pre_classifier.modules_to_save.weight".to_string(),
            Tensor::zeros((HIDDEN, HIDDEN), DType::F32, &device).unwrap(),
        );
        tensors.insert(
            "base_model.model.pre_classifier.modules_to_save.bias".to_string(),
            Tensor::zeros(HIDDEN, DType::F32, &device).unwrap(),
        );
        tensors.insert(
            "base_model.model.classifier.modules_to_save.weight".to_string(),
            Tensor::zeros((self.head_labels, HIDDEN), DType::F32, &device).unwrap(),
        );
        let mut bias = vec![0f32; self.head_labels];
        if let Some(last) = bias.last_mut() {
            *last = 10.0;
        }
        tensors.insert(
            "base_model.model.classifier.modules_to_save.bias".to_string(),
            Tensor::from_vec(bias, self.head_labels, &device).unwrap(),
        );

        candle_core::safetensors::save(&tensors, dir.join(ADAPTER_WEIGHTS_FILE)).unwrap();
    }
}

/// Classifier keyed on token ids: "good"/"great"/"amazing" are positive,
/// "bad"/"terrible" negative, everything else neutral, and "boom" fails the
/// forward pass.
pub struct KeywordClassifier;

impl SequenceClassifier for KeywordClassifier {
    fn forward(&self, input_ids: &Tensor, _padding_mask: &Tensor) -> candle_core::Result<Tensor> {
        let ids: Vec<Vec<i64>> = input_ids.to_vec2()?;
        let mut logits = Vec::with_capacity(ids.len() * 3);
        for row in &ids {
            if row.contains(&token_id("boom")) {
                return Err(candle_core::Error::Msg("simulated forward failure".to_string()));
            }
            let positive = ["good", "great", "amazing"]
                .iter()
                .any(|t| row.contains(&token_id(t)));
            let negative = ["bad", "terrible"].iter().any(|t| row.contains(&token_id(t)));
            logits.extend_from_slice(&match (positive, negative) {
                (true, false) => [0.0f32, 0.5, 4.0],
                (false, true) => [4.0, 0.5, 0.0],
                _ => [0.0, 3.0, 0.0],
            });
        }
        Tensor::from_vec(logits, (ids.len(), 3), input_ids.device())
    }

    fn num_labels(&self) -> usize {
        3
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// A loaded handle around [`KeywordClassifier`] with a fixture tokenizer
pub fn keyword_handle(vocab: &[&str]) -> ModelHandle {
    let dir = tempfile::tempdir().unwrap();
    write_vocab(dir.path(), vocab);
    let tokenizer = load_tokenizer(dir.path(), MAX_LENGTH).unwrap();
    ModelHandle::new(
        tokenizer,
        Box::new(KeywordClassifier),
        Device::Cpu,
        ModelVariant::Adapter,
    )
    .unwrap()
}
