//! Sequence classification models

use allmond_core::Result;
use candle_core::{DType, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;
use std::path::Path;

use crate::loaders::parse_json_config;

/// A model mapping token ids to class logits.
///
/// Implementations hold no mutable state: one instance serves concurrent
/// requests through a shared reference.
pub trait SequenceClassifier: Send + Sync {
    /// Logits of shape `(batch, num_labels)`.
    ///
    /// `input_ids` is `(batch, seq)` of `i64`; `padding_mask` is `(batch, seq)`
    /// of `u8`, 1 at padded positions.
    fn forward(&self, input_ids: &Tensor, padding_mask: &Tensor) -> candle_core::Result<Tensor>;

    /// Size of the class dimension
    fn num_labels(&self) -> usize;

    /// Model name for logs
    fn name(&self) -> &str;
}

/// DistilBERT backbone with the standard sequence-classification head
pub struct DistilBertSequenceClassifier {
    name: String,
    model: DistilBertModel,
    pre_classifier: Option<Linear>,
    classifier: Linear,
    num_labels: usize,
}

/// Backbone sizes the head and the tokenizer depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BackboneDims {
    /// Hidden size
    pub dim: usize,
    /// Longest sequence the position table can embed
    pub max_position_embeddings: usize,
}

/// A checkpoint's `config.json`, read once
#[derive(Debug)]
pub struct BackboneConfig {
    pub config: DistilBertConfig,
    pub dims: BackboneDims,
}

impl BackboneConfig {
    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let config_path = model_dir.join("config.json");
        let raw: serde_json::Value = parse_json_config(&config_path)?;
        let invalid = |e: serde_json::Error| {
            allmond_core::Error::startup(format!(
                "Invalid DistilBERT config {}: {}",
                config_path.display(),
                e
            ))
        };

        Ok(Self {
            config: DistilBertConfig::deserialize(&raw).map_err(invalid)?,
            dims: BackboneDims::deserialize(&raw).map_err(invalid)?,
        })
    }
}

impl DistilBertSequenceClassifier {
    /// Build from a parsed `config.json` and prepared weights
    pub fn from_config(
        backbone: &BackboneConfig,
        vb: VarBuilder,
        num_labels: usize,
        name: impl Into<String>,
    ) -> Result<Self> {
        Self::load(vb, &backbone.config, backbone.dims.dim, num_labels, name)
    }

    pub fn load(
        vb: VarBuilder,
        config: &DistilBertConfig,
        hidden_size: usize,
        num_labels: usize,
        name: impl Into<String>,
    ) -> Result<Self> {
        let model = DistilBertModel::load(vb.pp("distilbert"), config).map_err(|e| {
            allmond_core::Error::startup(format!("Failed to load DistilBERT model: {}", e))
        })?;

        let pre_classifier = if vb.contains_tensor("pre_classifier.weight") {
            let layer = candle_nn::linear(hidden_size, hidden_size, vb.pp("pre_classifier"))
                .map_err(|e| {
                    allmond_core::Error::startup(format!("Failed to load pre_classifier: {}", e))
                })?;
            tracing::info!("Loaded pre_classifier layer (hidden_size={})", hidden_size);
            Some(layer)
        } else {
            None
        };

        let classifier = load_classification_head(&vb, hidden_size, num_labels)?;

        Ok(Self {
            name: name.into(),
            model,
            pre_classifier,
            classifier,
            num_labels,
        })
    }
}

impl SequenceClassifier for DistilBertSequenceClassifier {
    fn forward(&self, input_ids: &Tensor, padding_mask: &Tensor) -> candle_core::Result<Tensor> {
        let hidden_states = self.model.forward(input_ids, padding_mask)?;
        let cls_embedding = hidden_states.i((.., 0))?;

        let pooled_output = match &self.pre_classifier {
            Some(pre_classifier) => pre_classifier.forward(&cls_embedding)?.relu()?,
            None => cls_embedding,
        };

        self.classifier.forward(&pooled_output)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Load `classifier.{weight,bias}` if the checkpoint has them.
///
/// A head that exists with the wrong shape is an error. A missing head (an
/// untrained base checkpoint) is initialized randomly so the service can still
/// answer, with a warning.
fn load_classification_head(vb: &VarBuilder, hidden_size: usize, num_labels: usize) -> Result<Linear> {
    if vb.contains_tensor("classifier.weight") {
        let head = candle_nn::linear(hidden_size, num_labels, vb.pp("classifier")).map_err(|e| {
            allmond_core::Error::startup(format!(
                "Classification head does not match {} labels: {}",
                num_labels, e
            ))
        })?;
        tracing::info!(
            "Loaded classification head (hidden_size={}, num_labels={})",
            hidden_size,
            num_labels
        );
        return Ok(head);
    }

    tracing::warn!(
        "No trained classification head found, initializing random weights. \
         Predictions are unreliable until an adapter is trained."
    );

    let weight = Tensor::randn(0f32, 0.02, (num_labels, hidden_size), vb.device())
        .map_err(|e| allmond_core::Error::startup(format!("Failed to init weights: {}", e)))?;
    let bias = Tensor::zeros((num_labels,), DType::F32, vb.device())
        .map_err(|e| allmond_core::Error::startup(format!("Failed to init bias: {}", e)))?;

    Ok(Linear::new(weight, Some(bias)))
}
