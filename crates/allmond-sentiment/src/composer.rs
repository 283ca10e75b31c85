//! Model composition: base model plus optional LoRA adapter, built once at startup.

use crate::adapter::{probe_adapter, AdapterProbe, LoraAdapter};
use crate::config::ComposerConfig;
use crate::device::{device_kind, select_device};
use crate::loaders::{load_tokenizer, load_var_builder, resolve_model_dir, weights_path};
use crate::model::{BackboneConfig, DistilBertSequenceClassifier, SequenceClassifier};
use allmond_core::{DeviceKind, LabelMap, ModelVariant, Result, LABEL_MAP};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;

/// The active classifier and its tokenizer.
///
/// Built once, never mutated, shared by every request. An `Unloaded` handle
/// carries the reason composition failed and refuses inference.
pub struct ModelHandle {
    state: HandleState,
}

enum HandleState {
    Loaded(LoadedModel),
    Unloaded { reason: String },
}

struct LoadedModel {
    tokenizer: Tokenizer,
    model: Box<dyn SequenceClassifier>,
    device: Device,
    device_kind: DeviceKind,
    variant: ModelVariant,
}

impl ModelHandle {
    /// Assemble a handle from already-loaded parts.
    ///
    /// `variant` must be `Adapter` or `BaseOnly`, and the model must produce
    /// exactly as many classes as the label map has.
    pub fn new(
        tokenizer: Tokenizer,
        model: Box<dyn SequenceClassifier>,
        device: Device,
        variant: ModelVariant,
    ) -> Result<Self> {
        if !variant.is_loaded() {
            return Err(allmond_core::Error::internal(
                "a loaded handle cannot have the unloaded variant",
            ));
        }
        if model.num_labels() != LABEL_MAP.num_labels() {
            return Err(allmond_core::Error::startup(format!(
                "Model '{}' produces {} classes, label map has {}",
                model.name(),
                model.num_labels(),
                LABEL_MAP.num_labels()
            )));
        }

        let device_kind = device_kind(&device);
        Ok(Self {
            state: HandleState::Loaded(LoadedModel {
                tokenizer,
                model,
                device,
                device_kind,
                variant,
            }),
        })
    }

    /// A handle that refuses inference
    pub fn unloaded(reason: impl Into<String>) -> Self {
        Self {
            state: HandleState::Unloaded {
                reason: reason.into(),
            },
        }
    }

    pub fn variant(&self) -> ModelVariant {
        match &self.state {
            HandleState::Loaded(loaded) => loaded.variant,
            HandleState::Unloaded { .. } => ModelVariant::Unloaded,
        }
    }

    /// Health signal: `variant != Unloaded`
    pub fn is_loaded(&self) -> bool {
        self.variant().is_loaded()
    }

    /// The label map, identical for every variant
    pub fn label_map(&self) -> &'static LabelMap {
        &LABEL_MAP
    }

    /// Device tag; `None` when unloaded
    pub fn device_kind(&self) -> Option<DeviceKind> {
        match &self.state {
            HandleState::Loaded(loaded) => Some(loaded.device_kind),
            HandleState::Unloaded { .. } => None,
        }
    }

    /// Why composition failed, for unloaded handles
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            HandleState::Loaded(_) => None,
            HandleState::Unloaded { reason } => Some(reason),
        }
    }

    pub(crate) fn parts(&self) -> Result<(&Tokenizer, &dyn SequenceClassifier, &Device)> {
        match &self.state {
            HandleState::Loaded(loaded) => {
                Ok((&loaded.tokenizer, loaded.model.as_ref(), &loaded.device))
            }
            HandleState::Unloaded { reason } => Err(allmond_core::Error::unavailable(format!(
                "model not loaded: {}",
                reason
            ))),
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            HandleState::Loaded(loaded) => f
                .debug_struct("ModelHandle")
                .field("model", &loaded.model.name())
                .field("variant", &loaded.variant)
                .field("device", &loaded.device_kind)
                .finish(),
            HandleState::Unloaded { reason } => f
                .debug_struct("ModelHandle")
                .field("variant", &ModelVariant::Unloaded)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Build the process's model handle.
///
/// Blocking: may download the base model and read hundreds of megabytes.
/// Every failure is a `StartupFailure`; callers decide whether to exit or to
/// keep running with [`ModelHandle::unloaded`].
pub fn compose(config: &ComposerConfig) -> Result<ModelHandle> {
    let start = Instant::now();

    if config.base_model.trim().is_empty() {
        return Err(allmond_core::Error::startup("Base model identifier is empty"));
    }
    if config.max_length == 0 {
        return Err(allmond_core::Error::startup("max_length must be positive"));
    }

    tracing::info!("Composing sentiment model from base '{}'", config.base_model);

    let model_dir = resolve_model_dir(&config.base_source())?;
    let backbone = BackboneConfig::from_dir(&model_dir)?;
    let max_length =
        effective_max_length(config.max_length, backbone.dims.max_position_embeddings);
    let tokenizer = load_tokenizer(&model_dir, max_length)?;
    let weights = weights_path(&model_dir)?;
    let device = select_device(config.device);

    let (vb, variant) = match probe_adapter(&config.adapter_path) {
        AdapterProbe::Present(adapter_dir) => {
            tracing::info!("Loading LoRA adapter from {}", adapter_dir.display());
            let vb = merged_var_builder(&weights, &adapter_dir, &config.base_model, &device)?;
            (vb, ModelVariant::Adapter)
        }
        AdapterProbe::Absent => {
            tracing::warn!(
                "No adapter found at {}; serving the untrained base model",
                config.adapter_path.display()
            );
            (load_var_builder(&weights, &device)?, ModelVariant::BaseOnly)
        }
    };

    let model = DistilBertSequenceClassifier::from_config(
        &backbone,
        vb,
        LABEL_MAP.num_labels(),
        config.base_model.clone(),
    )?;

    let handle = ModelHandle::new(tokenizer, Box::new(model), device, variant)?;

    tracing::info!(
        "Model ready: variant={}, device={}, labels={:?}, took {:?}",
        variant,
        handle.device_kind().unwrap_or(DeviceKind::Cpu),
        LABEL_MAP.id2label(),
        start.elapsed()
    );

    Ok(handle)
}

/// Truncation length the position table can embed
fn effective_max_length(configured: usize, max_positions: usize) -> usize {
    if configured > max_positions {
        tracing::warn!(
            "max_length {} exceeds the model's {} positions; truncating to {}",
            configured,
            max_positions,
            max_positions
        );
        max_positions
    } else {
        configured
    }
}

/// Load base tensors, fold the adapter in, and place the result on `device`
fn merged_var_builder(
    weights: &Path,
    adapter_dir: &Path,
    base_model: &str,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let adapter = LoraAdapter::load(adapter_dir)?;

    if let Some(trained_on) = &adapter.config().base_model_name_or_path {
        if trained_on != base_model {
            tracing::warn!(
                "Adapter was trained on '{}' but base model is '{}'",
                trained_on,
                base_model
            );
        }
    }

    let mut tensors = candle_core::safetensors::load(weights, &Device::Cpu).map_err(|e| {
        allmond_core::Error::startup(format!(
            "Failed to load base weights {}: {}",
            weights.display(),
            e
        ))
    })?;

    let summary = adapter.merge_into(&mut tensors)?;
    let targets = adapter
        .config()
        .target_modules
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "unspecified".to_string());
    tracing::info!(
        "Merged LoRA adapter (rank={}, scaling={}, targets={}): {} layers adapted, {} tensors replaced",
        adapter.rank(),
        adapter.scaling(),
        targets,
        summary.merged_layers,
        summary.replaced_tensors
    );

    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}
