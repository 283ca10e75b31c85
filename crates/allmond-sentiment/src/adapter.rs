//! LoRA adapter artifacts: probing, parsing, and merging into base weights.
//!
//! An adapter directory holds `adapter_config.json` and
//! `adapter_model.safetensors` in the PEFT layout. Each adapted linear layer
//! contributes a `lora_A` (rank x in) and `lora_B` (out x rank) pair; the
//! composed weight is `W + scaling * (B @ A)`. Tensors without a LoRA suffix
//! (typically the classification head) replace the base tensor outright.

use allmond_core::Result;
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// File whose presence marks a directory as holding an adapter
pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// Adapter weights file
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

const PICKLE_WEIGHTS_FILE: &str = "adapter_model.bin";

/// Outcome of inspecting the adapter path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterProbe {
    /// Directory with an adapter configuration
    Present(PathBuf),
    /// Path missing, or present without an adapter configuration
    Absent,
}

/// Decide whether `path` holds an adapter. Never fails: anything that is not
/// a directory containing `adapter_config.json` counts as "no adapter".
pub fn probe_adapter(path: &Path) -> AdapterProbe {
    if path.is_dir() && path.join(ADAPTER_CONFIG_FILE).is_file() {
        AdapterProbe::Present(path.to_path_buf())
    } else {
        AdapterProbe::Absent
    }
}

/// `adapter_config.json` fields that affect composition.
///
/// Training-only keys (`lora_dropout`, `task_type`, `bias`) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoraConfig {
    #[serde(default)]
    pub peft_type: Option<String>,

    /// LoRA rank
    pub r: usize,

    /// LoRA alpha parameter for scaling
    pub lora_alpha: f64,

    #[serde(default)]
    pub target_modules: Option<TargetModules>,

    #[serde(default)]
    pub modules_to_save: Option<Vec<String>>,

    #[serde(default)]
    pub base_model_name_or_path: Option<String>,

    /// Rank-stabilized scaling (`alpha / sqrt(r)`)
    #[serde(default)]
    pub use_rslora: bool,

    /// Adapted layers store weights as (in, out)
    #[serde(default)]
    pub fan_in_fan_out: bool,
}

/// Target modules are either an explicit list or a regex
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetModules {
    List(Vec<String>),
    Pattern(String),
}

impl std::fmt::Display for TargetModules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetModules::List(modules) => write!(f, "{}", modules.join(",")),
            TargetModules::Pattern(pattern) => write!(f, "/{}/", pattern),
        }
    }
}

impl LoraConfig {
    /// Read and validate `adapter_config.json` from an adapter directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(ADAPTER_CONFIG_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            allmond_core::Error::startup(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: LoraConfig = serde_json::from_str(&content).map_err(|e| {
            allmond_core::Error::startup(format!(
                "Corrupted adapter config {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(peft_type) = &self.peft_type {
            if !peft_type.eq_ignore_ascii_case("lora") {
                return Err(allmond_core::Error::startup(format!(
                    "Unsupported adapter type '{}' (only LORA adapters can be composed)",
                    peft_type
                )));
            }
        }
        if self.r == 0 {
            return Err(allmond_core::Error::startup("Adapter rank r must be positive"));
        }
        if !self.lora_alpha.is_finite() {
            return Err(allmond_core::Error::startup("Adapter lora_alpha must be finite"));
        }
        Ok(())
    }

    /// Multiplier applied to `B @ A`
    pub fn scaling(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

/// One adapted linear layer
#[derive(Debug)]
struct LoraPair {
    /// Base module path, e.g. `distilbert.transformer.layer.0.attention.q_lin`
    module: String,
    a: Tensor,
    b: Tensor,
}

/// What a merge changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub merged_layers: usize,
    pub replaced_tensors: usize,
}

/// Parsed LoRA adapter ready to be merged into base weights
#[derive(Debug)]
pub struct LoraAdapter {
    config: LoraConfig,
    pairs: Vec<LoraPair>,
    saved_modules: BTreeMap<String, Tensor>,
}

#[derive(Clone, Copy)]
enum LoraPart {
    A,
    B,
}

impl LoraAdapter {
    /// Load an adapter directory (config plus safetensors weights)
    pub fn load(dir: &Path) -> Result<Self> {
        let config = LoraConfig::from_dir(dir)?;

        let weights_path = dir.join(ADAPTER_WEIGHTS_FILE);
        if !weights_path.exists() {
            if dir.join(PICKLE_WEIGHTS_FILE).exists() {
                return Err(allmond_core::Error::startup(format!(
                    "Adapter in {} only ships {}; re-save it with safetensors",
                    dir.display(),
                    PICKLE_WEIGHTS_FILE
                )));
            }
            return Err(allmond_core::Error::startup(format!(
                "{} not found in {}",
                ADAPTER_WEIGHTS_FILE,
                dir.display()
            )));
        }

        let tensors = candle_core::safetensors::load(&weights_path, &Device::Cpu).map_err(|e| {
            allmond_core::Error::startup(format!(
                "Corrupted adapter weights {}: {}",
                weights_path.display(),
                e
            ))
        })?;

        Self::from_tensors(config, tensors)
    }

    /// Build an adapter from a config and its raw tensors
    pub fn from_tensors(config: LoraConfig, tensors: HashMap<String, Tensor>) -> Result<Self> {
        config.validate()?;

        let mut halves: BTreeMap<String, (Option<Tensor>, Option<Tensor>)> = BTreeMap::new();
        let mut saved_modules = BTreeMap::new();

        for (raw_key, tensor) in tensors {
            let key = normalize_key(&raw_key);
            let lora = split_lora_key(&key).map(|(module, part)| (module.to_string(), part));
            match lora {
                Some((module, part)) => {
                    let entry = halves.entry(module).or_default();
                    match part {
                        LoraPart::A => entry.0 = Some(tensor),
                        LoraPart::B => entry.1 = Some(tensor),
                    }
                }
                None if key.contains("lora_") => {
                    return Err(allmond_core::Error::startup(format!(
                        "Unsupported adapter tensor '{}'",
                        raw_key
                    )));
                }
                None => {
                    saved_modules.insert(key, tensor);
                }
            }
        }

        let mut pairs = Vec::with_capacity(halves.len());
        for (module, (a, b)) in halves {
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(allmond_core::Error::startup(format!(
                        "Adapter layer '{}' is missing its lora_A or lora_B weight",
                        module
                    )))
                }
            };
            check_pair_shapes(&module, &a, &b, config.r)?;
            pairs.push(LoraPair { module, a, b });
        }

        if pairs.is_empty() {
            return Err(allmond_core::Error::startup(
                "Adapter contains no LoRA weights",
            ));
        }

        Ok(Self {
            config,
            pairs,
            saved_modules,
        })
    }

    pub fn config(&self) -> &LoraConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.config.r
    }

    pub fn scaling(&self) -> f64 {
        self.config.scaling()
    }

    /// Number of adapted linear layers
    pub fn layer_count(&self) -> usize {
        self.pairs.len()
    }

    /// Names of base tensors replaced wholesale
    pub fn saved_module_keys(&self) -> impl Iterator<Item = &str> {
        self.saved_modules.keys().map(String::as_str)
    }

    /// Fold the adapter into base weights in place.
    ///
    /// Every adapted layer must exist in `base` with the delta's shape. Saved
    /// modules may introduce tensors the base lacks (an untrained base has no
    /// classification head) but must match the shape of any tensor they replace.
    pub fn merge_into(&self, base: &mut HashMap<String, Tensor>) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();

        for pair in &self.pairs {
            let key = format!("{}.weight", pair.module);
            let weight = base.get(&key).ok_or_else(|| {
                allmond_core::Error::startup(format!(
                    "Adapter targets '{}' which the base model does not have",
                    key
                ))
            })?;

            let delta = lora_delta(pair, self.scaling(), self.config.fan_in_fan_out)
                .map_err(|e| {
                    allmond_core::Error::startup(format!(
                        "Failed to compute LoRA delta for '{}': {}",
                        pair.module, e
                    ))
                })?;

            if delta.dims() != weight.dims() {
                return Err(allmond_core::Error::startup(format!(
                    "Adapter delta for '{}' has shape {:?}, base weight has {:?}",
                    pair.module,
                    delta.dims(),
                    weight.dims()
                )));
            }

            let merged = weight
                .to_dtype(DType::F32)
                .and_then(|w| w.add(&delta))
                .map_err(|e| {
                    allmond_core::Error::startup(format!(
                        "Failed to merge adapter into '{}': {}",
                        key, e
                    ))
                })?;
            base.insert(key, merged);
            summary.merged_layers += 1;
        }

        for (key, tensor) in &self.saved_modules {
            if let Some(existing) = base.get(key) {
                if existing.dims() != tensor.dims() {
                    return Err(allmond_core::Error::startup(format!(
                        "Adapter tensor '{}' has shape {:?}, base tensor has {:?}",
                        key,
                        tensor.dims(),
                        existing.dims()
                    )));
                }
            }
            base.insert(key.clone(), tensor.clone());
            summary.replaced_tensors += 1;
        }

        Ok(summary)
    }
}

fn lora_delta(pair: &LoraPair, scaling: f64, fan_in_fan_out: bool) -> candle_core::Result<Tensor> {
    let a = pair.a.to_dtype(DType::F32)?;
    let b = pair.b.to_dtype(DType::F32)?;
    let delta = b.matmul(&a)?;
    let delta = if fan_in_fan_out {
        delta.t()?.contiguous()?
    } else {
        delta
    };
    delta.affine(scaling, 0.0)
}

fn check_pair_shapes(module: &str, a: &Tensor, b: &Tensor, rank: usize) -> Result<()> {
    match (a.dims(), b.dims()) {
        ([rank_a, _], [_, rank_b]) if *rank_a == rank && *rank_b == rank => Ok(()),
        (a_dims, b_dims) => Err(allmond_core::Error::startup(format!(
            "Adapter layer '{}' has lora_A {:?} and lora_B {:?}, expected rank {}",
            module, a_dims, b_dims, rank
        ))),
    }
}

/// Strip the PEFT wrapper prefix and adapter-name segments from a tensor key
fn normalize_key(key: &str) -> String {
    let key = key
        .strip_prefix("base_model.model.")
        .or_else(|| key.strip_prefix("base_model."))
        .unwrap_or(key);
    key.replace(".modules_to_save.default.", ".")
        .replace(".modules_to_save.", ".")
}

fn split_lora_key(key: &str) -> Option<(&str, LoraPart)> {
    const SUFFIXES: [(&str, LoraPart); 4] = [
        (".lora_A.weight", LoraPart::A),
        (".lora_A.default.weight", LoraPart::A),
        (".lora_B.weight", LoraPart::B),
        (".lora_B.default.weight", LoraPart::B),
    ];
    SUFFIXES
        .iter()
        .find_map(|(suffix, part)| key.strip_suffix(suffix).map(|module| (module, *part)))
}
