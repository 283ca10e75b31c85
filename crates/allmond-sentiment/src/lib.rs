//! Allmond Sentiment
//!
//! Composes a DistilBERT base model with an optional LoRA adapter and runs
//! three-way sentiment classification over batches of review texts.
//!
//! # Example
//!
//! ```no_run
//! use allmond_sentiment::{compose, ComposerConfig, SentimentPipeline};
//! use std::sync::Arc;
//!
//! # fn main() -> allmond_core::Result<()> {
//! let config = ComposerConfig::new("distilbert-base-uncased", "./models/sentiment");
//! let handle = Arc::new(compose(&config)?);
//! let pipeline = SentimentPipeline::new(handle);
//!
//! let results = pipeline.analyze(&["This phone is amazing".to_string()])?;
//! println!("{} ({:.2})", results[0].sentiment, results[0].confidence);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod composer;
pub mod config;
pub mod device;
pub mod loaders;
pub mod model;
pub mod pipeline;

pub use adapter::{probe_adapter, AdapterProbe, LoraAdapter, LoraConfig, MergeSummary};
pub use composer::{compose, ModelHandle};
pub use config::{ComposerConfig, DevicePreference, ModelSource};
pub use device::select_device;
pub use model::{BackboneConfig, DistilBertSequenceClassifier, SequenceClassifier};
pub use pipeline::SentimentPipeline;

pub mod prelude {
    pub use crate::composer::{compose, ModelHandle};
    pub use crate::config::ComposerConfig;
    pub use crate::pipeline::SentimentPipeline;
    pub use allmond_core::prelude::*;
}
