//! Allmond Core
//!
//! Core types and error handling shared across Allmond components.
//!
//! This crate provides:
//! - The error taxonomy and result alias
//! - The fixed three-way sentiment label map
//! - Classification results and model/device tags

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ClassificationResult, DeviceKind, LabelMap, ModelVariant, Sentiment, LABEL_MAP};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{ClassificationResult, ModelVariant, Sentiment, LABEL_MAP};
}
