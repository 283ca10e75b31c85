//! Shared domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentiment label attached to a classified text.
///
/// `Error` is the sentinel for a text that could not be classified; it never
/// appears in the label map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
    Error,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
            Self::Positive => "Positive",
            Self::Error => "Error",
        }
    }

    /// True for the three real classes
    pub fn is_label(&self) -> bool {
        !matches!(self, Self::Error)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed bidirectional mapping between class index and sentiment.
///
/// There is exactly one label map per process; both the base model and every
/// adapter-composed model are read through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMap {
    labels: [Sentiment; 3],
}

/// The process-wide label map: `{0: Negative, 1: Neutral, 2: Positive}`
pub const LABEL_MAP: LabelMap = LabelMap {
    labels: [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive],
};

impl LabelMap {
    /// Number of classes the classification head must produce
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Sentiment for a class index
    pub fn sentiment(&self, index: usize) -> Option<Sentiment> {
        self.labels.get(index).copied()
    }

    /// Class index for a sentiment (`None` for `Error`)
    pub fn index_of(&self, sentiment: Sentiment) -> Option<usize> {
        self.labels.iter().position(|&s| s == sentiment)
    }

    /// `(index, name)` pairs in index order
    pub fn id2label(&self) -> Vec<(usize, &'static str)> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, s)| (idx, s.as_str()))
            .collect()
    }

    pub fn labels(&self) -> &[Sentiment] {
        &self.labels
    }
}

impl Default for LabelMap {
    fn default() -> Self {
        LABEL_MAP
    }
}

/// Result of classifying one text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Input text, echoed verbatim
    pub text: String,

    /// Predicted label, or `Error`
    pub sentiment: Sentiment,

    /// Probability of the predicted class (0.0-1.0); 0.0 on error
    pub confidence: f32,
}

impl ClassificationResult {
    /// Create a successful classification result
    pub fn new(text: impl Into<String>, sentiment: Sentiment, confidence: f32) -> Self {
        Self {
            text: text.into(),
            sentiment,
            confidence,
        }
    }

    /// Create the error marker for a text that could not be classified
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sentiment: Sentiment::Error,
            confidence: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.sentiment == Sentiment::Error
    }
}

/// Which model composition is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Base model with a LoRA adapter merged in
    Adapter,
    /// Unmodified base model (no adapter artifact found)
    BaseOnly,
    /// Composition has not succeeded; inference is refused
    Unloaded,
}

impl ModelVariant {
    pub fn is_loaded(&self) -> bool {
        !matches!(self, Self::Unloaded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adapter => "adapter",
            Self::BaseOnly => "base_only",
            Self::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the composed model runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Accelerator,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Accelerator => f.write_str("accelerator"),
        }
    }
}
