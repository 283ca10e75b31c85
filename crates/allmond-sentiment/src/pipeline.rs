//! Batch sentiment inference over a shared model handle

use crate::composer::ModelHandle;
use crate::model::SequenceClassifier;
use allmond_core::{ClassificationResult, Result, Sentiment};
use candle_core::{DType, Device, Tensor, D};
use std::sync::Arc;
use std::time::Instant;
use tokenizers::Tokenizer;

/// Runs texts through the active model one at a time.
///
/// Cloning is cheap; clones share the same handle.
#[derive(Debug, Clone)]
pub struct SentimentPipeline {
    handle: Arc<ModelHandle>,
}

impl SentimentPipeline {
    pub fn new(handle: Arc<ModelHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    /// Classify every text, preserving order and length.
    ///
    /// A failure on one text yields an `Error` result for that position only.
    /// The whole call fails with `ServiceUnavailable` when no model is loaded.
    pub fn analyze(&self, texts: &[String]) -> Result<Vec<ClassificationResult>> {
        let (tokenizer, model, device) = self.handle.parts()?;

        let results: Vec<ClassificationResult> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let start = Instant::now();
                let outcome = classify_one(tokenizer, model, device, self.handle.label_map(), text);
                metrics::histogram!("allmond_sentiment_item_latency_us")
                    .record(start.elapsed().as_micros() as f64);

                match outcome {
                    Ok((sentiment, confidence)) => {
                        metrics::counter!("allmond_sentiment_items_total", "sentiment" => sentiment.as_str())
                            .increment(1);
                        ClassificationResult::new(text.as_str(), sentiment, confidence)
                    }
                    Err(e) => {
                        tracing::warn!("Inference failed for item {}: {}", index, e);
                        metrics::counter!("allmond_sentiment_items_total", "sentiment" => Sentiment::Error.as_str())
                            .increment(1);
                        metrics::counter!("allmond_sentiment_item_errors_total").increment(1);
                        ClassificationResult::error(text.as_str())
                    }
                }
            })
            .collect();

        tracing::debug!("Classified {} texts", results.len());

        Ok(results)
    }
}

/// Tokenize, run the model, and pick the most probable label for one text
fn classify_one(
    tokenizer: &Tokenizer,
    model: &dyn SequenceClassifier,
    device: &Device,
    label_map: &allmond_core::LabelMap,
    text: &str,
) -> Result<(Sentiment, f32)> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| allmond_core::Error::inference(format!("Tokenization failed: {}", e)))?;

    let ids = encoding.get_ids();
    if ids.is_empty() {
        return Err(allmond_core::Error::inference("Tokenizer produced no tokens"));
    }
    let seq_len = ids.len();

    let input_ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    let input_ids = Tensor::from_vec(input_ids, (1, seq_len), device)
        .map_err(|e| allmond_core::Error::inference(format!("Failed to create input tensor: {}", e)))?;

    // DistilBERT masks positions where the mask is 1, the inverse of the tokenizer's convention
    let padding_mask: Vec<u8> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| if m == 0 { 1 } else { 0 })
        .collect();
    let padding_mask = Tensor::from_vec(padding_mask, (1, seq_len), device)
        .map_err(|e| allmond_core::Error::inference(format!("Failed to create mask tensor: {}", e)))?;

    let logits = model
        .forward(&input_ids, &padding_mask)
        .map_err(|e| allmond_core::Error::inference(format!("Forward pass failed: {}", e)))?;

    let probabilities = candle_nn::ops::softmax(&logits, D::Minus1)
        .and_then(|p| p.squeeze(0))
        .and_then(|p| p.to_dtype(DType::F32))
        .and_then(|p| p.to_vec1::<f32>())
        .map_err(|e| allmond_core::Error::inference(format!("Softmax failed: {}", e)))?;

    let (index, confidence) = top_class(&probabilities).ok_or_else(|| {
        allmond_core::Error::inference(format!(
            "Model produced invalid probabilities: {:?}",
            probabilities
        ))
    })?;

    let sentiment = label_map.sentiment(index).ok_or_else(|| {
        allmond_core::Error::inference(format!("Class index {} has no label", index))
    })?;

    Ok((sentiment, confidence))
}

/// Index and value of the largest probability; the first one wins ties.
///
/// `None` for an empty slice or any non-finite value.
pub fn top_class(probabilities: &[f32]) -> Option<(usize, f32)> {
    if probabilities.iter().any(|p| !p.is_finite()) {
        return None;
    }

    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((i, p)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_top_class_picks_maximum() {
        assert_eq!(top_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(top_class(&[0.9, 0.05, 0.05]), Some((0, 0.9)));
    }

    #[test]
    fn test_top_class_ties_go_to_lowest_index() {
        assert_eq!(top_class(&[0.4, 0.2, 0.4]), Some((0, 0.4)));
    }

    #[test]
    fn test_top_class_rejects_nan_and_empty() {
        assert_eq!(top_class(&[]), None);
        assert_eq!(top_class(&[0.5, f32::NAN, 0.5]), None);
        assert_eq!(top_class(&[f32::INFINITY, 0.0, 0.0]), None);
    }

    #[test]
    fn test_unloaded_handle_is_unavailable() {
        let pipeline = SentimentPipeline::new(Arc::new(ModelHandle::unloaded("no weights")));
        let err = pipeline.analyze(&["Great phone".to_string()]).unwrap_err();
        assert!(matches!(err, allmond_core::Error::ServiceUnavailable(_)));
    }

    proptest! {
        #[test]
        fn prop_softmax_confidence_is_a_probability(logits in proptest::collection::vec(-50.0f32..50.0, 3)) {
            let tensor = Tensor::new(&[[logits[0], logits[1], logits[2]]], &Device::Cpu).unwrap();
            let probs: Vec<f32> = candle_nn::ops::softmax(&tensor, D::Minus1)
                .unwrap()
                .squeeze(0)
                .unwrap()
                .to_vec1()
                .unwrap();

            let (index, confidence) = top_class(&probs).unwrap();
            prop_assert!(index < 3);
            prop_assert!(confidence >= 1.0 / 3.0 - 1e-6);
            prop_assert!(confidence <= 1.0);
            prop_assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }
}
