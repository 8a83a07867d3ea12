use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{create_backend, Backend};
use super::model::{forward, Model};
use super::tokenizer::Tokenizer;

/// A classification result: the winning label and its softmax probability,
/// rounded to 4 decimal places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: String,
    pub confidence: f32,
}

/// Behavior the HTTP layer depends on. The concrete engine implements it;
/// tests substitute a stub.
pub trait NewsClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Prediction, Box<dyn Error + Send + Sync>>;
}

/// The classification engine.
///
/// Owns the loaded model, tokenizer and compute backend. Everything is
/// read-only after `load` returns, so one instance serves all concurrent
/// requests without locking.
pub struct ClassifierEngine {
    model: Model,
    tokenizer: Tokenizer,
    backend: Arc<Box<dyn Backend>>,
    max_sequence_length: usize,
    loaded_at: DateTime<Utc>,
}

impl ClassifierEngine {
    /// Loads the model and tokenizer from the given directory and runs a
    /// verification pass.
    ///
    /// Any failure here is fatal for the process: the server must not start
    /// serving without a working engine.
    pub fn load(model_dir: &Path, max_sequence_length: usize) -> Result<Self, Box<dyn Error + Send + Sync>> {
        // Select the compute device first so load-time diagnostics can name it
        let backend = create_backend();
        info!("Selected compute device: {}", backend.device());

        info!("Loading model from: {}", model_dir.display());
        let model = Model::load(model_dir)?;
        let tokenizer = Tokenizer::load(model_dir)?;

        if tokenizer.vocab_size() != model.config.vocab_size {
            // Some exports carry added tokens in the embedding table only
            warn!("Tokenizer vocabulary has {} entries but the model configuration declares {}",
                  tokenizer.vocab_size(), model.config.vocab_size);
        }

        let engine = Self {
            model,
            tokenizer,
            backend,
            max_sequence_length,
            loaded_at: Utc::now(),
        };

        // Run a short input through the whole stack to confirm the loaded
        // weights actually produce a distribution
        let verification = engine.classify("This is a test")?;
        info!("Model verification prediction: {} ({:.4})",
              verification.prediction, verification.confidence);

        info!("Engine ready: architecture {}, labels [{}], device {}",
              engine.model.config.architecture_name(),
              engine.model.labels.join(", "),
              engine.backend.device());

        Ok(engine)
    }

    /// Builds an engine from already-constructed parts. Used by tests that
    /// assemble a small synthetic model.
    pub fn from_parts(
        model: Model,
        tokenizer: Tokenizer,
        backend: Arc<Box<dyn Backend>>,
        max_sequence_length: usize,
    ) -> Self {
        Self {
            model,
            tokenizer,
            backend,
            max_sequence_length,
            loaded_at: Utc::now(),
        }
    }

    /// Label names ordered by class index
    pub fn labels(&self) -> &[String] {
        &self.model.labels
    }

    /// Identifier of the selected compute device
    pub fn device(&self) -> String {
        self.backend.device()
    }

    /// When the engine finished loading
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl NewsClassifier for ClassifierEngine {
    /// Classifies one text: tokenize, forward pass, softmax over the label
    /// dimension, argmax.
    fn classify(&self, text: &str) -> Result<Prediction, Box<dyn Error + Send + Sync>> {
        let tokens = self.tokenizer.encode(text, self.max_sequence_length)?;
        debug!("Encoded {} characters into {} tokens", text.len(), tokens.len());

        let mut logits = forward(&self.model, &**self.backend, &tokens)?;

        // Turn logits into a probability distribution over the labels
        let num_labels = self.model.labels.len();
        self.backend.softmax_rows(&mut logits, 1, num_labels)?;

        // Take the highest-probability class
        let (predicted_class, confidence) = logits.iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or("Model produced no logits")?;

        debug!("Probabilities: {:?}, predicted class {}", logits, predicted_class);

        Ok(Prediction {
            prediction: self.model.labels[predicted_class].clone(),
            confidence: round_confidence(confidence),
        })
    }
}

/// Rounds a probability to 4 decimal places
fn round_confidence(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.87654321), 0.8765);
        assert_eq!(round_confidence(0.99995), 1.0);
        assert_eq!(round_confidence(0.5), 0.5);
        assert_eq!(round_confidence(0.0), 0.0);
    }
}
