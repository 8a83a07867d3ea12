use std::error::Error;
use std::path::Path;
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::safetensors::SafeTensorsReader;
use super::config::ModelConfig;

/// A dense projection with weights stored row-major as
/// (out_dim, in_dim), matching the checkpoint layout.
pub struct Linear {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub in_dim: usize,
    pub out_dim: usize,
}

/// Scale and shift parameters of one layer normalization
pub struct LayerNormWeights {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Input embedding tables and their normalization
pub struct Embeddings {
    /// (vocab_size, hidden_size)
    pub word: Vec<f32>,
    /// (max_position_embeddings, hidden_size)
    pub position: Vec<f32>,
    /// (type_vocab_size, hidden_size)
    pub token_type: Vec<f32>,
    pub norm: LayerNormWeights,
}

/// Weights of one transformer encoder layer
pub struct EncoderLayer {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub attn_output: Linear,
    pub attn_norm: LayerNormWeights,
    pub intermediate: Linear,
    pub output: Linear,
    pub output_norm: LayerNormWeights,
}

/// Sequence classification head: dense + tanh over the first position,
/// then a projection to one logit per label
pub struct ClassificationHead {
    pub dense: Linear,
    pub out_proj: Linear,
}

/// A fully materialized sequence-classification model.
///
/// All weights are plain f32 buffers assembled at load time; nothing is
/// mutated afterwards, so the model can be shared freely across request
/// handlers.
pub struct Model {
    /// Hyperparameters from config.json
    pub config: ModelConfig,
    /// Label names ordered by class index
    pub labels: Vec<String>,
    /// When the model was loaded
    pub loaded_at: DateTime<Utc>,
    pub embeddings: Embeddings,
    pub layers: Vec<EncoderLayer>,
    pub head: ClassificationHead,
}

/// Tensor name prefixes used by the checkpoint exporters this loader
/// understands. Tried in order.
const NAME_PREFIXES: [&str; 3] = ["roberta.", "bert.", ""];

impl Model {
    /// Loads the model from a directory containing `config.json` and
    /// `model.safetensors`.
    ///
    /// Every tensor is checked against the configured shape; a missing or
    /// mis-shaped tensor fails the load.
    pub fn load(model_dir: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        // Step 1: Parse and validate the configuration
        let config = ModelConfig::load(model_dir)?;
        let labels = config.labels()?;

        // Step 2: Open the checkpoint
        let weights_path = model_dir.join("model.safetensors");
        let reader = SafeTensorsReader::new(&weights_path)?;
        if reader.tensors.is_empty() {
            return Err("Model file contains no tensors".into());
        }
        if let Some(format) = reader.metadata.get("format") {
            info!("Checkpoint format metadata: {}", format);
        }

        // Step 3: Work out the tensor name prefix this export used
        let prefix = detect_prefix(&reader)?;

        // Step 4: Assemble the embedding tables
        let hidden = config.hidden_size;
        let embeddings = Embeddings {
            word: load_matrix(
                &reader,
                &format!("{}embeddings.word_embeddings.weight", prefix),
                config.vocab_size,
                hidden,
            )?,
            position: load_matrix(
                &reader,
                &format!("{}embeddings.position_embeddings.weight", prefix),
                config.max_position_embeddings,
                hidden,
            )?,
            token_type: load_matrix(
                &reader,
                &format!("{}embeddings.token_type_embeddings.weight", prefix),
                config.type_vocab_size,
                hidden,
            )?,
            norm: load_layer_norm(&reader, &format!("{}embeddings.LayerNorm", prefix), hidden)?,
        };

        // Step 5: Assemble the encoder layers
        let pb = ProgressBar::new(config.num_hidden_layers as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} {bar:30} {pos}/{len} {wide_msg}")
                .unwrap()
        );
        pb.set_prefix("Loading encoder layers");

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for layer_idx in 0..config.num_hidden_layers {
            let base = format!("{}encoder.layer.{}", prefix, layer_idx);
            layers.push(EncoderLayer {
                query: load_linear(&reader, &format!("{}.attention.self.query", base), hidden, hidden)?,
                key: load_linear(&reader, &format!("{}.attention.self.key", base), hidden, hidden)?,
                value: load_linear(&reader, &format!("{}.attention.self.value", base), hidden, hidden)?,
                attn_output: load_linear(&reader, &format!("{}.attention.output.dense", base), hidden, hidden)?,
                attn_norm: load_layer_norm(&reader, &format!("{}.attention.output.LayerNorm", base), hidden)?,
                intermediate: load_linear(&reader, &format!("{}.intermediate.dense", base), hidden, config.intermediate_size)?,
                output: load_linear(&reader, &format!("{}.output.dense", base), config.intermediate_size, hidden)?,
                output_norm: load_layer_norm(&reader, &format!("{}.output.LayerNorm", base), hidden)?,
            });
            pb.inc(1);
        }
        pb.finish_with_message("done");

        // Step 6: Assemble the classification head
        let head = ClassificationHead {
            dense: load_linear(&reader, "classifier.dense", hidden, hidden)?,
            out_proj: load_linear(&reader, "classifier.out_proj", hidden, labels.len())?,
        };

        info!("Model loaded from {}: architecture {}, {} labels ({}), {} layers",
              weights_path.display(), config.architecture_name(),
              labels.len(), labels.join(", "), layers.len());

        Ok(Self {
            config,
            labels,
            loaded_at: Utc::now(),
            embeddings,
            layers,
            head,
        })
    }
}

/// Finds which tensor name prefix the checkpoint uses by probing for the
/// word embedding table.
fn detect_prefix(reader: &SafeTensorsReader) -> Result<&'static str, Box<dyn Error + Send + Sync>> {
    for prefix in NAME_PREFIXES {
        let probe = format!("{}embeddings.word_embeddings.weight", prefix);
        if reader.tensors.iter().any(|t| t.name == probe) {
            return Ok(prefix);
        }
    }

    Err("Checkpoint does not contain an embeddings.word_embeddings.weight tensor under any known prefix".into())
}

/// Loads a 2-dimensional tensor and checks its shape
fn load_matrix(
    reader: &SafeTensorsReader,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let (values, shape) = reader.tensor(name)?;
    if shape != [rows, cols] {
        return Err(format!(
            "Tensor '{}' has shape {:?}, expected [{}, {}]",
            name, shape, rows, cols
        ).into());
    }
    Ok(values)
}

/// Loads a 1-dimensional tensor and checks its length
fn load_vector(
    reader: &SafeTensorsReader,
    name: &str,
    len: usize,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let (values, shape) = reader.tensor(name)?;
    if shape != [len] {
        return Err(format!(
            "Tensor '{}' has shape {:?}, expected [{}]",
            name, shape, len
        ).into());
    }
    Ok(values)
}

/// Loads a dense projection's weight and bias.
///
/// Checkpoint weights are stored as (out_dim, in_dim); the forward pass
/// multiplies against the transpose.
fn load_linear(
    reader: &SafeTensorsReader,
    prefix: &str,
    in_dim: usize,
    out_dim: usize,
) -> Result<Linear, Box<dyn Error + Send + Sync>> {
    Ok(Linear {
        weight: load_matrix(reader, &format!("{}.weight", prefix), out_dim, in_dim)?,
        bias: load_vector(reader, &format!("{}.bias", prefix), out_dim)?,
        in_dim,
        out_dim,
    })
}

/// Loads a layer normalization's scale and shift
fn load_layer_norm(
    reader: &SafeTensorsReader,
    prefix: &str,
    dim: usize,
) -> Result<LayerNormWeights, Box<dyn Error + Send + Sync>> {
    Ok(LayerNormWeights {
        weight: load_vector(reader, &format!("{}.weight", prefix), dim)?,
        bias: load_vector(reader, &format!("{}.bias", prefix), dim)?,
    })
}
