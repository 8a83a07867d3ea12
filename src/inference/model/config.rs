use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use serde::Deserialize;
use tracing::info;

/// Model hyperparameters and label mapping, deserialized from the
/// `config.json` exported alongside the checkpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Architecture names recorded by the exporter
    /// (e.g. ["RobertaForSequenceClassification"])
    #[serde(default)]
    pub architectures: Vec<String>,
    /// Hidden state width
    pub hidden_size: usize,
    /// Feed-forward inner width
    pub intermediate_size: usize,
    /// Number of attention heads per layer
    pub num_attention_heads: usize,
    /// Number of transformer layers
    pub num_hidden_layers: usize,
    /// Size of the position embedding table
    pub max_position_embeddings: usize,
    /// Size of the token-type embedding table
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Epsilon used by every layer normalization
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f32,
    /// Id of the padding token; position numbering starts after it
    #[serde(default = "default_pad_token_id")]
    pub pad_token_id: u32,
    /// Class index to label name mapping
    #[serde(default)]
    pub id2label: BTreeMap<String, String>,
}

fn default_type_vocab_size() -> usize {
    1
}

fn default_layer_norm_eps() -> f32 {
    1e-5
}

fn default_pad_token_id() -> u32 {
    1
}

impl ModelConfig {
    /// Loads and validates the configuration from `config.json` in the
    /// model directory.
    pub fn load(model_dir: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config_path = model_dir.join("config.json");
        let content = fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;

        let config: ModelConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

        config.validate()?;

        info!("Loaded model configuration: architecture {}, {} labels, {} layers, hidden size {}",
              config.architecture_name(), config.id2label.len(),
              config.num_hidden_layers, config.hidden_size);

        Ok(config)
    }

    /// Validates hyperparameter consistency and the label mapping
    pub fn validate(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.hidden_size == 0 || self.num_hidden_layers == 0 {
            return Err("Model configuration has zero hidden size or layer count".into());
        }

        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(format!(
                "Hidden size {} is not divisible by attention head count {}",
                self.hidden_size, self.num_attention_heads
            ).into());
        }

        // The label set must be declared by the checkpoint itself; a
        // hardcoded list could silently disagree with the training order.
        if self.id2label.is_empty() {
            return Err("Model configuration declares no id2label mapping".into());
        }
        self.labels()?;

        Ok(())
    }

    /// Returns the label names ordered by class index.
    ///
    /// The `id2label` keys must form a contiguous range starting at 0, so
    /// that index `i` of the returned list is the label of logit `i`.
    pub fn labels(&self) -> Result<Vec<String>, Box<dyn Error + Send + Sync>> {
        let mut indexed = Vec::with_capacity(self.id2label.len());
        for (key, label) in &self.id2label {
            let index: usize = key.parse()
                .map_err(|_| format!("id2label key '{}' is not a class index", key))?;
            indexed.push((index, label.clone()));
        }
        indexed.sort_by_key(|(index, _)| *index);

        for (position, (index, _)) in indexed.iter().enumerate() {
            if position != *index {
                return Err(format!(
                    "id2label indices are not contiguous from 0: missing index {}",
                    position
                ).into());
            }
        }

        Ok(indexed.into_iter().map(|(_, label)| label).collect())
    }

    /// Number of output classes
    pub fn num_labels(&self) -> usize {
        self.id2label.len()
    }

    /// Width of a single attention head
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// The exporter-recorded architecture name, or "unknown"
    pub fn architecture_name(&self) -> &str {
        self.architectures.first().map(|s| s.as_str()).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config_json() -> serde_json::Value {
        serde_json::json!({
            "architectures": ["RobertaForSequenceClassification"],
            "hidden_size": 768,
            "intermediate_size": 3072,
            "num_attention_heads": 12,
            "num_hidden_layers": 12,
            "max_position_embeddings": 514,
            "type_vocab_size": 1,
            "vocab_size": 50265,
            "layer_norm_eps": 1e-5,
            "pad_token_id": 1,
            "id2label": {"0": "fake", "1": "real"}
        })
    }

    #[test]
    fn test_labels_ordered_by_index() {
        let config: ModelConfig = serde_json::from_value(base_config_json()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.labels().unwrap(), vec!["fake", "real"]);
        assert_eq!(config.num_labels(), 2);
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.architecture_name(), "RobertaForSequenceClassification");
    }

    #[test]
    fn test_labels_sorted_numerically_not_lexically() {
        let mut json = base_config_json();
        json["id2label"] = serde_json::json!({
            "0": "a", "1": "b", "2": "c", "3": "d", "4": "e",
            "5": "f", "6": "g", "7": "h", "8": "i", "9": "j", "10": "k"
        });
        let config: ModelConfig = serde_json::from_value(json).unwrap();

        // Lexical ordering would put "10" after "1"
        assert_eq!(config.labels().unwrap()[10], "k");
    }

    #[test]
    fn test_missing_labels_rejected() {
        let mut json = base_config_json();
        json["id2label"] = serde_json::json!({});
        let config: ModelConfig = serde_json::from_value(json).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_contiguous_labels_rejected() {
        let mut json = base_config_json();
        json["id2label"] = serde_json::json!({"0": "fake", "2": "real"});
        let config: ModelConfig = serde_json::from_value(json).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_indivisible_head_count_rejected() {
        let mut json = base_config_json();
        json["num_attention_heads"] = serde_json::json!(7);
        let config: ModelConfig = serde_json::from_value(json).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_applied() {
        let mut json = base_config_json();
        json.as_object_mut().unwrap().remove("layer_norm_eps");
        json.as_object_mut().unwrap().remove("pad_token_id");
        json.as_object_mut().unwrap().remove("type_vocab_size");
        let config: ModelConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.layer_norm_eps, 1e-5);
        assert_eq!(config.pad_token_id, 1);
        assert_eq!(config.type_vocab_size, 1);
    }
}
