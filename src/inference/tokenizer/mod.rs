//! Byte-level BPE tokenizer for RoBERTa-style vocabularies.
//!
//! Loads `vocab.json` and `merges.txt` from the model directory and encodes
//! raw text into the id sequence the encoder expects: a `<s>` token, at most
//! `max_length - 2` content tokens, and a `</s>` token.

mod utilities;

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fs;
use std::path::Path;
use tracing::info;

use utilities::{BYTES_TO_UNICODE, PATTERN};

/// Special token ids resolved from the vocabulary at load time
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Beginning-of-sequence token id (`<s>`)
    pub bos_token_id: u32,
    /// End-of-sequence token id (`</s>`)
    pub eos_token_id: u32,
    /// Padding token id (`<pad>`)
    pub pad_token_id: u32,
    /// Unknown token id (`<unk>`)
    pub unk_token_id: u32,
}

/// A byte-level BPE tokenizer
pub struct Tokenizer {
    vocabulary: BTreeMap<String, u32>,
    merge_ranks: HashMap<(String, String), usize>,
    config: TokenizerConfig,
}

impl Tokenizer {
    /// Loads the tokenizer from a model directory containing `vocab.json`
    /// and `merges.txt`.
    pub fn load(model_dir: &Path) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let vocab_path = model_dir.join("vocab.json");
        let merges_path = model_dir.join("merges.txt");

        let vocab_content = fs::read_to_string(&vocab_path)
            .map_err(|e| format!("Failed to read {}: {}", vocab_path.display(), e))?;
        let vocabulary: BTreeMap<String, u32> = serde_json::from_str(&vocab_content)
            .map_err(|e| format!("Failed to parse {}: {}", vocab_path.display(), e))?;

        let merges_content = fs::read_to_string(&merges_path)
            .map_err(|e| format!("Failed to read {}: {}", merges_path.display(), e))?;

        // One merge per line, "left right", ordered by priority. The first
        // line is a "#version" comment in the standard export.
        let mut merges = Vec::new();
        for line in merges_content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((first, second)) = line.split_once(' ') {
                merges.push((first.to_string(), second.to_string()));
            }
        }

        if merges.is_empty() {
            return Err(format!("No BPE merges found in {}", merges_path.display()).into());
        }

        let tokenizer = Self::from_parts(vocabulary, merges)?;
        info!("Loaded tokenizer: {} vocabulary entries, {} merges",
              tokenizer.vocabulary.len(), tokenizer.merge_ranks.len());

        Ok(tokenizer)
    }

    /// Builds a tokenizer from an in-memory vocabulary and merge list.
    /// The special tokens must all be present in the vocabulary.
    pub fn from_parts(
        vocabulary: BTreeMap<String, u32>,
        merges: Vec<(String, String)>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let special = |token: &str| -> Result<u32, Box<dyn Error + Send + Sync>> {
            vocabulary.get(token)
                .copied()
                .ok_or_else(|| format!("Vocabulary is missing the {} special token", token).into())
        };

        let config = TokenizerConfig {
            bos_token_id: special("<s>")?,
            eos_token_id: special("</s>")?,
            pad_token_id: special("<pad>")?,
            unk_token_id: special("<unk>")?,
        };

        // Earlier merges take priority during encoding
        let merge_ranks: HashMap<(String, String), usize> = merges
            .into_iter()
            .enumerate()
            .map(|(rank, pair)| (pair, rank))
            .collect();

        Ok(Self {
            vocabulary,
            merge_ranks,
            config,
        })
    }

    /// Returns the resolved special token ids
    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Number of entries in the vocabulary
    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Encodes text into token ids, truncated to `max_length` ids overall
    /// and wrapped in `<s>`/`</s>`.
    ///
    /// Empty input yields exactly `[bos, eos]`. Text whose encoding exceeds
    /// the limit is truncated, never rejected.
    pub fn encode(&self, text: &str, max_length: usize) -> Result<Vec<u32>, Box<dyn Error + Send + Sync>> {
        let content_budget = max_length.saturating_sub(2);
        let mut content = Vec::new();

        // Split text into pieces using the regex, then BPE-encode each piece
        'pieces: for piece in PATTERN.find_iter(text) {
            // Convert the piece's bytes to their unicode stand-ins
            let mapped: String = piece.as_str()
                .as_bytes()
                .iter()
                .map(|b| BYTES_TO_UNICODE[b])
                .collect();

            for part in self.bpe(&mapped) {
                if content.len() == content_budget {
                    break 'pieces;
                }
                let id = self.vocabulary.get(&part)
                    .copied()
                    .unwrap_or(self.config.unk_token_id);
                content.push(id);
            }
        }

        let mut tokens = Vec::with_capacity(content.len() + 2);
        tokens.push(self.config.bos_token_id);
        tokens.extend(content);
        tokens.push(self.config.eos_token_id);

        Ok(tokens)
    }

    /// Applies BPE merges to one pre-tokenized piece and returns the final
    /// subword strings.
    fn bpe(&self, piece: &str) -> Vec<String> {
        // Start with individual characters
        let mut parts: Vec<String> = piece.chars().map(|c| c.to_string()).collect();

        // Keep applying the lowest-ranked merge until none applies
        while parts.len() > 1 {
            let mut best: Option<(usize, usize)> = None;

            for i in 0..parts.len() - 1 {
                let pair = (parts[i].clone(), parts[i + 1].clone());
                if let Some(&rank) = self.merge_ranks.get(&pair) {
                    if best.map_or(true, |(_, best_rank)| rank < best_rank) {
                        best = Some((i, rank));
                    }
                }
            }

            let Some((_, best_rank)) = best else {
                break;
            };

            // Merge every adjacent occurrence of the winning pair
            let mut merged = Vec::with_capacity(parts.len());
            let mut i = 0;
            while i < parts.len() {
                if i + 1 < parts.len()
                    && self.merge_ranks.get(&(parts[i].clone(), parts[i + 1].clone()))
                        == Some(&best_rank)
                {
                    merged.push(format!("{}{}", parts[i], parts[i + 1]));
                    i += 2;
                } else {
                    merged.push(parts[i].clone());
                    i += 1;
                }
            }
            parts = merged;
        }

        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a tokenizer over a tiny synthetic vocabulary
    fn create_test_tokenizer() -> Tokenizer {
        let tokens = vec![
            "<s>", "<pad>", "</s>", "<unk>",
            "h", "e", "l", "o", "w", "r", "d", "\u{0120}",
            "he", "hel", "hell", "hello",
            "\u{0120}w", "\u{0120}wo", "\u{0120}wor", "\u{0120}worl", "\u{0120}world",
        ];
        let vocabulary: BTreeMap<String, u32> = tokens
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();

        let merges = vec![
            ("h", "e"), ("he", "l"), ("hel", "l"), ("hell", "o"),
            ("\u{0120}", "w"), ("\u{0120}w", "o"), ("\u{0120}wo", "r"),
            ("\u{0120}wor", "l"), ("\u{0120}worl", "d"),
        ];
        let merges = merges
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();

        Tokenizer::from_parts(vocabulary, merges).unwrap()
    }

    #[test]
    fn test_basic_encoding() {
        let tokenizer = create_test_tokenizer();

        let tokens = tokenizer.encode("hello world", 512).unwrap();

        let hello = tokenizer.vocabulary["hello"];
        let world = tokenizer.vocabulary["\u{0120}world"];
        assert_eq!(tokens, vec![
            tokenizer.config.bos_token_id,
            hello,
            world,
            tokenizer.config.eos_token_id,
        ]);
    }

    #[test]
    fn test_empty_input_is_just_special_tokens() {
        let tokenizer = create_test_tokenizer();

        let tokens = tokenizer.encode("", 512).unwrap();
        assert_eq!(tokens, vec![
            tokenizer.config.bos_token_id,
            tokenizer.config.eos_token_id,
        ]);
    }

    #[test]
    fn test_unknown_characters_fall_back_to_unk() {
        let tokenizer = create_test_tokenizer();

        let tokens = tokenizer.encode("z", 512).unwrap();
        assert_eq!(tokens, vec![
            tokenizer.config.bos_token_id,
            tokenizer.config.unk_token_id,
            tokenizer.config.eos_token_id,
        ]);
    }

    #[test]
    fn test_truncation_respects_max_length() {
        let tokenizer = create_test_tokenizer();

        let text = "hello world hello world hello world";
        let tokens = tokenizer.encode(text, 4).unwrap();

        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], tokenizer.config.bos_token_id);
        assert_eq!(tokens[3], tokenizer.config.eos_token_id);
    }

    #[test]
    fn test_truncated_encoding_is_prefix_of_full_encoding() {
        let tokenizer = create_test_tokenizer();

        let text = "hello world hello world";
        let full = tokenizer.encode(text, 512).unwrap();
        let truncated = tokenizer.encode(text, 4).unwrap();

        // Content tokens of the truncated encoding are a prefix of the full one
        assert_eq!(truncated[1..3], full[1..3]);
    }

    #[test]
    fn test_determinism() {
        let tokenizer = create_test_tokenizer();

        let first = tokenizer.encode("hello world", 512).unwrap();
        let second = tokenizer.encode("hello world", 512).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_special_token_is_an_error() {
        let vocabulary: BTreeMap<String, u32> =
            [("<s>".to_string(), 0u32)].into_iter().collect();
        let merges = vec![("a".to_string(), "b".to_string())];

        assert!(Tokenizer::from_parts(vocabulary, merges).is_err());
    }
}
