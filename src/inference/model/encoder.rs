use std::error::Error;
use rayon::prelude::*;

use crate::backend::Backend;
use super::model::{EncoderLayer, Linear, LayerNormWeights, Model};

/// Runs the full forward pass for one token sequence and returns the raw
/// per-label logits.
///
/// The sequence is processed as a single unpadded batch: embeddings,
/// `num_hidden_layers` transformer layers with bidirectional self-attention,
/// then the classification head over the first position.
pub fn forward(
    model: &Model,
    backend: &dyn Backend,
    token_ids: &[u32],
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    if token_ids.is_empty() {
        return Err("Cannot run a forward pass over an empty token sequence".into());
    }

    let seq_len = token_ids.len();
    let mut hidden = embed(model, backend, token_ids)?;

    for layer in &model.layers {
        hidden = encoder_layer(model, backend, layer, &hidden, seq_len)?;
    }

    classification_head(model, backend, &hidden)
}

/// Looks up word, position and token-type embeddings and applies the
/// embedding layer normalization.
fn embed(
    model: &Model,
    backend: &dyn Backend,
    token_ids: &[u32],
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let config = &model.config;
    let hidden_size = config.hidden_size;
    let seq_len = token_ids.len();

    // Positions are numbered from pad_token_id + 1, leaving the padding
    // position unused, as the checkpoint's position table expects.
    let position_offset = config.pad_token_id as usize + 1;
    if position_offset + seq_len > config.max_position_embeddings {
        return Err(format!(
            "Sequence of {} tokens exceeds the position table ({} entries)",
            seq_len, config.max_position_embeddings
        ).into());
    }

    let mut embeddings = vec![0.0f32; seq_len * hidden_size];

    for (i, &token_id) in token_ids.iter().enumerate() {
        let token_id = token_id as usize;

        // Check token ID is within range
        if token_id >= config.vocab_size {
            return Err(format!(
                "Token ID {} is out of range (max: {})",
                token_id, config.vocab_size - 1
            ).into());
        }

        let word = &model.embeddings.word[token_id * hidden_size..(token_id + 1) * hidden_size];
        let position_id = position_offset + i;
        let position = &model.embeddings.position[position_id * hidden_size..(position_id + 1) * hidden_size];
        // Single-segment input always uses token type 0
        let token_type = &model.embeddings.token_type[..hidden_size];

        let row = &mut embeddings[i * hidden_size..(i + 1) * hidden_size];
        for j in 0..hidden_size {
            row[j] = word[j] + position[j] + token_type[j];
        }
    }

    layer_norm(backend, &embeddings, &model.embeddings.norm, seq_len, hidden_size,
               config.layer_norm_eps)
}

/// One transformer layer: self-attention with residual + LayerNorm,
/// then the feed-forward block with residual + LayerNorm.
fn encoder_layer(
    model: &Model,
    backend: &dyn Backend,
    layer: &EncoderLayer,
    hidden: &[f32],
    seq_len: usize,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let config = &model.config;
    let hidden_size = config.hidden_size;

    // Self-attention
    let attended = self_attention(config.num_attention_heads, config.head_dim(),
                                  backend, layer, hidden, seq_len)?;
    let projected = linear(backend, &attended, seq_len, &layer.attn_output)?;
    let hidden = layer_norm(backend, &residual(&projected, hidden), &layer.attn_norm,
                            seq_len, hidden_size, config.layer_norm_eps)?;

    // Feed-forward
    let mut inner = linear(backend, &hidden, seq_len, &layer.intermediate)?;
    backend.gelu(&mut inner)?;
    let output = linear(backend, &inner, seq_len, &layer.output)?;

    layer_norm(backend, &residual(&output, &hidden), &layer.output_norm,
               seq_len, hidden_size, config.layer_norm_eps)
}

/// Multi-head bidirectional self-attention over one sequence.
///
/// Heads are independent, so they are computed in parallel with rayon and
/// their context vectors written back into a (seq_len, hidden_size) buffer.
fn self_attention(
    num_heads: usize,
    head_dim: usize,
    backend: &dyn Backend,
    layer: &EncoderLayer,
    hidden: &[f32],
    seq_len: usize,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let hidden_size = num_heads * head_dim;

    let queries = linear(backend, hidden, seq_len, &layer.query)?;
    let keys = linear(backend, hidden, seq_len, &layer.key)?;
    let values = linear(backend, hidden, seq_len, &layer.value)?;

    let scale = 1.0 / (head_dim as f32).sqrt();

    let head_contexts: Vec<Vec<f32>> = (0..num_heads)
        .into_par_iter()
        .map(|head| -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
            // Slice this head's columns out of the packed projections
            let q = extract_head(&queries, seq_len, hidden_size, head, head_dim);
            let k = extract_head(&keys, seq_len, hidden_size, head, head_dim);
            let v = extract_head(&values, seq_len, hidden_size, head, head_dim);

            // Attention scores: (seq_len, seq_len) = Q * K^T, scaled
            let mut scores = vec![0.0f32; seq_len * seq_len];
            backend.matmul(&q, &k, &mut scores, seq_len, seq_len, head_dim, false, true)?;
            for score in scores.iter_mut() {
                *score *= scale;
            }

            // No mask: attention is bidirectional and the sequence carries
            // no padding positions
            backend.softmax_rows(&mut scores, seq_len, seq_len)?;

            // Context: (seq_len, head_dim) = scores * V
            let mut context = vec![0.0f32; seq_len * head_dim];
            backend.matmul(&scores, &v, &mut context, seq_len, head_dim, seq_len, false, false)?;

            Ok(context)
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Re-interleave the per-head contexts into (seq_len, hidden_size)
    let mut attended = vec![0.0f32; seq_len * hidden_size];
    for (head, context) in head_contexts.iter().enumerate() {
        for i in 0..seq_len {
            let src = &context[i * head_dim..(i + 1) * head_dim];
            let dst_start = i * hidden_size + head * head_dim;
            attended[dst_start..dst_start + head_dim].copy_from_slice(src);
        }
    }

    Ok(attended)
}

/// Classification head: dense + tanh over the first (`<s>`) position,
/// then a projection to one logit per label.
fn classification_head(
    model: &Model,
    backend: &dyn Backend,
    hidden: &[f32],
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let hidden_size = model.config.hidden_size;
    let first_position = &hidden[..hidden_size];

    let mut pooled = linear(backend, first_position, 1, &model.head.dense)?;
    backend.tanh(&mut pooled)?;

    linear(backend, &pooled, 1, &model.head.out_proj)
}

/// Applies a dense projection to a (rows, in_dim) input.
///
/// Checkpoint weights are stored (out_dim, in_dim), so the matmul runs
/// against the transpose.
fn linear(
    backend: &dyn Backend,
    x: &[f32],
    rows: usize,
    projection: &Linear,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let mut output = vec![0.0f32; rows * projection.out_dim];
    backend.matmul(x, &projection.weight, &mut output,
                   rows, projection.out_dim, projection.in_dim, false, true)?;
    backend.add_bias(&mut output, &projection.bias, rows, projection.out_dim)?;
    Ok(output)
}

/// Element-wise sum of a sublayer output and its residual input
fn residual(output: &[f32], input: &[f32]) -> Vec<f32> {
    output.iter().zip(input.iter()).map(|(&o, &i)| o + i).collect()
}

/// Applies layer normalization, returning a new buffer
fn layer_norm(
    backend: &dyn Backend,
    x: &[f32],
    norm: &LayerNormWeights,
    size: usize,
    hidden_size: usize,
    eps: f32,
) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
    let mut output = vec![0.0f32; x.len()];
    backend.layer_norm(x, &norm.weight, &norm.bias, &mut output, size, hidden_size, eps)?;
    Ok(output)
}

/// Copies one head's columns out of a packed (seq_len, hidden_size)
/// projection into a contiguous (seq_len, head_dim) buffer.
fn extract_head(
    packed: &[f32],
    seq_len: usize,
    hidden_size: usize,
    head: usize,
    head_dim: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(seq_len * head_dim);
    for i in 0..seq_len {
        let start = i * hidden_size + head * head_dim;
        out.extend_from_slice(&packed[start..start + head_dim]);
    }
    out
}
