use std::error::Error;
use std::fmt;
use ndarray::{Array2, ArrayView1};

use super::super::Backend;

/// CPU backend implementation using ndarray
#[derive(Clone)]
pub struct CpuBackend {
    /// Number of worker threads rayon will use for head-parallel work
    threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend instance.
    pub fn new() -> Self {
        Self {
            threads: rayon::current_num_threads(),
        }
    }
}

impl fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBackend").field("threads", &self.threads).finish()
    }
}

/// Error function approximation (Abramowitz and Stegun 7.1.26),
/// maximum absolute error 1.5e-7
fn erf(x: f32) -> f32 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0 - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
        + 0.254829592)
        * t
        * (-x * x).exp();

    sign * y
}

impl Backend for CpuBackend {
    fn device(&self) -> String {
        format!("cpu ({} threads)", self.threads)
    }

    /// Performs matrix multiplication C = A * B using ndarray.
    fn matmul(
        &self,
        a: &[f32],
        b: &[f32],
        c: &mut [f32],
        m: usize,
        n: usize,
        k: usize,
        transpose_a: bool,
        transpose_b: bool,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        // Create ndarray views of the input data. The stored layout depends
        // on the transpose flags: an input marked transposed is stored as
        // the transpose of its logical shape.
        let a_array = if transpose_a {
            Array2::from_shape_vec((k, m), a.to_vec())?
        } else {
            Array2::from_shape_vec((m, k), a.to_vec())?
        };
        let b_array = if transpose_b {
            Array2::from_shape_vec((n, k), b.to_vec())?
        } else {
            Array2::from_shape_vec((k, n), b.to_vec())?
        };

        let a_view = if transpose_a { a_array.t() } else { a_array.view() };
        let b_view = if transpose_b { b_array.t() } else { b_array.view() };

        // Perform matrix multiplication (this uses BLAS internally if available)
        let result = a_view.dot(&b_view);

        // The product of a transposed view is not contiguous, so copy row by row
        for (row_idx, row) in result.outer_iter().enumerate() {
            for (col_idx, &val) in row.iter().enumerate() {
                c[row_idx * n + col_idx] = val;
            }
        }

        Ok(())
    }

    /// Adds a bias vector to every row of a (rows, cols) matrix in place.
    fn add_bias(
        &self,
        x: &mut [f32],
        bias: &[f32],
        rows: usize,
        cols: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if bias.len() != cols || x.len() != rows * cols {
            return Err(format!(
                "Incompatible shapes for bias addition: x has {} elements, bias has {}, expected ({}, {})",
                x.len(), bias.len(), rows, cols
            ).into());
        }

        let bias_array = ArrayView1::from(bias);
        for row in x.chunks_exact_mut(cols) {
            for (value, &b) in row.iter_mut().zip(bias_array.iter()) {
                *value += b;
            }
        }

        Ok(())
    }

    /// Applies layer normalization to a tensor.
    ///
    /// # Parameters
    /// * `x` - Input tensor
    /// * `weight` - Scale factors for each hidden dimension
    /// * `bias` - Shift values for each hidden dimension
    /// * `output` - Output tensor
    /// * `size` - Number of sequences/rows
    /// * `hidden_size` - Size of hidden dimension
    /// * `eps` - Small constant for numerical stability
    fn layer_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        bias: &[f32],
        output: &mut [f32],
        size: usize,
        hidden_size: usize,
        eps: f32,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if x.len() != size * hidden_size || weight.len() != hidden_size || bias.len() != hidden_size {
            return Err("Incompatible shapes for layer normalization".into());
        }

        // Normalize row by row
        for (row, out_row) in x.chunks_exact(hidden_size).zip(output.chunks_exact_mut(hidden_size)) {
            // Mean and variance over the hidden dimension
            let mean: f32 = row.iter().sum::<f32>() / hidden_size as f32;
            let variance: f32 = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>()
                / hidden_size as f32;
            let norm_factor = 1.0 / (variance + eps).sqrt();

            // Normalize, then scale and shift
            for j in 0..hidden_size {
                out_row[j] = (row[j] - mean) * norm_factor * weight[j] + bias[j];
            }
        }

        Ok(())
    }

    /// Applies GELU activation in place, using the erf formulation.
    fn gelu(&self, x: &mut [f32]) -> Result<(), Box<dyn Error + Send + Sync>> {
        const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

        for value in x.iter_mut() {
            *value = 0.5 * *value * (1.0 + erf(*value * FRAC_1_SQRT_2));
        }

        Ok(())
    }

    /// Applies the hyperbolic tangent in place.
    fn tanh(&self, x: &mut [f32]) -> Result<(), Box<dyn Error + Send + Sync>> {
        for value in x.iter_mut() {
            *value = value.tanh();
        }

        Ok(())
    }

    /// Applies softmax to every row of a (rows, cols) tensor in place.
    fn softmax_rows(
        &self,
        x: &mut [f32],
        rows: usize,
        cols: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if x.len() != rows * cols {
            return Err(format!(
                "Incompatible shape for softmax: {} elements, expected ({}, {})",
                x.len(), rows, cols
            ).into());
        }

        for row in x.chunks_exact_mut(cols) {
            // Subtract the row maximum for numerical stability
            let max_val = row.iter().fold(f32::MIN, |max, &val| max.max(val));

            let mut sum = 0.0;
            for value in row.iter_mut() {
                *value = (*value - max_val).exp();
                sum += *value;
            }

            for value in row.iter_mut() {
                *value /= sum;
            }
        }

        Ok(())
    }
}
