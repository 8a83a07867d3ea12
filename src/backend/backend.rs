use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;

use super::cpu::CpuBackend;

/// A trait for the tensor operation primitives the encoder forward pass
/// needs. Implementations work on `&[f32]` slices with explicit dimensions.
pub trait Backend: Send + Sync + Debug {
    /// Human-readable identifier of the compute device backing this
    /// implementation, e.g. "cpu (8 threads)".
    fn device(&self) -> String;

    /// Perform matrix multiplication C = A * B
    ///
    /// # Parameters
    /// * `a` - Input matrix A with shape (m, k)
    /// * `b` - Input matrix B with shape (k, n)
    /// * `c` - Output matrix C with shape (m, n)
    /// * `m` - Number of rows in A and C
    /// * `n` - Number of columns in B and C
    /// * `k` - Number of columns in A and rows in B
    /// * `transpose_a` - Whether to transpose matrix A
    /// * `transpose_b` - Whether to transpose matrix B
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
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Adds a bias vector to every row of a row-major (rows, cols) matrix,
    /// in place.
    fn add_bias(
        &self,
        x: &mut [f32],
        bias: &[f32],
        rows: usize,
        cols: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Apply layer normalization over the last dimension of a row-major
    /// (size, hidden_size) tensor.
    fn layer_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        bias: &[f32],
        output: &mut [f32],
        size: usize,
        hidden_size: usize,
        eps: f32,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Applies the Gaussian Error Linear Unit activation in place.
    /// gelu(x) = 0.5 * x * (1 + erf(x / sqrt(2)))
    fn gelu(&self, x: &mut [f32]) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Applies the hyperbolic tangent in place.
    fn tanh(&self, x: &mut [f32]) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Applies softmax independently to every row of a row-major
    /// (rows, cols) tensor, in place.
    fn softmax_rows(
        &self,
        x: &mut [f32],
        rows: usize,
        cols: usize,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

// Factory function to create a backend based on available hardware
pub fn create_backend() -> Arc<Box<dyn Backend>> {
    // In the future, this can check for available hardware and select the
    // best backend. For now, only the CPU backend is available.
    Arc::new(Box::new(CpuBackend::new()))
}
