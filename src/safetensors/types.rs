use std::error::Error;
use std::fmt;

/// Tensor element types found in safetensors headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// 32-bit IEEE float, stored as-is
    F32,
    /// 16-bit IEEE float, widened to f32 on load
    F16,
}

impl Dtype {
    /// Parses the dtype string used in safetensors headers
    pub fn from_header_str(s: &str) -> Result<Self, SafeTensorsError> {
        match s {
            "F32" => Ok(Dtype::F32),
            "F16" => Ok(Dtype::F16),
            other => Err(SafeTensorsError::UnsupportedDtype(other.to_string())),
        }
    }

    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F16 => 2,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dtype::F32 => write!(f, "F32"),
            Dtype::F16 => write!(f, "F16"),
        }
    }
}

/// Information about a tensor in the safetensors file
#[derive(Debug, Clone)]
pub struct TensorInfo {
    /// Name of the tensor as it appears in the header
    pub name: String,
    /// Element type
    pub dtype: Dtype,
    /// Size of each dimension
    pub shape: Vec<usize>,
    /// Start and end byte offsets, relative to the data section
    pub data_offsets: (usize, usize),
}

impl TensorInfo {
    /// Total number of elements in the tensor
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of bytes the tensor occupies in the data section
    pub fn byte_len(&self) -> usize {
        self.data_offsets.1 - self.data_offsets.0
    }
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} [{}]", self.name, self.dtype, self.shape.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" x "))
    }
}

/// Custom error types for safetensors operations
#[derive(Debug)]
pub enum SafeTensorsError {
    /// Wraps std::io::Error for file operations
    IoError(std::io::Error),
    /// Invalid format errors with a message
    InvalidFormat(String),
    /// Missing tensor errors
    TensorNotFound(String),
    /// Element types this reader does not handle
    UnsupportedDtype(String),
}

/// Implements Display trait for SafeTensorsError for error reporting
impl fmt::Display for SafeTensorsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SafeTensorsError::IoError(e) => write!(f, "I/O error: {}", e),
            SafeTensorsError::InvalidFormat(msg) => write!(f, "Invalid safetensors format: {}", msg),
            SafeTensorsError::TensorNotFound(name) => write!(f, "Tensor not found: {}", name),
            SafeTensorsError::UnsupportedDtype(dtype) => write!(f, "Unsupported tensor dtype: {}", dtype),
        }
    }
}

/// Implements Error trait to allow SafeTensorsError to be used as a standard error type
impl Error for SafeTensorsError {}

/// Allows automatic conversion from std::io::Error to SafeTensorsError
impl From<std::io::Error> for SafeTensorsError {
    fn from(err: std::io::Error) -> Self {
        SafeTensorsError::IoError(err)
    }
}
