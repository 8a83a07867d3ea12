mod reader;
mod types;
mod utils;

// Re-export from types
pub use types::{Dtype, SafeTensorsError, TensorInfo};
// Re-export from reader
pub use reader::SafeTensorsReader;
// Re-export from utils
pub use utils::is_safetensors_file;
