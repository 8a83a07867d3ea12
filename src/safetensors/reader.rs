use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use tracing::{debug, info};

use super::types::{Dtype, SafeTensorsError, TensorInfo};
use super::utils::{f16_to_f32, is_safetensors_file, MAX_HEADER_SIZE};

/// Reader for safetensors checkpoint files.
///
/// The format is an 8-byte little-endian header length, a JSON header that
/// maps tensor names to dtype/shape/offsets, and a raw data section. The
/// whole file is memory-mapped; tensor data is only touched when a tensor
/// is materialized.
pub struct SafeTensorsReader {
    /// Path to the safetensors file
    pub path: PathBuf,
    /// Information about each tensor, sorted by name
    pub tensors: Vec<TensorInfo>,
    /// Free-form metadata from the header's __metadata__ entry
    pub metadata: BTreeMap<String, String>,
    /// Memory-mapped file contents
    data: Mmap,
    /// Byte offset where the data section begins
    data_start: usize,
}

impl SafeTensorsReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = path.as_ref();

        if !is_safetensors_file(path) {
            return Err(Box::new(SafeTensorsError::InvalidFormat(
                format!("{} is not a safetensors file", path.display())
            )));
        }

        let mut file = File::open(path)?;

        // Read the header length
        let header_size = file.read_u64::<LittleEndian>()?;
        if header_size == 0 || header_size > MAX_HEADER_SIZE {
            return Err(Box::new(SafeTensorsError::InvalidFormat(
                format!("Implausible header size: {}", header_size)
            )));
        }

        // Read and parse the JSON header
        let mut header_bytes = vec![0u8; header_size as usize];
        file.seek(SeekFrom::Start(8))?;
        file.read_exact(&mut header_bytes)?;
        let header: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&header_bytes)
            .map_err(|e| SafeTensorsError::InvalidFormat(format!("Header is not valid JSON: {}", e)))?;

        let mut metadata = BTreeMap::new();
        let mut tensors = Vec::new();

        for (name, entry) in &header {
            if name == "__metadata__" {
                // Free-form string map, not a tensor
                if let Some(map) = entry.as_object() {
                    for (key, value) in map {
                        if let Some(s) = value.as_str() {
                            metadata.insert(key.clone(), s.to_string());
                        }
                    }
                }
                continue;
            }

            tensors.push(parse_tensor_entry(name, entry)?);
        }

        debug!("Read safetensors header: {} tensors, {} metadata entries",
               tensors.len(), metadata.len());

        // Memory-map the validated file
        let data = unsafe { Mmap::map(&file)? };
        let data_start = 8 + header_size as usize;

        let reader = Self {
            path: path.to_path_buf(),
            tensors,
            metadata,
            data,
            data_start,
        };

        // Every tensor must fit inside the mapped data section
        reader.validate()?;

        info!("Opened safetensors file {} with {} tensors",
              reader.path.display(), reader.tensors.len());

        Ok(reader)
    }

    /// Checks that every tensor's offsets are consistent with its declared
    /// shape and dtype and stay inside the mapped file.
    fn validate(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let data_len = self.data.len().saturating_sub(self.data_start);

        for tensor in &self.tensors {
            let (start, end) = tensor.data_offsets;
            if start > end {
                return Err(Box::new(SafeTensorsError::InvalidFormat(
                    format!("Tensor '{}' has inverted data offsets", tensor.name)
                )));
            }

            let expected = tensor.element_count() * tensor.dtype.element_size();
            if tensor.byte_len() != expected {
                return Err(Box::new(SafeTensorsError::InvalidFormat(format!(
                    "Tensor '{}' occupies {} bytes but shape {:?} with dtype {} needs {}",
                    tensor.name, tensor.byte_len(), tensor.shape, tensor.dtype, expected
                ))));
            }

            if end > data_len {
                return Err(Box::new(SafeTensorsError::InvalidFormat(format!(
                    "Tensor '{}' extends beyond the data section (end: {}, section size: {})",
                    tensor.name, end, data_len
                ))));
            }
        }

        Ok(())
    }

    /// Looks up tensor information by name
    pub fn tensor_info(&self, name: &str) -> Result<&TensorInfo, Box<dyn Error + Send + Sync>> {
        match self.tensors.iter().find(|t| t.name == name) {
            Some(info) => Ok(info),
            None => Err(Box::new(SafeTensorsError::TensorNotFound(name.to_string()))),
        }
    }

    /// Materializes a tensor as f32 values together with its shape.
    ///
    /// F32 data is copied out of the map directly; F16 data is widened
    /// element by element.
    pub fn tensor(&self, name: &str) -> Result<(Vec<f32>, Vec<usize>), Box<dyn Error + Send + Sync>> {
        let info = self.tensor_info(name)?;
        let start = self.data_start + info.data_offsets.0;
        let end = self.data_start + info.data_offsets.1;
        let bytes = &self.data[start..end];

        let values = match info.dtype {
            Dtype::F32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::F16 => bytes
                .chunks_exact(2)
                .map(|c| f16_to_f32(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
        };

        Ok((values, info.shape.clone()))
    }
}

fn parse_tensor_entry(name: &str, entry: &serde_json::Value) -> Result<TensorInfo, Box<dyn Error + Send + Sync>> {
    let obj = entry.as_object().ok_or_else(|| SafeTensorsError::InvalidFormat(
        format!("Header entry for '{}' is not an object", name)
    ))?;

    let dtype_str = obj.get("dtype")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SafeTensorsError::InvalidFormat(format!("Tensor '{}' has no dtype", name)))?;
    let dtype = Dtype::from_header_str(dtype_str)?;

    let shape: Vec<usize> = obj.get("shape")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SafeTensorsError::InvalidFormat(format!("Tensor '{}' has no shape", name)))?
        .iter()
        .map(|v| v.as_u64().map(|d| d as usize))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SafeTensorsError::InvalidFormat(
            format!("Tensor '{}' has a non-integer dimension", name)
        ))?;

    let offsets = obj.get("data_offsets")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SafeTensorsError::InvalidFormat(
            format!("Tensor '{}' has no data_offsets", name)
        ))?;
    if offsets.len() != 2 {
        return Err(Box::new(SafeTensorsError::InvalidFormat(
            format!("Tensor '{}' has malformed data_offsets", name)
        )));
    }
    let start = offsets[0].as_u64().ok_or_else(|| SafeTensorsError::InvalidFormat(
        format!("Tensor '{}' has a non-integer data offset", name)
    ))? as usize;
    let end = offsets[1].as_u64().ok_or_else(|| SafeTensorsError::InvalidFormat(
        format!("Tensor '{}' has a non-integer data offset", name)
    ))? as usize;

    Ok(TensorInfo {
        name: name.to_string(),
        dtype,
        shape,
        data_offsets: (start, end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds a minimal two-tensor safetensors file on disk
    fn write_fixture(dir: &Path) -> PathBuf {
        let a: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b: Vec<f32> = vec![0.5, -0.5];

        let a_bytes: Vec<u8> = a.iter().flat_map(|v| v.to_le_bytes()).collect();
        let b_bytes: Vec<u8> = b.iter().flat_map(|v| v.to_le_bytes()).collect();

        let header = format!(
            concat!(
                "{{\"a\":{{\"dtype\":\"F32\",\"shape\":[2,3],\"data_offsets\":[0,{}]}},",
                "\"b\":{{\"dtype\":\"F32\",\"shape\":[2],\"data_offsets\":[{},{}]}}}}"
            ),
            a_bytes.len(),
            a_bytes.len(),
            a_bytes.len() + b_bytes.len(),
        );

        let path = dir.join("fixture.safetensors");
        let mut file = File::create(&path).unwrap();
        file.write_all(&(header.len() as u64).to_le_bytes()).unwrap();
        file.write_all(header.as_bytes()).unwrap();
        file.write_all(&a_bytes).unwrap();
        file.write_all(&b_bytes).unwrap();
        path
    }

    #[test]
    fn test_read_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        assert!(is_safetensors_file(&path));

        let reader = SafeTensorsReader::new(&path).unwrap();
        assert_eq!(reader.tensors.len(), 2);

        let (values, shape) = reader.tensor("a").unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let (values, shape) = reader.tensor("b").unwrap();
        assert_eq!(shape, vec![2]);
        assert_eq!(values, vec![0.5, -0.5]);
    }

    #[test]
    fn test_missing_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let reader = SafeTensorsReader::new(&path).unwrap();

        let err = reader.tensor("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        // Chop off the last tensor's data
        let bytes = std::fs::read(&path).unwrap();
        let truncated = dir.path().join("truncated.safetensors");
        std::fs::write(&truncated, &bytes[..bytes.len() - 4]).unwrap();

        assert!(SafeTensorsReader::new(&truncated).is_err());
    }

    #[test]
    fn test_rejects_non_safetensors_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        std::fs::write(&path, b"definitely not safetensors").unwrap();

        assert!(!is_safetensors_file(&path));
        assert!(SafeTensorsReader::new(&path).is_err());
    }
}
