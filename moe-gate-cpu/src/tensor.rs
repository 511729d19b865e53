//! CPU tensor implementation.

use std::sync::Arc;

use moe_gate::dtype::{DType, TensorDType};
use moe_gate::tensor::Tensor;
use moe_gate::{Error, Result};

/// A CPU-resident tensor backed by shared byte storage.
///
/// Uses `Arc<Vec<u8>>` so clones and reshapes share the backing bytes.
#[derive(Clone)]
pub struct CpuTensor {
    data: Arc<Vec<u8>>,
    shape: Vec<usize>,
    dtype: DType,
}

impl std::fmt::Debug for CpuTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuTensor")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .finish_non_exhaustive()
    }
}

impl CpuTensor {
    /// Create a tensor from a slice of any element type with a `DType`.
    #[must_use]
    pub fn from_slice<T: TensorDType + bytemuck::Pod>(shape: &[usize], data: &[T]) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "data len {} != shape product {numel}",
            data.len()
        );
        Self {
            data: Arc::new(bytemuck::cast_slice(data).to_vec()),
            shape: shape.to_vec(),
            dtype: T::DTYPE,
        }
    }

    /// Create a tensor from an f32 slice.
    #[must_use]
    pub fn from_f32(shape: &[usize], data: &[f32]) -> Self {
        Self::from_slice(shape, data)
    }

    /// Create a tensor from a u32 slice.
    #[must_use]
    pub fn from_u32(shape: &[usize], data: &[u32]) -> Self {
        Self::from_slice(shape, data)
    }

    /// Create a tensor from raw bytes with a given dtype.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the byte length does not match the shape.
    pub fn from_raw(shape: &[usize], dtype: DType, data: Vec<u8>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if data.len() != numel * dtype.size_in_bytes() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len() / dtype.size_in_bytes()],
            });
        }
        Ok(Self {
            data: Arc::new(data),
            shape: shape.to_vec(),
            dtype,
        })
    }

    /// Get the data as an f32 slice.
    ///
    /// # Panics
    /// Panics if dtype is not F32.
    #[must_use]
    pub fn as_f32_slice(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::F32, "expected F32 tensor");
        self.cast_elements()
    }

    /// Get the data as a u32 slice.
    ///
    /// # Panics
    /// Panics if dtype is not U32.
    #[must_use]
    pub fn as_u32_slice(&self) -> &[u32] {
        assert_eq!(self.dtype, DType::U32, "expected U32 tensor");
        self.cast_elements()
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size_in_bytes()]
    }

    // An empty Vec<u8> has a dangling, byte-aligned pointer that bytemuck
    // would reject for wider element types.
    fn cast_elements<T: bytemuck::Pod>(&self) -> &[T] {
        let bytes = self.as_bytes();
        if bytes.is_empty() {
            &[]
        } else {
            bytemuck::cast_slice(bytes)
        }
    }

    /// Copy to an f32 Vec, widening bf16/f16 if necessary.
    ///
    /// # Errors
    /// Returns `UnsupportedDtype` for non-float tensors.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match self.dtype {
            DType::F32 => Ok(self.as_f32_slice().to_vec()),
            DType::BF16 => {
                let bf16s: &[half::bf16] = self.cast_elements();
                Ok(bf16s.iter().map(|v| v.to_f32()).collect())
            }
            DType::F16 => {
                let f16s: &[half::f16] = self.cast_elements();
                Ok(f16s.iter().map(|v| v.to_f32()).collect())
            }
            other => Err(Error::UnsupportedDtype(format!(
                "expected a float tensor, got {other}"
            ))),
        }
    }
}

impl Tensor for CpuTensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn reshape(&self, shape: &[usize]) -> Self {
        let new_numel: usize = shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "reshape: {} elements != {new_numel} elements",
            self.numel()
        );
        Self {
            data: Arc::clone(&self.data),
            shape: shape.to_vec(),
            dtype: self.dtype,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32() {
        let t = CpuTensor::from_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_reshape_shares_data() {
        let t = CpuTensor::from_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let flat = t.reshape(&[6]);
        assert_eq!(flat.shape(), &[6]);
        assert_eq!(flat.as_f32_slice(), t.as_f32_slice());
        assert!(std::ptr::eq(t.data.as_ref(), flat.data.as_ref()));
    }

    #[test]
    fn test_to_f32_vec_widens_half() {
        let data: Vec<half::bf16> = [0.5f32, -2.0, 8.0]
            .iter()
            .map(|&v| half::bf16::from_f32(v))
            .collect();
        let t = CpuTensor::from_slice(&[3], &data);
        assert_eq!(t.dtype(), DType::BF16);
        assert_eq!(t.to_f32_vec().unwrap(), vec![0.5, -2.0, 8.0]);
    }

    #[test]
    fn test_to_f32_vec_rejects_u32() {
        let t = CpuTensor::from_u32(&[2], &[1, 2]);
        assert!(matches!(t.to_f32_vec(), Err(Error::UnsupportedDtype(_))));
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(CpuTensor::from_raw(&[2, 2], DType::F16, vec![0u8; 8]).is_ok());
        assert!(matches!(
            CpuTensor::from_raw(&[2, 2], DType::F16, vec![0u8; 6]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_clone_shares_data() {
        let t = CpuTensor::from_f32(&[3], &[1.0, 2.0, 3.0]);
        let c = t.clone();
        assert!(std::ptr::eq(t.data.as_ref(), c.data.as_ref()));
    }
}
