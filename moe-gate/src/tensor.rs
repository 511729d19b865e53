//! Tensor trait definition

use crate::dtype::DType;
use crate::{Error, Result};

/// Core tensor trait shared by all backends.
///
/// Gating only needs row-major views: the last dimension indexes experts and
/// every leading dimension is flattened into token rows.
pub trait Tensor: Sized {
    /// Returns the shape of the tensor as a slice of dimensions
    fn shape(&self) -> &[usize];

    /// Returns the data type of tensor elements
    fn dtype(&self) -> DType;

    /// Create a view with a different shape (same data, same number of elements).
    ///
    /// # Panics
    /// Panics if the new shape has a different number of elements.
    #[must_use]
    fn reshape(&self, shape: &[usize]) -> Self;

    /// Returns the total number of elements in the tensor
    fn numel(&self) -> usize {
        self.shape().iter().product()
    }

    /// Returns the size of the tensor data in bytes
    fn size_in_bytes(&self) -> usize {
        self.numel() * self.dtype().size_in_bytes()
    }

    /// Split the shape into `(rows, cols)` where `cols` is the last dimension.
    ///
    /// # Errors
    /// Returns `InvalidShape` for rank-0 tensors or a zero-sized last dimension.
    fn rows_cols(&self) -> Result<(usize, usize)> {
        let Some(&cols) = self.shape().last() else {
            return Err(Error::InvalidShape(
                "expected at least one dimension, got a scalar".into(),
            ));
        };
        if cols == 0 {
            return Err(Error::InvalidShape(format!(
                "last dimension must be non-zero, got shape {:?}",
                self.shape()
            )));
        }
        Ok((self.numel() / cols, cols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[derive(Clone)]
    struct FakeTensor {
        shape: Vec<usize>,
        dtype: DType,
    }

    impl FakeTensor {
        fn new(shape: &[usize], dtype: DType) -> Self {
            Self {
                shape: shape.to_vec(),
                dtype,
            }
        }
    }

    impl Tensor for FakeTensor {
        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn dtype(&self) -> DType {
            self.dtype
        }

        fn reshape(&self, shape: &[usize]) -> Self {
            let new_numel: usize = shape.iter().product();
            assert_eq!(self.numel(), new_numel);
            Self::new(shape, self.dtype)
        }
    }

    #[test]
    fn test_numel() {
        let t = FakeTensor::new(&[2, 3, 4], DType::F32);
        assert_eq!(t.numel(), 24);
    }

    #[test]
    fn test_size_in_bytes_bf16() {
        let t = FakeTensor::new(&[4, 8], DType::BF16);
        assert_eq!(t.size_in_bytes(), 64);
    }

    #[test]
    fn test_rows_cols_flattens_leading_dims() {
        let t = FakeTensor::new(&[2, 3, 8], DType::F16);
        assert_eq!(t.rows_cols().unwrap(), (6, 8));
    }

    #[test]
    fn test_rows_cols_zero_rows() {
        let t = FakeTensor::new(&[0, 16], DType::F32);
        assert_eq!(t.rows_cols().unwrap(), (0, 16));
    }

    #[test]
    fn test_rows_cols_rejects_scalar_and_empty_last_dim() {
        assert!(matches!(
            FakeTensor::new(&[], DType::F32).rows_cols(),
            Err(Error::InvalidShape(_))
        ));
        assert!(matches!(
            FakeTensor::new(&[4, 0], DType::F32).rows_cols(),
            Err(Error::InvalidShape(_))
        ));
    }

    #[test]
    fn test_reshape_keeps_dtype() {
        let t = FakeTensor::new(&[2, 8], DType::F16);
        let r = t.reshape(&[16]);
        assert_eq!(r.shape(), &[16]);
        assert_eq!(r.dtype(), DType::F16);
    }
}
