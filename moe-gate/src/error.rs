//! Error types for moe-gate

use thiserror::Error;

/// Result type alias using moe-gate's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for moe-gate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Unsupported dtype: {0}")]
    UnsupportedDtype(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Op not registered: {0}")]
    OpNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shape_mismatch() {
        let e = Error::ShapeMismatch {
            expected: vec![4, 2],
            got: vec![4, 3],
        };
        assert_eq!(e.to_string(), "Shape mismatch: expected [4, 2], got [4, 3]");
    }

    #[test]
    fn test_io_error_converts() {
        fn open_missing() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/nonexistent/moe-gate/config.json")?)
        }
        assert!(matches!(open_missing(), Err(Error::Io(_))));
    }
}
