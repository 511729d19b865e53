//! moe-gate: top-k softmax gating for mixture-of-experts layers.
//!
//! This crate provides the core types, op traits and the named op registry.
//! Backend-specific implementations (CPU, ...) are in separate crates.

pub mod backend;
pub mod config;
pub mod dtype;
pub mod error;
pub mod registry;
pub mod routing;
pub mod tensor;

pub use backend::{Backend, TopkSoftmaxOps};
pub use config::GatingConfig;
pub use dtype::DType;
pub use error::{Error, Result};
pub use moe_gate_macros::define_op;
pub use routing::{TopkRouting, TopkSoftmaxParams, TOPK_SOFTMAX, TOPK_SOFTMAX_DOC};
pub use tensor::Tensor;
