//! Python extension module `_moe_C`.
//!
//! Exposes a single callable, `topk_softmax`, which forwards to the op
//! registered under that name. Argument checking lives in [`binding`] so it
//! can be tested without an interpreter; the PyO3 glue is behind the
//! `python` feature.

pub mod binding;
#[cfg(feature = "python")]
mod module;

pub use binding::{forward_topk_softmax, BindingShapes};
