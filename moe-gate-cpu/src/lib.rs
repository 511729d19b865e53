//! CPU backend for moe-gate.
//!
//! Routes tokens on the host in f32; f16/bf16 gating logits are widened
//! before the softmax. Token rows are processed in parallel with rayon.

#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod ops;
pub mod tensor;

use moe_gate::backend::Backend;

pub use ops::topk_softmax::{topk_softmax, topk_softmax_into};
pub use tensor::CpuTensor;

/// Marker type for the CPU backend.
///
/// All op trait impls are on this type.
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Tensor = CpuTensor;
}

/// Populate the op registry with every op, including the CPU ones.
///
/// Registers the CPU ops explicitly as well, so they are present even when
/// the linker drops this crate's `inventory` entries.
pub fn init() {
    ops::topk_softmax::register_topk_softmax();
    moe_gate::registry::init();
}
