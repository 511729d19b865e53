//! Host-facing argument resolution for `topk_softmax`.
//!
//! Mirrors the extension's calling convention: the caller passes three
//! preallocated `(num_tokens, top_k)` output buffers and the gating logits;
//! `top_k` comes from the last dimension of the weights buffer and
//! `num_tokens` from `gating.numel() / num_experts`.

use moe_gate::routing::{TopkRouting, TopkSoftmaxParams};
use moe_gate::{registry, DType, Error, Result};
use moe_gate_cpu::CpuTensor;

/// Sizes resolved from the shapes of the four buffers handed to `topk_softmax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingShapes {
    pub num_tokens: usize,
    pub num_experts: usize,
    pub top_k: usize,
}

impl BindingShapes {
    /// Resolve and cross-check the buffer shapes.
    ///
    /// # Errors
    /// Returns `InvalidShape` if any buffer is rank 0, the expert or top-k
    /// dimension is zero, or an output buffer does not hold
    /// `num_tokens * top_k` elements.
    pub fn resolve(
        topk_weights: &[usize],
        topk_indices: &[usize],
        token_expert_indices: &[usize],
        gating_output: &[usize],
    ) -> Result<Self> {
        let num_experts = last_dim("gating_output", gating_output)?;
        let top_k = last_dim("topk_weights", topk_weights)?;
        let num_tokens = gating_output.iter().product::<usize>() / num_experts;

        for (name, shape) in [
            ("topk_weights", topk_weights),
            ("topk_indices", topk_indices),
            ("token_expert_indices", token_expert_indices),
        ] {
            let numel: usize = shape.iter().product();
            if shape.is_empty() || numel != num_tokens * top_k {
                return Err(Error::InvalidShape(format!(
                    "{name} has shape {shape:?}, expected {num_tokens} x {top_k} elements"
                )));
            }
        }

        Ok(Self {
            num_tokens,
            num_experts,
            top_k,
        })
    }

    /// Shape the gating tensor is viewed as: `(num_tokens, num_experts)`.
    #[must_use]
    pub fn gating_shape(&self) -> [usize; 2] {
        [self.num_tokens, self.num_experts]
    }
}

fn last_dim(name: &str, shape: &[usize]) -> Result<usize> {
    match shape.last() {
        Some(&d) if d > 0 => Ok(d),
        _ => Err(Error::InvalidShape(format!(
            "{name} must have a non-zero last dimension, got shape {shape:?}"
        ))),
    }
}

/// Build the gating tensor from 16-bit host storage.
///
/// Host buffers of half types are passed as their raw `u16` bits.
///
/// # Errors
/// Returns `UnsupportedDtype` unless `dtype` is F16 or BF16, and
/// `ShapeMismatch` if `bits` does not hold `shape`'s element count.
pub fn gating_from_bits(shape: &[usize], dtype: DType, bits: &[u16]) -> Result<CpuTensor> {
    if !matches!(dtype, DType::F16 | DType::BF16) {
        return Err(Error::UnsupportedDtype(format!(
            "16-bit gating storage must be f16 or bf16, got {dtype}"
        )));
    }
    // f16 and bf16 share u16's in-memory layout.
    let bytes: Vec<u8> = bits.iter().flat_map(|b| b.to_ne_bytes()).collect();
    CpuTensor::from_raw(shape, dtype, bytes)
}

/// Forward to the registered `topk_softmax` without touching its arguments
/// or results.
///
/// # Errors
/// Returns `OpNotFound` if no CPU implementation is registered, otherwise
/// whatever the op returns.
pub fn forward_topk_softmax(
    gating_output: &CpuTensor,
    params: &TopkSoftmaxParams,
) -> Result<TopkRouting<CpuTensor>> {
    registry::call_topk_softmax(gating_output, params)
}

/// Convert u32 expert ids to the host's signed index type.
///
/// # Errors
/// Returns `InvalidArgument` if an id does not fit in `i32`.
pub fn to_host_indices(ids: &[u32]) -> Result<Vec<i32>> {
    ids.iter()
        .map(|&id| {
            i32::try_from(id)
                .map_err(|_| Error::InvalidArgument(format!("index {id} overflows int32")))
        })
        .collect()
}
