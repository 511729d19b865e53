//! Backend trait and op trait definitions.
//!
//! Callers are generic over `B: Backend` and use op traits to express their
//! compute requirements. Each backend implements the traits with its own
//! tensor type.

use crate::routing::{TopkRouting, TopkSoftmaxParams};
use crate::tensor::Tensor;
use crate::Result;

// ---- Core backend trait ----

/// A compute backend (CPU today; other devices plug in the same way).
pub trait Backend: 'static {
    /// The tensor type for this backend (e.g., `CpuTensor`).
    type Tensor: Tensor + Clone;
}

// ---- Op traits ----

/// Top-k softmax gating for mixture-of-experts layers.
pub trait TopkSoftmaxOps: Backend {
    /// Softmax each row of `gating_output` (shape `(..., num_experts)`) and
    /// keep the `params.top_k` most probable experts.
    ///
    /// # Errors
    /// Returns an error on unsupported dtypes, bad shapes or invalid params.
    fn topk_softmax(
        gating_output: &Self::Tensor,
        params: &TopkSoftmaxParams,
    ) -> Result<TopkRouting<Self::Tensor>>;

    /// Same as [`topk_softmax`](Self::topk_softmax) but writes into
    /// caller-provided `(num_tokens, top_k)` buffers.
    ///
    /// # Errors
    /// Returns an error if any output buffer has the wrong length, in
    /// addition to the errors of [`topk_softmax`](Self::topk_softmax).
    fn topk_softmax_into(
        gating_output: &Self::Tensor,
        params: &TopkSoftmaxParams,
        topk_weights: &mut [f32],
        topk_indices: &mut [u32],
        token_expert_indices: &mut [u32],
    ) -> Result<()>;
}
