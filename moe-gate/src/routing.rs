//! Parameters and outputs of top-k softmax routing.

use std::ops::Range;

use crate::{Error, Result};

/// Name the top-k softmax op is registered under.
pub const TOPK_SOFTMAX: &str = "topk_softmax";

/// Doc string attached to the `topk_softmax` registration.
pub const TOPK_SOFTMAX_DOC: &str = "Apply top-k softmax to the gating outputs.";

/// Routing knobs for [`TopkSoftmaxOps::topk_softmax`](crate::backend::TopkSoftmaxOps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopkSoftmaxParams {
    /// Experts kept per token.
    pub top_k: usize,
    /// Divide the kept probabilities by their sum.
    pub renormalize: bool,
    /// Experts owned by this shard. Ids outside it are reported as
    /// `num_experts`; ids inside it are shifted down by `start`.
    pub expert_range: Option<Range<usize>>,
}

impl TopkSoftmaxParams {
    /// Plain top-k over all experts, no renormalisation.
    #[must_use]
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            renormalize: false,
            expert_range: None,
        }
    }

    #[must_use]
    pub fn with_renormalize(mut self, renormalize: bool) -> Self {
        self.renormalize = renormalize;
        self
    }

    #[must_use]
    pub fn with_expert_range(mut self, range: Range<usize>) -> Self {
        self.expert_range = Some(range);
        self
    }

    /// Check these params against the number of experts in the gating row.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `top_k` is zero or exceeds `num_experts`,
    /// or if the expert range is empty or out of bounds.
    pub fn validate(&self, num_experts: usize) -> Result<()> {
        if num_experts == 0 {
            return Err(Error::InvalidArgument("num_experts must be non-zero".into()));
        }
        if self.top_k == 0 || self.top_k > num_experts {
            return Err(Error::InvalidArgument(format!(
                "top_k must be in 1..={num_experts}, got {}",
                self.top_k
            )));
        }
        if let Some(range) = &self.expert_range {
            if range.is_empty() || range.end > num_experts {
                return Err(Error::InvalidArgument(format!(
                    "expert range {range:?} is empty or exceeds {num_experts} experts"
                )));
            }
        }
        Ok(())
    }

    /// Map a global expert id to the id reported in `indices`.
    #[must_use]
    pub fn local_expert_id(&self, expert: usize, num_experts: usize) -> usize {
        match &self.expert_range {
            Some(range) if range.contains(&expert) => expert - range.start,
            Some(_) => num_experts,
            None => expert,
        }
    }
}

/// Result of routing `num_tokens` rows to `top_k` experts each.
///
/// All three tensors have shape `(num_tokens, top_k)`.
#[derive(Debug, Clone)]
pub struct TopkRouting<T> {
    /// Softmax probability of each selected expert (f32).
    pub weights: T,
    /// Selected expert ids (u32), shard-local when an expert range is set.
    pub indices: T,
    /// Source row of each `(token, slot)` pair in slot-major order:
    /// `slot * num_tokens + token` (u32).
    pub token_expert_indices: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_top_k_bounds() {
        assert!(TopkSoftmaxParams::new(2).validate(8).is_ok());
        assert!(TopkSoftmaxParams::new(8).validate(8).is_ok());
        assert!(matches!(
            TopkSoftmaxParams::new(0).validate(8),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TopkSoftmaxParams::new(9).validate(8),
            Err(Error::InvalidArgument(_))
        ));
        assert!(TopkSoftmaxParams::new(1).validate(0).is_err());
    }

    #[test]
    fn test_validate_expert_range() {
        assert!(TopkSoftmaxParams::new(2)
            .with_expert_range(4..8)
            .validate(8)
            .is_ok());
        assert!(TopkSoftmaxParams::new(2)
            .with_expert_range(4..4)
            .validate(8)
            .is_err());
        assert!(TopkSoftmaxParams::new(2)
            .with_expert_range(4..9)
            .validate(8)
            .is_err());
    }

    #[test]
    fn test_local_expert_id() {
        let all = TopkSoftmaxParams::new(2);
        assert_eq!(all.local_expert_id(5, 8), 5);

        let shard = TopkSoftmaxParams::new(2).with_expert_range(4..8);
        assert_eq!(shard.local_expert_id(5, 8), 1);
        assert_eq!(shard.local_expert_id(4, 8), 0);
        // Not on this shard: sentinel
        assert_eq!(shard.local_expert_id(3, 8), 8);
    }
}
