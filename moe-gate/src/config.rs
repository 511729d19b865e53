//! Gating configuration
//!
//! Parsed from a model's `config.json` (HuggingFace layout) or a standalone
//! JSON file carrying the same keys.

use std::path::Path;

use serde::Deserialize;

use crate::routing::TopkSoftmaxParams;
use crate::{Error, Result};

/// Router settings of one MoE layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatingConfig {
    /// Total number of routed experts.
    ///
    /// Mixtral calls this `num_local_experts`, DeepSeek `n_routed_experts`.
    #[serde(alias = "num_local_experts", alias = "n_routed_experts")]
    pub num_experts: usize,

    /// Experts selected per token
    #[serde(alias = "top_k")]
    pub num_experts_per_tok: usize,

    /// Renormalise the kept probabilities to sum to one
    #[serde(default, alias = "renormalize")]
    pub norm_topk_prob: bool,

    /// First expert owned by this shard (expert parallelism)
    #[serde(default)]
    pub expert_start: Option<usize>,

    /// One past the last expert owned by this shard
    #[serde(default)]
    pub expert_end: Option<usize>,
}

impl GatingConfig {
    /// Load from a JSON file on disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// describes an invalid router.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse from a JSON string.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or an invalid router.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Routing params derived from this config.
    #[must_use]
    pub fn params(&self) -> TopkSoftmaxParams {
        let params = TopkSoftmaxParams::new(self.num_experts_per_tok)
            .with_renormalize(self.norm_topk_prob);
        if self.expert_start.is_none() && self.expert_end.is_none() {
            return params;
        }
        let start = self.expert_start.unwrap_or(0);
        let end = self.expert_end.unwrap_or(self.num_experts);
        params.with_expert_range(start..end)
    }

    /// Check the config for consistency.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the derived params are invalid.
    pub fn validate(&self) -> Result<()> {
        self.params().validate(self.num_experts).map_err(|e| match e {
            Error::InvalidArgument(msg) => Error::InvalidArgument(format!("gating config: {msg}")),
            other => other,
        })
    }
}
