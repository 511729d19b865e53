//! Top-k softmax expert routing for CpuBackend.
//!
//! Each token row is softmaxed over all experts in f32, then the `top_k`
//! most probable experts are picked by repeated arg-max. Ties go to the
//! lower expert id, so slots come out in non-increasing probability order.

#![allow(clippy::cast_possible_truncation)]

use rayon::prelude::*;

use moe_gate::backend::TopkSoftmaxOps;
use moe_gate::routing::{TopkRouting, TopkSoftmaxParams, TOPK_SOFTMAX, TOPK_SOFTMAX_DOC};
use moe_gate::tensor::Tensor;
use moe_gate::{define_op, DType, Error, Result};

use crate::tensor::CpuTensor;
use crate::CpuBackend;

define_op! {
    name: TOPK_SOFTMAX,
    doc: TOPK_SOFTMAX_DOC,
    /// Route every row of `gating_output` to its `params.top_k` most probable
    /// experts, allocating the three `(num_tokens, top_k)` outputs.
    ///
    /// # Errors
    /// Returns an error on non-float gating dtypes, rank-0 or zero-width
    /// gating tensors, params that do not fit the expert count, and sizes
    /// whose indices overflow u32.
    pub fn topk_softmax(
        gating_output: &CpuTensor,
        params: &TopkSoftmaxParams,
    ) -> Result<TopkRouting<CpuTensor>> {
        let (num_tokens, _) = check_inputs(gating_output, params)?;
        let top_k = params.top_k;
        let mut weights = vec![0.0f32; num_tokens * top_k];
        let mut indices = vec![0u32; num_tokens * top_k];
        let mut token_expert_indices = vec![0u32; num_tokens * top_k];

        topk_softmax_into(
            gating_output,
            params,
            &mut weights,
            &mut indices,
            &mut token_expert_indices,
        )?;

        let out_shape = [num_tokens, top_k];
        Ok(TopkRouting {
            weights: CpuTensor::from_f32(&out_shape, &weights),
            indices: CpuTensor::from_u32(&out_shape, &indices),
            token_expert_indices: CpuTensor::from_u32(&out_shape, &token_expert_indices),
        })
    }
}

/// Route `gating_output` into caller-provided `(num_tokens, top_k)` buffers.
///
/// # Errors
/// Same as [`topk_softmax`], plus `InvalidShape` when an output buffer
/// length is not `num_tokens * top_k`.
pub fn topk_softmax_into(
    gating_output: &CpuTensor,
    params: &TopkSoftmaxParams,
    topk_weights: &mut [f32],
    topk_indices: &mut [u32],
    token_expert_indices: &mut [u32],
) -> Result<()> {
    let (num_tokens, num_experts) = check_inputs(gating_output, params)?;

    let expected = num_tokens * params.top_k;
    for (name, len) in [
        ("topk_weights", topk_weights.len()),
        ("topk_indices", topk_indices.len()),
        ("token_expert_indices", token_expert_indices.len()),
    ] {
        if len != expected {
            return Err(Error::InvalidShape(format!(
                "{name}: expected {expected} elements ({num_tokens} x {}), got {len}",
                params.top_k
            )));
        }
    }

    tracing::trace!(
        num_tokens,
        num_experts,
        top_k = params.top_k,
        dtype = %gating_output.dtype(),
        "topk_softmax"
    );

    // Softmax happens in this scratch copy; the gating tensor is left untouched.
    let mut probs = match gating_output.dtype() {
        DType::F32 => gating_output.as_f32_slice().to_vec(),
        _ => gating_output.to_f32_vec()?,
    };

    route_rows(
        &mut probs,
        num_experts,
        params,
        topk_weights,
        topk_indices,
        token_expert_indices,
    );
    Ok(())
}

/// Validate the gating tensor and params, returning `(num_tokens, num_experts)`.
///
/// Runs before any output is sized, so a `top_k` that does not fit the
/// expert count fails here instead of in an allocation.
fn check_inputs(
    gating_output: &CpuTensor,
    params: &TopkSoftmaxParams,
) -> Result<(usize, usize)> {
    let (num_tokens, num_experts) = gating_output.rows_cols()?;
    if !gating_output.dtype().is_float() {
        return Err(Error::UnsupportedDtype(format!(
            "topk_softmax: gating output must be f32/f16/bf16, got {}",
            gating_output.dtype()
        )));
    }
    params.validate(num_experts)?;
    check_index_range(num_tokens, num_experts, params.top_k)?;
    Ok((num_tokens, num_experts))
}

/// Expert ids (including the `num_experts` sentinel) and source rows
/// (`< num_tokens * top_k`) are written as u32.
fn check_index_range(num_tokens: usize, num_experts: usize, top_k: usize) -> Result<()> {
    let fits = |n: usize| u32::try_from(n).is_ok();
    match num_tokens.checked_mul(top_k) {
        Some(rows) if fits(rows) && fits(num_experts) => Ok(()),
        _ => Err(Error::InvalidArgument(format!(
            "topk_softmax: {num_tokens} tokens x {top_k} slots over {num_experts} experts \
             overflows u32 indices"
        ))),
    }
}

/// Softmax and select experts for every row of `probs` in parallel.
fn route_rows(
    probs: &mut [f32],
    num_experts: usize,
    params: &TopkSoftmaxParams,
    topk_weights: &mut [f32],
    topk_indices: &mut [u32],
    token_expert_indices: &mut [u32],
) {
    let top_k = params.top_k;
    let num_tokens = probs.len() / num_experts;

    probs
        .par_chunks_mut(num_experts)
        .zip(topk_weights.par_chunks_mut(top_k))
        .zip(topk_indices.par_chunks_mut(top_k))
        .zip(token_expert_indices.par_chunks_mut(top_k))
        .enumerate()
        .for_each(|(token, (((row, weights), indices), sources))| {
            softmax_inplace(row);
            let mut chosen = Vec::with_capacity(top_k);
            for slot in 0..top_k {
                let (expert, prob) = arg_max_excluding(row, &chosen);
                chosen.push(expert);
                weights[slot] = prob;
                // check_index_range bounds both by u32::MAX.
                indices[slot] = params.local_expert_id(expert, num_experts) as u32;
                sources[slot] = (slot * num_tokens + token) as u32;
            }
            if params.renormalize {
                renormalize(weights);
            }
        });
}

/// Numerically stable softmax over one row.
fn softmax_inplace(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    let inv_sum = 1.0 / sum;
    for v in row.iter_mut() {
        *v *= inv_sum;
    }
}

/// Highest-probability expert not in `chosen`; the lower id wins ties.
///
/// A NaN probability never beats the current best, so rows of NaN resolve
/// to the lowest unchosen id.
fn arg_max_excluding(row: &[f32], chosen: &[usize]) -> (usize, f32) {
    let mut best: Option<(usize, f32)> = None;
    for (expert, &prob) in row.iter().enumerate() {
        if chosen.contains(&expert) {
            continue;
        }
        match best {
            Some((_, best_prob)) if prob <= best_prob || prob.is_nan() => {}
            _ => best = Some((expert, prob)),
        }
    }
    // validate() guarantees top_k <= num_experts, so an unchosen expert exists.
    best.unwrap_or((0, 0.0))
}

fn renormalize(weights: &mut [f32]) {
    let sum: f32 = weights.iter().sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
}

impl TopkSoftmaxOps for CpuBackend {
    fn topk_softmax(
        gating_output: &CpuTensor,
        params: &TopkSoftmaxParams,
    ) -> Result<TopkRouting<CpuTensor>> {
        topk_softmax(gating_output, params)
    }

    fn topk_softmax_into(
        gating_output: &CpuTensor,
        params: &TopkSoftmaxParams,
        topk_weights: &mut [f32],
        topk_indices: &mut [u32],
        token_expert_indices: &mut [u32],
    ) -> Result<()> {
        topk_softmax_into(
            gating_output,
            params,
            topk_weights,
            topk_indices,
            token_expert_indices,
        )
    }
}
