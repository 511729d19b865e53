//! Looking `topk_softmax` up by name must behave exactly like calling it.

use moe_gate::registry::{self, TopkSoftmaxFn};
use moe_gate::{Error, GatingConfig, Tensor, TopkSoftmaxParams, TOPK_SOFTMAX};
use moe_gate_cpu::{topk_softmax, CpuTensor};

fn gating(num_tokens: usize, num_experts: usize) -> CpuTensor {
    let logits: Vec<f32> = (0..num_tokens * num_experts)
        .map(|i| (i as f32 * 0.61).cos() * 3.0)
        .collect();
    CpuTensor::from_f32(&[num_tokens, num_experts], &logits)
}

#[test]
fn test_topk_softmax_is_registered_with_doc() {
    moe_gate_cpu::init();

    assert!(registry::names().contains(&TOPK_SOFTMAX));
    assert_eq!(
        registry::doc(TOPK_SOFTMAX),
        Some("Apply top-k softmax to the gating outputs.")
    );
    assert!(registry::get::<TopkSoftmaxFn<CpuTensor>>(TOPK_SOFTMAX).is_some());
}

#[test]
fn test_registered_op_matches_direct_call() {
    moe_gate_cpu::init();

    let input = gating(7, 16);
    let params = TopkSoftmaxParams::new(4).with_renormalize(true);

    let direct = topk_softmax(&input, &params).unwrap();
    let via_registry = registry::call_topk_softmax(&input, &params).unwrap();

    assert_eq!(via_registry.weights.shape(), direct.weights.shape());
    assert_eq!(
        via_registry.weights.as_f32_slice(),
        direct.weights.as_f32_slice()
    );
    assert_eq!(
        via_registry.indices.as_u32_slice(),
        direct.indices.as_u32_slice()
    );
    assert_eq!(
        via_registry.token_expert_indices.as_u32_slice(),
        direct.token_expert_indices.as_u32_slice()
    );
}

#[test]
fn test_registered_op_forwards_errors() {
    moe_gate_cpu::init();

    let input = gating(2, 4);
    let err = registry::call_topk_softmax(&input, &TopkSoftmaxParams::new(6)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

#[test]
fn test_config_driven_routing() {
    moe_gate_cpu::init();

    let config = GatingConfig::from_json_str(
        r#"{"num_local_experts": 8, "num_experts_per_tok": 2, "norm_topk_prob": true,
            "expert_start": 0, "expert_end": 4}"#,
    )
    .unwrap();
    let input = gating(3, config.num_experts);
    let routing = registry::call_topk_softmax(&input, &config.params()).unwrap();

    assert_eq!(routing.indices.shape(), &[3, 2]);
    for &id in routing.indices.as_u32_slice() {
        // Local ids 0..4, or the sentinel for experts on another shard.
        assert!(id < 4 || id == 8, "unexpected expert id {id}");
    }
    for row in routing.weights.as_f32_slice().chunks(2) {
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
