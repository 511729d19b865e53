//! Latency benchmark for the registered `topk_softmax` op.
//!
//! # Usage
//!
//! ```text
//! cargo run --release -p moe-gate-bench -- --num-experts 64 --top-k 6 --tokens 4096
//! cargo run --release -p moe-gate-bench -- --config /path/to/model/config.json
//! RUST_LOG=moe_gate=debug cargo run -p moe-gate-bench -- --tokens 1
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use moe_gate::{registry, GatingConfig, Result, TopkSoftmaxParams};
use moe_gate_cpu::CpuTensor;

/// Benchmark top-k softmax expert routing on the CPU backend
#[derive(Parser)]
#[command(name = "topk-bench")]
struct Cli {
    /// Router config (HF `config.json` or a file with the same keys)
    #[arg(short, long, env = "MOE_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Number of experts (ignored when --config is given)
    #[arg(long, default_value_t = 64)]
    num_experts: usize,

    /// Experts kept per token (ignored when --config is given)
    #[arg(long, default_value_t = 6)]
    top_k: usize,

    /// Renormalise the kept weights (ignored when --config is given)
    #[arg(long)]
    renormalize: bool,

    /// Token rows per call
    #[arg(short, long, default_value_t = 1024)]
    tokens: usize,

    /// Timed iterations
    #[arg(
        short,
        long,
        default_value_t = 100,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    iters: u32,
}

impl Cli {
    fn gating_config(&self) -> Result<GatingConfig> {
        let config = match &self.config {
            Some(path) => GatingConfig::from_file(path)?,
            None => GatingConfig {
                num_experts: self.num_experts,
                num_experts_per_tok: self.top_k,
                norm_topk_prob: self.renormalize,
                expert_start: None,
                expert_end: None,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Deterministic logits so runs are comparable.
#[allow(clippy::cast_precision_loss)]
fn synthetic_gating(num_tokens: usize, num_experts: usize) -> CpuTensor {
    let logits: Vec<f32> = (0..num_tokens * num_experts)
        .map(|i| (i as f32 * 0.37 + 0.5).sin() * 2.0)
        .collect();
    CpuTensor::from_f32(&[num_tokens, num_experts], &logits)
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.gating_config()?;
    let params: TopkSoftmaxParams = config.params();

    moe_gate_cpu::init();
    tracing::info!(
        num_experts = config.num_experts,
        top_k = params.top_k,
        renormalize = params.renormalize,
        tokens = cli.tokens,
        iters = cli.iters,
        "benchmarking topk_softmax"
    );

    let gating = synthetic_gating(cli.tokens, config.num_experts);

    // Warm-up (also surfaces errors before timing)
    registry::call_topk_softmax(&gating, &params)?;

    let mut total = Duration::ZERO;
    let mut best = Duration::MAX;
    for _ in 0..cli.iters {
        let start = Instant::now();
        let routing = registry::call_topk_softmax(&gating, &params)?;
        let elapsed = start.elapsed();
        std::hint::black_box(routing);
        total += elapsed;
        best = best.min(elapsed);
    }

    let mean = total / cli.iters;
    #[allow(clippy::cast_precision_loss)]
    let tokens_per_sec = cli.tokens as f64 / mean.as_secs_f64().max(f64::EPSILON);
    tracing::info!(
        mean_us = mean.as_secs_f64() * 1e6,
        min_us = best.as_secs_f64() * 1e6,
        tokens_per_sec = tokens_per_sec.round(),
        "done"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(&cli)
}
