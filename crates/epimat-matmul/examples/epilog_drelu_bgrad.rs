//! RELU_AUX_BIAS forward pass followed by a DRELU_BGRAD backward pass.
//!
//! The backward epilog consumes the forward `relu_aux` mask and emits the
//! bias gradient under `bgrad`. Run with `RUST_LOG=debug` to see each launch
//! being enqueued.

use std::sync::Arc;

use epimat_matmul::{
    AuxRole, AuxiliaryBundle, ComputeBackend, CpuBackend, Epilog, Matmul, MatmulOptions, Stream,
};
use epimat_tensor::{DType, Tensor};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (m, n, k) = (64, 128, 256);
    let mut rng = StdRng::seed_from_u64(0);
    let a = Tensor::rand([m, k], DType::F64, &mut rng)?;
    let b = Tensor::rand([k, n], DType::F64, &mut rng)?;
    let bias = Tensor::rand([m, 1], DType::F64, &mut rng)?;

    let stream = Stream::new("default")?;
    let mm = Matmul::with_options(
        Arc::new(CpuBackend::new()),
        stream.clone(),
        MatmulOptions::from_env(),
    );
    info!(
        "backend '{}', options {:?}",
        mm.backend().name(),
        mm.options()
    );

    // Forward pass with a fused bias.
    let inputs = AuxiliaryBundle::new().with(AuxRole::Bias, bias);
    let (_, auxiliary) = mm
        .multiply(&a, &b, Epilog::ReluAuxBias, inputs)?
        .into_parts();

    // Backward pass; its auxiliary output carries the bias gradient.
    let (result, auxiliary) = mm
        .multiply(&a, &b, Epilog::DReluBGrad, auxiliary)?
        .into_parts();

    stream.synchronize()?;

    let bgrad = auxiliary
        .as_ref()
        .and_then(|aux| aux.get(AuxRole::BGrad))
        .ok_or("DRELU_BGRAD produced no bias gradient")?;
    info!("bgrad has shape {} and dtype {}", bgrad.shape(), bgrad.dtype());

    let names: Vec<_> = auxiliary
        .iter()
        .flat_map(|aux| aux.roles())
        .map(|role| role.name())
        .collect();
    println!(
        "The result has shape {} and dtype {}, and the auxiliary output holds {:?}.",
        result.shape(),
        result.dtype(),
        names,
    );
    Ok(())
}
