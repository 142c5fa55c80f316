//! Thread the RELU_AUX mask from a forward pass into the DRELU backward pass.
//!
//! The `relu_aux` output marks where the input to RELU was positive. It is
//! opaque to the caller: produced by one matmul and consumed by another whose
//! epilog is its partner.

use std::any::type_name_of_val;
use std::sync::Arc;

use epimat_matmul::{CpuBackend, Epilog, Matmul, Stream};
use epimat_tensor::{DType, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (m, n, k) = (64, 128, 256);
    let mut rng = StdRng::seed_from_u64(0);
    let a = Tensor::rand([m, k], DType::F64, &mut rng)?;
    let b = Tensor::rand([k, n], DType::F64, &mut rng)?;

    let stream = Stream::new("default")?;
    let mm = Matmul::new(Arc::new(CpuBackend::new()), stream.clone());

    // Forward pass.
    let (_, auxiliary) = mm.multiply(&a, &b, Epilog::ReluAux, ())?.into_parts();

    // Backward pass, consuming the forward pass's auxiliary output.
    let result = mm
        .multiply(&a, &b, Epilog::DRelu, auxiliary.clone())?
        .into_result();

    // Launches are non-blocking; wait before touching the results.
    stream.synchronize()?;

    println!(
        "Inputs were of types {} and {}, and the result type is {} {}, and the auxiliary output is of type {}.",
        type_name_of_val(&a),
        type_name_of_val(&b),
        type_name_of_val(&result),
        result.shape(),
        type_name_of_val(&auxiliary),
    );
    Ok(())
}
