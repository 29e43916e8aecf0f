use burn::{
    prelude::*,
    backend::NdArray,
    tensor::Distribution,
};

use burn_orient::model::ssim::StructuralSimilarityConfig;


fn main() {
    let device = Default::default();

    let ssim = StructuralSimilarityConfig::new([11, 11])
        .init::<NdArray>(&device)
        .unwrap();

    let target: Tensor<NdArray, 4> = Tensor::random([1, 3, 64, 64], Distribution::Default, &device);
    let noise: Tensor<NdArray, 4> = Tensor::random([1, 3, 64, 64], Distribution::Normal(0.0, 0.1), &device);
    let prediction = target.clone() + noise;

    let (output, state) = ssim.forward(prediction, target).unwrap();
    println!("loss: {}", output.loss.into_scalar());

    let grads = ssim.backward(&state, 1.0);
    println!("prediction gradient: {:?}", grads.a.dims());
}
