use burn::{
    prelude::*,
    backend::NdArray,
    tensor::Distribution,
};

use burn_orient::{
    layers::gradient_map::sobel_gradient_map,
    model::oriented_conv::OrientedConv2dConfig,
};


fn main() {
    let device = Default::default();

    let config = OrientedConv2dConfig::square([3, 16], 5).with_padding([2, 2]);
    let layer = config.init::<NdArray>(&device).unwrap();

    let input: Tensor<NdArray, 4> = Tensor::random([1, 3, 64, 64], Distribution::Default, &device);
    let gradient_map = sobel_gradient_map(input.clone());

    let (outputs, state) = layer.forward(input, gradient_map).unwrap();
    println!("output: {:?}", outputs.output.dims());
    println!("orientation: {:?}", outputs.orientation.dims());

    let grads = layer.backward(&state, outputs.output.ones_like()).unwrap();
    println!("weight gradient: {:?}", grads.weight.dims());
}
