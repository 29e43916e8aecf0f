#![cfg_attr(not(feature = "backend_ndarray"), allow(dead_code))]

#[cfg(feature = "backend_ndarray")]
use burn::{
    backend::NdArray,
    prelude::*,
    tensor::Distribution,
};
#[cfg(feature = "backend_ndarray")]
use burn_orient::model::oriented_conv::OrientedConv2dConfig;
#[cfg(feature = "backend_ndarray")]
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

#[cfg(feature = "backend_ndarray")]
type BenchBackend = NdArray<f32>;

#[cfg(feature = "backend_ndarray")]
criterion_group! {
    name = oriented_conv_benchmarks;
    config = Criterion::default().sample_size(20);
    targets = forward_benchmark, backward_benchmark,
}
#[cfg(feature = "backend_ndarray")]
criterion_main!(oriented_conv_benchmarks);

#[cfg(feature = "backend_ndarray")]
const KERNEL_SIZES: [usize; 3] = [3, 5, 7];

#[cfg(feature = "backend_ndarray")]
fn inputs(size: usize) -> (Tensor<BenchBackend, 4>, Tensor<BenchBackend, 4>) {
    let device = Default::default();
    (
        Tensor::random([1, 8, size, size], Distribution::Default, &device),
        Tensor::random([1, 2, size, size], Distribution::Uniform(-1.0, 1.0), &device),
    )
}

#[cfg(feature = "backend_ndarray")]
fn forward_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("oriented_conv_forward");
    for kernel_size in KERNEL_SIZES {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("kernel", kernel_size), &kernel_size, |b, &kernel_size| {
            let device = Default::default();
            let layer = OrientedConv2dConfig::square([8, 16], kernel_size)
                .with_padding([kernel_size / 2; 2])
                .init::<BenchBackend>(&device)
                .unwrap();
            let (input, gradient_map) = inputs(64);

            b.iter(|| {
                layer
                    .forward(input.clone(), gradient_map.clone())
                    .unwrap()
                    .0
                    .output
                    .to_data()
            });
        });
    }
}

#[cfg(feature = "backend_ndarray")]
fn backward_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("oriented_conv_backward");
    for kernel_size in KERNEL_SIZES {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("kernel", kernel_size), &kernel_size, |b, &kernel_size| {
            let device = Default::default();
            let layer = OrientedConv2dConfig::square([8, 16], kernel_size)
                .with_padding([kernel_size / 2; 2])
                .init::<BenchBackend>(&device)
                .unwrap();
            let (input, gradient_map) = inputs(64);
            let (outputs, state) = layer.forward(input, gradient_map).unwrap();
            let grad_output = outputs.output.ones_like();

            b.iter(|| {
                layer
                    .backward(&state, grad_output.clone())
                    .unwrap()
                    .weight
                    .to_data()
            });
        });
    }
}

#[cfg(not(feature = "backend_ndarray"))]
fn main() {
    eprintln!(
        "oriented_conv benchmark requires `--features backend_ndarray`. \
         Re-run with `cargo bench --features backend_ndarray`."
    );
}
