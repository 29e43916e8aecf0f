use std::path::PathBuf;

use burn::{config::Config, prelude::*, tensor::TensorData};
use clap::{Parser, ValueEnum};
use image::GrayImage;
use tracing::Level;

use burn_orient::{
    correctness::OrientedConvReference,
    layers::gradient_map::{gradient_map, GradientOperator},
    model::oriented_conv::{OrientedConv2d, OrientedConv2dConfig},
};

#[cfg(feature = "backend_wgpu")]
type ToolBackend = burn_orient::kernels::oriented_blend::forward::InnerBackend;
#[cfg(not(feature = "backend_wgpu"))]
type ToolBackend = burn::backend::NdArray<f32>;


#[derive(Clone, Copy, Debug, ValueEnum)]
enum Operator {
    Sobel,
    Scharr,
}

impl From<Operator> for GradientOperator {
    fn from(operator: Operator) -> Self {
        match operator {
            Operator::Sobel => GradientOperator::Sobel,
            Operator::Scharr => GradientOperator::Scharr,
        }
    }
}

/// Steers an edge detector along the local gradient of a grayscale image.
#[derive(Debug, Parser)]
#[command(name = "orient", version)]
struct Args {
    /// PNG image to filter.
    input: PathBuf,

    /// Where to write the normalized response.
    #[arg(long, default_value = "orient_response.png")]
    output: PathBuf,

    /// Optional image of the estimated orientation, angle mapped onto [0, 255].
    #[arg(long)]
    orientation: Option<PathBuf>,

    /// JSON layer configuration; overrides the geometry flags and uses the
    /// configured initializer instead of the built-in edge kernel.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    kernel_size: usize,

    #[arg(long, default_value_t = 1)]
    stride: usize,

    /// Defaults to `kernel_size / 2`.
    #[arg(long)]
    padding: Option<usize>,

    #[arg(long, value_enum, default_value_t = Operator::Sobel)]
    operator: Operator,

    /// Dump input, parameters and output as a safetensors reference bundle.
    #[arg(long)]
    reference: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}


/// Horizontal derivative: `-1` down the left column, `+1` down the right.
fn edge_kernel(kernel_size: usize, device: &<ToolBackend as Backend>::Device) -> Tensor<ToolBackend, 4> {
    let values: Vec<f32> = (0..kernel_size * kernel_size)
        .map(|i| match i % kernel_size {
            0 => -1.0,
            w if w == kernel_size - 1 => 1.0,
            _ => 0.0,
        })
        .collect();

    Tensor::from_data(TensorData::new(values, [1, 1, kernel_size, kernel_size]), device)
}

fn to_gray(values: &[f32], width: usize, height: usize, range: Option<(f32, f32)>) -> Option<GrayImage> {
    let (low, high) = range.unwrap_or_else(|| {
        values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    });
    let span = (high - low).max(f32::EPSILON);

    let bytes = values
        .iter()
        .map(|&v| (((v - low) / span).clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    GrayImage::from_raw(width as u32, height as u32, bytes)
}


fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    #[cfg(feature = "backend_wgpu")]
    let device = burn_wgpu::WgpuDevice::default();
    #[cfg(not(feature = "backend_wgpu"))]
    let device = Default::default();

    let image = image::open(&args.input)?.to_luma32f();
    let (width, height) = (image.width() as usize, image.height() as usize);
    tracing::info!(width, height, path = %args.input.display(), "loaded image");

    let input = Tensor::<ToolBackend, 4>::from_data(
        TensorData::new(image.into_raw(), [1, 1, height, width]),
        &device,
    );
    let gradients = gradient_map(input.clone(), args.operator.into());

    let (config, layer): (OrientedConv2dConfig, OrientedConv2d<ToolBackend>) = match &args.config {
        Some(path) => {
            let config = OrientedConv2dConfig::load(path).map_err(|err| format!("{err:?}"))?;
            let layer = config.init(&device)?;
            (config, layer)
        }
        None => {
            let config = OrientedConv2dConfig::square([1, 1], args.kernel_size)
                .with_stride([args.stride, args.stride])
                .with_padding([args.padding.unwrap_or(args.kernel_size / 2); 2])
                .with_bias(false);
            let layer = config
                .init(&device)?
                .with_parameters(edge_kernel(args.kernel_size, &device), None)?;
            (config, layer)
        }
    };

    let (outputs, _) = layer.forward(input.clone(), gradients.clone())?;
    let [_, channels, out_h, out_w] = outputs.output.dims();

    // average over output channels for display
    let response = outputs
        .output
        .mean_dim(1)
        .into_data()
        .to_vec::<f32>()
        .map_err(|err| format!("{err:?}"))?;
    to_gray(&response, out_w, out_h, None)
        .ok_or("response buffer does not match output extent")?
        .save(&args.output)?;
    tracing::info!(channels, out_h, out_w, path = %args.output.display(), "wrote response");

    if let Some(path) = &args.orientation {
        let radians = outputs
            .radians
            .into_data()
            .to_vec::<f32>()
            .map_err(|err| format!("{err:?}"))?;
        to_gray(&radians, out_w, out_h, Some((-std::f32::consts::PI, std::f32::consts::PI)))
            .ok_or("orientation buffer does not match output extent")?
            .save(path)?;
        tracing::info!(path = %path.display(), "wrote orientation");
    }

    if let Some(path) = &args.reference {
        OrientedConvReference::capture(&config, &layer, input, gradients)?.save(path)?;
    }

    Ok(())
}
