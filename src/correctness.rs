use std::{collections::HashMap, fs, path::Path};

use burn::{
    config::Config,
    tensor::{Tensor, TensorData},
};
use safetensors::{
    tensor::{Dtype, SafeTensors, TensorView},
    SafeTensorError,
};
use thiserror::Error;

use crate::{
    error::LayerError,
    kernels::oriented_blend::Backend,
    layers::tensor_to_vec,
    model::oriented_conv::{OrientedConv2d, OrientedConv2dConfig},
};


const CONFIG_METADATA_KEY: &str = "oriented_conv2d_config";

pub const OUTPUT_MAX_ABS: f32 = 1e-4;
pub const OUTPUT_MEAN_ABS: f32 = 1e-5;
pub const OUTPUT_MSE: f32 = 1e-8;


/// Row-major host copy of one tensor in a reference bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceTensor<const D: usize> {
    pub values: Vec<f32>,
    pub shape: [usize; D],
}

impl<const D: usize> ReferenceTensor<D> {
    pub fn from_tensor<B: burn::tensor::backend::Backend>(
        tensor: Tensor<B, D>,
    ) -> Result<Self, CorrectnessError> {
        let shape = tensor.dims();
        Ok(Self {
            values: tensor_to_vec(tensor)?,
            shape,
        })
    }

    pub fn to_tensor<B: burn::tensor::backend::Backend>(&self, device: &B::Device) -> Tensor<B, D> {
        Tensor::from_data(TensorData::new(self.values.clone(), self.shape), device)
    }

    fn bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}


/// Inputs, parameters and expected output of one oriented convolution,
/// stored as a safetensors bundle with the layer configuration as metadata.
#[derive(Debug)]
pub struct OrientedConvReference {
    pub config: OrientedConv2dConfig,
    pub input: ReferenceTensor<4>,
    pub gradient_map: ReferenceTensor<4>,
    pub weight: ReferenceTensor<4>,
    pub bias: Option<ReferenceTensor<1>>,
    pub output: ReferenceTensor<4>,
}

impl OrientedConvReference {
    /// Runs `layer` once and records everything needed to replay it.
    pub fn capture<B: Backend>(
        config: &OrientedConv2dConfig,
        layer: &OrientedConv2d<B>,
        input: Tensor<B, 4>,
        gradient_map: Tensor<B, 4>,
    ) -> Result<Self, CorrectnessError> {
        let (outputs, _) = layer.forward(input.clone(), gradient_map.clone())?;
        let bias = match &layer.bias {
            Some(bias) => Some(ReferenceTensor::from_tensor(bias.val())?),
            None => None,
        };

        Ok(Self {
            config: config.clone(),
            input: ReferenceTensor::from_tensor(input)?,
            gradient_map: ReferenceTensor::from_tensor(gradient_map)?,
            weight: ReferenceTensor::from_tensor(layer.weight.val())?,
            bias,
            output: ReferenceTensor::from_tensor(outputs.output)?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CorrectnessError> {
        let bytes = fs::read(path.as_ref())?;
        let tensors = SafeTensors::deserialize(&bytes)?;
        let (_, metadata) = SafeTensors::read_metadata(&bytes)?;

        let config = metadata
            .metadata()
            .as_ref()
            .and_then(|entries| entries.get(CONFIG_METADATA_KEY))
            .ok_or(CorrectnessError::MissingConfig)?;
        let config = OrientedConv2dConfig::load_binary(config.as_bytes())
            .map_err(|err| CorrectnessError::Config(format!("{err:?}")))?;

        Ok(Self {
            config,
            input: read_tensor(&tensors, "input")?,
            gradient_map: read_tensor(&tensors, "gradient_map")?,
            weight: read_tensor(&tensors, "weight")?,
            bias: read_tensor_optional(&tensors, "bias")?,
            output: read_tensor(&tensors, "output")?,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CorrectnessError> {
        let mut buffers: Vec<(&'static str, Vec<usize>, Vec<u8>)> = vec![
            ("input", self.input.shape.to_vec(), self.input.bytes()),
            ("gradient_map", self.gradient_map.shape.to_vec(), self.gradient_map.bytes()),
            ("weight", self.weight.shape.to_vec(), self.weight.bytes()),
            ("output", self.output.shape.to_vec(), self.output.bytes()),
        ];
        if let Some(bias) = &self.bias {
            buffers.push(("bias", bias.shape.to_vec(), bias.bytes()));
        }

        let views = buffers
            .iter()
            .map(|(name, shape, data)| Ok((*name, TensorView::new(Dtype::F32, shape.clone(), data)?)))
            .collect::<Result<Vec<_>, SafeTensorError>>()?;

        let metadata = HashMap::from([(CONFIG_METADATA_KEY.to_string(), self.config.to_string())]);
        let bytes = safetensors::serialize(views, &Some(metadata))?;
        fs::write(path.as_ref(), bytes)?;

        tracing::info!(path = %path.as_ref().display(), "saved oriented convolution reference");
        Ok(())
    }

    /// Rebuilds the recorded layer with its recorded parameters.
    pub fn build_layer<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<OrientedConv2d<B>, CorrectnessError> {
        let layer = self.config.init::<B>(device)?;
        let bias = self.bias.as_ref().map(|bias| bias.to_tensor::<B>(device));

        Ok(layer.with_parameters(self.weight.to_tensor::<B>(device), bias)?)
    }
}


#[derive(Clone, Copy, Debug)]
pub struct MetricStats {
    pub mean_abs: f32,
    pub max_abs: f32,
    pub max_rel: f32,
    pub mse: f32,
}

impl MetricStats {
    pub fn within_defaults(&self) -> bool {
        self.max_abs <= OUTPUT_MAX_ABS
            && self.mean_abs <= OUTPUT_MEAN_ABS
            && self.mse <= OUTPUT_MSE
    }
}


/// Replays a reference bundle and compares the layer output against it.
pub fn run_correctness<B: Backend>(
    reference: &OrientedConvReference,
    device: &B::Device,
) -> Result<MetricStats, CorrectnessError> {
    let layer = reference.build_layer::<B>(device)?;
    let (outputs, _) = layer.forward(
        reference.input.to_tensor::<B>(device),
        reference.gradient_map.to_tensor::<B>(device),
    )?;
    let actual = tensor_to_vec(outputs.output)?;

    if actual.len() != reference.output.values.len() {
        return Err(CorrectnessError::LengthMismatch {
            tensor: "output",
            expected: reference.output.values.len(),
            actual: actual.len(),
        });
    }

    let stats = compute_stats(&actual, &reference.output.values);
    tracing::debug!(?stats, "oriented convolution correctness");

    Ok(stats)
}

pub fn compute_stats(actual: &[f32], expected: &[f32]) -> MetricStats {
    let mut sum_abs = 0.0f32;
    let mut max_abs = 0.0f32;
    let mut max_rel = 0.0f32;
    let mut mse = 0.0f32;

    for (&lhs, &rhs) in actual.iter().zip(expected.iter()) {
        let diff = lhs - rhs;
        let abs = diff.abs();
        sum_abs += abs;
        max_abs = max_abs.max(abs);
        if rhs.abs() > f32::EPSILON {
            max_rel = max_rel.max(abs / rhs.abs());
        }
        mse += diff.powi(2);
    }

    let len = actual.len().max(1) as f32;
    MetricStats {
        mean_abs: sum_abs / len,
        max_abs,
        max_rel,
        mse: mse / len,
    }
}


fn read_tensor<const D: usize>(
    tensors: &SafeTensors<'_>,
    name: &'static str,
) -> Result<ReferenceTensor<D>, CorrectnessError> {
    let view = tensors
        .tensor(name)
        .map_err(|_| CorrectnessError::MissingTensor(name))?;
    view_to_reference(name, &view)
}

fn read_tensor_optional<const D: usize>(
    tensors: &SafeTensors<'_>,
    name: &'static str,
) -> Result<Option<ReferenceTensor<D>>, CorrectnessError> {
    match tensors.tensor(name) {
        Ok(view) => view_to_reference(name, &view).map(Some),
        Err(_) => Ok(None),
    }
}

fn view_to_reference<const D: usize>(
    name: &'static str,
    view: &TensorView<'_>,
) -> Result<ReferenceTensor<D>, CorrectnessError> {
    if view.dtype() != Dtype::F32 {
        return Err(CorrectnessError::UnexpectedDtype {
            tensor: name,
            dtype: format!("{:?}", view.dtype()),
        });
    }

    let shape: [usize; D] = view
        .shape()
        .try_into()
        .map_err(|_| CorrectnessError::UnexpectedRank {
            tensor: name,
            expected: D,
            actual: view.shape().len(),
        })?;

    let values = view
        .data()
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(ReferenceTensor { values, shape })
}


#[derive(Debug, Error)]
pub enum CorrectnessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("safetensors error: {0}")]
    Safetensors(#[from] SafeTensorError),

    #[error("layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("reference carries no layer configuration")]
    MissingConfig,

    #[error("invalid layer configuration: {0}")]
    Config(String),

    #[error("tensor `{0}` missing from reference")]
    MissingTensor(&'static str),

    #[error("tensor `{tensor}` has dtype {dtype}, expected F32")]
    UnexpectedDtype { tensor: &'static str, dtype: String },

    #[error("tensor `{tensor}` rank mismatch: expected {expected}, got {actual}")]
    UnexpectedRank {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("tensor `{tensor}` length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },
}
