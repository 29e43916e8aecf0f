use burn::{
    prelude::*,
    tensor::TensorData,
};
use ndarray::{s, Array4, Zip};

use crate::{
    error::{LayerError, LayerResult},
    layers::{gaussian::GaussianSmoother, tensor_to_vec},
};


/// Dominant gradient orientation per output location.
#[derive(Clone, Debug)]
pub struct OrientationField<B: Backend> {
    /// Smoothed `(Gx, Gy)`, `[N, 2, H', W']`.
    pub smoothed: Tensor<B, 4>,
    /// `atan2(Gy, Gx)` in radians, `[N, 1, H', W']`.
    pub radians: Tensor<B, 4>,
    /// `(sin, cos)` of the orientation, `[N, 2, H', W']`.
    pub sin_cos: Tensor<B, 4>,
    host_radians: Array4<f32>,
}

impl<B: Backend> OrientationField<B> {
    pub fn host_radians(&self) -> &Array4<f32> {
        &self.host_radians
    }
}


/// Smooths a two-channel gradient map and measures its angle at every window.
///
/// A window whose smoothed gradient vanishes reports angle `0` (the
/// `atan2(0, 0)` convention), which selects the unrotated kernel.
pub fn estimate_orientation<B: Backend>(
    smoother: &GaussianSmoother<B>,
    gradient_map: Tensor<B, 4>,
) -> LayerResult<OrientationField<B>> {
    let [_, channels, _, _] = gradient_map.dims();
    if channels != 2 {
        return Err(LayerError::GradientChannels(channels));
    }

    let device = gradient_map.device();
    let smoothed = smoother.forward(gradient_map);
    let [batch, _, height, width] = smoothed.dims();

    // burn 0.15 has no float atan2, so the angle is taken on the host. A
    // device-side atan(y / x) loses the quadrant and the (0, 0) convention.
    let host = Array4::from_shape_vec(
        (batch, 2, height, width),
        tensor_to_vec(smoothed.clone())?,
    )
    .map_err(|err| LayerError::TensorData(err.to_string()))?;

    let gx = host.slice(s![.., 0..1, .., ..]);
    let gy = host.slice(s![.., 1..2, .., ..]);
    let host_radians = Zip::from(&gy)
        .and(&gx)
        .map_collect(|&y, &x| y.atan2(x));

    let radians = Tensor::<B, 4>::from_data(
        TensorData::new(
            host_radians.iter().copied().collect::<Vec<f32>>(),
            [batch, 1, height, width],
        ),
        &device,
    );
    let sin_cos = Tensor::cat(vec![radians.clone().sin(), radians.clone().cos()], 1);

    tracing::trace!(batch, height, width, "estimated gradient orientation");

    Ok(OrientationField {
        smoothed,
        radians,
        sin_cos,
        host_radians,
    })
}
