use burn::{
    prelude::*,
    tensor::TensorData,
};
use ndarray::{Array4, ArrayView4, Axis};


/// Number of axis-aligned kernel rotations blended per pixel.
pub const NUM_ROTATIONS: usize = 4;

const SECTOR_DEGREES: f32 = 90.0;

// (sector start in degrees, lower rotation, upper rotation)
const SECTORS: [(f32, usize, usize); NUM_ROTATIONS] = [
    (-180.0, 2, 3),
    (-90.0, 3, 0),
    (0.0, 0, 1),
    (90.0, 1, 2),
];


/// Piecewise-linear circular blend over the four rotations.
///
/// An angle selects the 90° sector containing it; the rotation opening the
/// sector gets `1 − t` and the one closing it gets `t`, where `t` is the
/// fractional position inside the sector. The two remaining slots are zero.
/// A sector owns its opening boundary, so `0°` is a pure rotation-0 response.
pub fn sector_weights(degrees: f32) -> [f32; NUM_ROTATIONS] {
    let sector = SECTORS
        .iter()
        .rposition(|&(start, _, _)| degrees >= start)
        .unwrap_or(0);
    let (start, lower, upper) = SECTORS[sector];
    let t = ((degrees - start) / SECTOR_DEGREES).clamp(0.0, 1.0);

    let mut weights = [0.0; NUM_ROTATIONS];
    weights[lower] = 1.0 - t;
    weights[upper] = t;

    weights
}

/// Builds the `[N, 4, H, W]` interpolation weights from `[N, 1, H, W]` angles in radians.
pub fn interpolation_weights<B: Backend>(
    radians: ArrayView4<f32>,
    device: &B::Device,
) -> Tensor<B, 4> {
    let (batch, _, height, width) = radians.dim();
    let mut alphas = Array4::<f32>::zeros((batch, NUM_ROTATIONS, height, width));

    for ((n, _, h, w), &angle) in radians.indexed_iter() {
        let weights = sector_weights(angle.to_degrees());
        for (rotation, weight) in weights.into_iter().enumerate() {
            alphas[[n, rotation, h, w]] = weight;
        }
    }

    let values: Vec<f32> = alphas.iter().copied().collect();
    Tensor::from_data(
        TensorData::new(values, [batch, NUM_ROTATIONS, height, width]),
        device,
    )
}

/// Weight map of one rotation, `[N, 1, H, W]`, ready to broadcast over channels.
pub fn rotation_weight<B: Backend>(alphas: &Tensor<B, 4>, rotation: usize) -> Tensor<B, 4> {
    alphas.clone().narrow(1, rotation, 1)
}

/// Number of active (nonzero) slots per location; at most two by construction.
pub fn active_slots(alphas: ArrayView4<f32>) -> Vec<usize> {
    alphas
        .lanes(Axis(1))
        .into_iter()
        .map(|lane| lane.iter().filter(|&&w| w != 0.0).count())
        .collect()
}
