use burn::prelude::*;

use crate::error::{LayerError, LayerResult};

pub mod conv;
pub mod gaussian;
pub mod gradient_map;
pub mod interpolation;
pub mod orientation;
pub mod rotation;


/// Spatial extent of a strided, padded sliding window: `(input + 2·pad − kernel) / stride + 1`.
pub fn output_extent(
    axis: &'static str,
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> LayerResult<usize> {
    let padded = input + 2 * padding;
    if kernel > padded {
        return Err(LayerError::KernelExceedsInput {
            axis,
            kernel,
            padded,
        });
    }

    Ok((padded - kernel) / stride + 1)
}

/// Extra rows/columns a transposed convolution needs so that it lands back on
/// `input` when the forward window did not tile the padded input exactly.
pub(crate) fn transpose_padding_out(
    input: usize,
    output: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
) -> usize {
    input + 2 * padding - kernel - (output - 1) * stride
}

pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> LayerResult<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| LayerError::TensorData(format!("{err:?}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extent_matches_window_count() {
        assert_eq!(output_extent("height", 4, 2, 2, 0).unwrap(), 2);
        assert_eq!(output_extent("height", 5, 3, 1, 1).unwrap(), 5);
        assert_eq!(output_extent("height", 7, 3, 2, 0).unwrap(), 3);
        assert_eq!(output_extent("height", 1, 1, 1, 0).unwrap(), 1);
    }

    #[test]
    fn output_extent_rejects_oversized_kernel() {
        let err = output_extent("width", 2, 5, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            LayerError::KernelExceedsInput { axis: "width", kernel: 5, padded: 4 }
        ));
    }

    #[test]
    fn transpose_padding_restores_input_extent() {
        for (input, kernel, stride, padding) in [(7, 3, 2, 0), (8, 3, 2, 1), (5, 2, 3, 0), (6, 3, 1, 1)] {
            let output = output_extent("height", input, kernel, stride, padding).unwrap();
            let extra = transpose_padding_out(input, output, kernel, stride, padding);
            assert!(extra < stride);
            assert_eq!((output - 1) * stride + kernel + extra - 2 * padding, input);
        }
    }
}
