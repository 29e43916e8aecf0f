use burn::{
    prelude::*,
    tensor::{
        module::{conv2d, conv_transpose2d, unfold4d},
        ops::{ConvOptions, ConvTransposeOptions, UnfoldOptions},
    },
};

use crate::{
    kernels::oriented_blend::{oriented_blend, Backend},
    layers::{
        interpolation::{rotation_weight, NUM_ROTATIONS},
        rotation::RotatedKernelBank,
        transpose_padding_out,
    },
};


/// Stride, zero padding and channel grouping shared by every rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvGeometry {
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub groups: usize,
}

impl ConvGeometry {
    fn options(&self) -> ConvOptions<2> {
        ConvOptions::new(self.stride, self.padding, [1, 1], self.groups)
    }

    /// Options for one group's transposed convolution.
    fn transpose_options(
        &self,
        input_size: [usize; 2],
        output_size: [usize; 2],
        kernel_size: [usize; 2],
    ) -> ConvTransposeOptions<2> {
        let padding_out = [
            transpose_padding_out(input_size[0], output_size[0], kernel_size[0], self.stride[0], self.padding[0]),
            transpose_padding_out(input_size[1], output_size[1], kernel_size[1], self.stride[1], self.padding[1]),
        ];

        ConvTransposeOptions::new(self.stride, self.padding, padding_out, [1, 1], 1)
    }
}


/// Plain cross-correlation of `x` with one kernel.
pub fn conv_forward<B: burn::tensor::backend::Backend>(
    x: Tensor<B, 4>,
    weight: Tensor<B, 4>,
    geometry: &ConvGeometry,
) -> Tensor<B, 4> {
    conv2d(x, weight, None, geometry.options())
}

/// Gradient of [`conv_forward`] with respect to its input.
///
/// Each group's output gradients `[N, O/g, H', W']` are transposed through
/// that group's kernels `[O/g, C/g, k, k]` on their own, then concatenated
/// back into `[N, C, H, W]`.
pub fn conv_input_backward<B: burn::tensor::backend::Backend>(
    grad: Tensor<B, 4>,
    weight: Tensor<B, 4>,
    geometry: &ConvGeometry,
    input_size: [usize; 2],
) -> Tensor<B, 4> {
    let [_, out_channels, out_h, out_w] = grad.dims();
    let [_, _, kernel_h, kernel_w] = weight.dims();
    let options = geometry.transpose_options(input_size, [out_h, out_w], [kernel_h, kernel_w]);

    if geometry.groups == 1 {
        return conv_transpose2d(grad, weight, None, options);
    }

    let group_out = out_channels / geometry.groups;
    let per_group: Vec<Tensor<B, 4>> = (0..geometry.groups)
        .map(|group| {
            let grad = grad.clone().narrow(1, group * group_out, group_out);
            let weight = weight.clone().narrow(0, group * group_out, group_out);

            conv_transpose2d(grad, weight, None, options.clone())
        })
        .collect();

    Tensor::cat(per_group, 1)
}

/// Gradient of [`conv_forward`] with respect to its kernel.
///
/// The input is unrolled into im2col patches `[N, C·k·k, L]`, and each group
/// contracts its slice of output gradients `[N, O/g, L]` against its slice of
/// patches before summing over the batch.
pub fn conv_weight_backward<B: burn::tensor::backend::Backend>(
    x: Tensor<B, 4>,
    grad: Tensor<B, 4>,
    geometry: &ConvGeometry,
    kernel_size: [usize; 2],
) -> Tensor<B, 4> {
    let [batch, channels, _, _] = x.dims();
    let [_, out_channels, out_h, out_w] = grad.dims();
    let [kernel_h, kernel_w] = kernel_size;

    let columns = unfold4d(
        x,
        kernel_size,
        UnfoldOptions::new(geometry.stride, geometry.padding, [1, 1]),
    );
    let grad = grad.reshape([batch, out_channels, out_h * out_w]);

    let group_in = channels / geometry.groups;
    let group_out = out_channels / geometry.groups;
    let patch = group_in * kernel_h * kernel_w;

    let per_group: Vec<Tensor<B, 4>> = (0..geometry.groups)
        .map(|group| {
            let columns = columns.clone().narrow(1, group * patch, patch);
            let grad = grad.clone().narrow(1, group * group_out, group_out);

            grad.matmul(columns.swap_dims(1, 2))
                .sum_dim(0)
                .reshape([group_out, group_in, kernel_h, kernel_w])
        })
        .collect();

    Tensor::cat(per_group, 0)
}


/// `Σ_r conv(x, bank[r]) ⊙ α[:, r]`, without bias.
pub fn oriented_forward<B: Backend>(
    x: Tensor<B, 4>,
    bank: &RotatedKernelBank<B>,
    alphas: Tensor<B, 4>,
    geometry: &ConvGeometry,
) -> Tensor<B, 4> {
    let responses: Vec<Tensor<B, 4>> = bank
        .iter()
        .map(|kernel| conv_forward(x.clone(), kernel.clone(), geometry))
        .collect();

    oriented_blend(Tensor::stack(responses, 1), alphas)
}

/// Input gradient and per-rotation kernel gradients of [`oriented_forward`].
///
/// The interpolation weights are treated as constants: orientation comes from
/// the auxiliary gradient map, so nothing flows back into it.
pub fn oriented_backward<B: Backend>(
    x: Tensor<B, 4>,
    grad: Tensor<B, 4>,
    bank: &RotatedKernelBank<B>,
    alphas: &Tensor<B, 4>,
    geometry: &ConvGeometry,
) -> (Tensor<B, 4>, [Tensor<B, 4>; NUM_ROTATIONS]) {
    let [_, _, height, width] = x.dims();
    let [_, _, kernel_h, kernel_w] = bank.get(0).dims();

    let weighted: [Tensor<B, 4>; NUM_ROTATIONS] =
        core::array::from_fn(|rotation| grad.clone() * rotation_weight(alphas, rotation));

    let x_grad = weighted
        .iter()
        .zip(bank.iter())
        .map(|(grad, kernel)| conv_input_backward(grad.clone(), kernel.clone(), geometry, [height, width]))
        .reduce(|acc, part| acc + part)
        .unwrap_or_else(|| x.zeros_like());

    let kernel_grads = weighted.map(|grad| conv_weight_backward(x.clone(), grad, geometry, [kernel_h, kernel_w]));

    (x_grad, kernel_grads)
}
