use burn::{
    prelude::*,
    tensor::{
        module::{conv2d, conv_transpose2d},
        ops::{ConvOptions, ConvTransposeOptions},
        TensorData,
    },
};

use crate::{
    error::{ensure_nonzero, LayerResult},
    layers::{output_extent, transpose_padding_out},
};


/// Normalized 2-D Gaussian weights over a kernel footprint.
///
/// The spread follows the footprint, `σ = (height + width) / 12`, and the
/// peak sits on the geometric centre of the window so that even footprints
/// stay mirror-symmetric.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianKernel {
    height: usize,
    width: usize,
    weights: Vec<f32>,
}

impl GaussianKernel {
    pub fn new(height: usize, width: usize) -> Self {
        let sigma = (height + width) as f64 / 12.0;
        let denom = 2.0 * sigma * sigma;
        let center_h = (height as f64 - 1.0) / 2.0;
        let center_w = (width as f64 - 1.0) / 2.0;

        let raw: Vec<f64> = (0..height)
            .flat_map(|h| (0..width).map(move |w| (h, w)))
            .map(|(h, w)| {
                let dh = h as f64 - center_h;
                let dw = w as f64 - center_w;
                (-(dh * dh + dw * dw) / denom).exp()
            })
            .collect();

        let total: f64 = raw.iter().sum();
        let weights = raw.iter().map(|value| (value / total) as f32).collect();

        Self {
            height,
            width,
            weights,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn get(&self, h: usize, w: usize) -> f32 {
        self.weights[h * self.width + w]
    }
}


#[derive(Config, Debug)]
pub struct GaussianSmootherConfig {
    pub kernel_size: [usize; 2],
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
    #[config(default = "[0, 0]")]
    pub padding: [usize; 2],
}

impl GaussianSmootherConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LayerResult<GaussianSmoother<B>> {
        GaussianSmoother::new(device, self)
    }
}


/// Strided, zero-padded Gaussian window reduction applied to every channel
/// independently (a depthwise convolution carrying the same table).
#[derive(Module, Debug)]
pub struct GaussianSmoother<B: Backend> {
    table: Tensor<B, 4>,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    padding: [usize; 2],
}

impl<B: Backend> GaussianSmoother<B> {
    pub fn new(
        device: &B::Device,
        config: &GaussianSmootherConfig,
    ) -> LayerResult<Self> {
        let [kernel_h, kernel_w] = config.kernel_size;
        ensure_nonzero(kernel_h, "kernel height")?;
        ensure_nonzero(kernel_w, "kernel width")?;
        ensure_nonzero(config.stride[0], "stride height")?;
        ensure_nonzero(config.stride[1], "stride width")?;

        let kernel = GaussianKernel::new(kernel_h, kernel_w);
        let table = Tensor::<B, 4>::from_data(
            TensorData::new(kernel.weights().to_vec(), [1, 1, kernel_h, kernel_w]),
            device,
        );

        Ok(Self {
            table,
            kernel_size: config.kernel_size,
            stride: config.stride,
            padding: config.padding,
        })
    }

    pub fn kernel_size(&self) -> [usize; 2] {
        self.kernel_size
    }

    pub fn stride(&self) -> [usize; 2] {
        self.stride
    }

    pub fn padding(&self) -> [usize; 2] {
        self.padding
    }

    pub fn output_size(&self, height: usize, width: usize) -> LayerResult<[usize; 2]> {
        Ok([
            output_extent("height", height, self.kernel_size[0], self.stride[0], self.padding[0])?,
            output_extent("width", width, self.kernel_size[1], self.stride[1], self.padding[1])?,
        ])
    }

    fn depthwise_weight(&self, channels: usize) -> Tensor<B, 4> {
        Tensor::cat(vec![self.table.clone(); channels], 0)
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();

        conv2d(
            x,
            self.depthwise_weight(channels),
            None,
            ConvOptions::new(self.stride, self.padding, [1, 1], channels),
        )
    }

    /// Adjoint of [`forward`](Self::forward): scatters window gradients back
    /// onto an input of spatial size `input_size` through the same table.
    pub fn backward(&self, grad: Tensor<B, 4>, input_size: [usize; 2]) -> Tensor<B, 4> {
        let [_, channels, out_h, out_w] = grad.dims();
        let padding_out = [
            transpose_padding_out(input_size[0], out_h, self.kernel_size[0], self.stride[0], self.padding[0]),
            transpose_padding_out(input_size[1], out_w, self.kernel_size[1], self.stride[1], self.padding[1]),
        ];

        conv_transpose2d(
            grad,
            self.depthwise_weight(channels),
            None,
            ConvTransposeOptions::new(self.stride, self.padding, padding_out, [1, 1], channels),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn table_sums_to_one() {
        for (h, w) in [(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (11, 11), (3, 5)] {
            let kernel = GaussianKernel::new(h, w);
            let sum: f32 = kernel.weights().iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
            assert!(kernel.weights().iter().all(|&v| v >= 0.0));
        }
    }

    #[test]
    fn unit_table_is_identity() {
        assert_eq!(GaussianKernel::new(1, 1).weights(), &[1.0]);
    }

    #[test]
    fn table_is_mirror_symmetric() {
        for k in [2, 3, 4, 6, 7] {
            let kernel = GaussianKernel::new(k, k);
            for h in 0..k {
                for w in 0..k {
                    let value = kernel.get(h, w);
                    assert_abs_diff_eq!(value, kernel.get(k - 1 - h, w), epsilon = 1e-7);
                    assert_abs_diff_eq!(value, kernel.get(h, k - 1 - w), epsilon = 1e-7);
                    assert_abs_diff_eq!(value, kernel.get(w, h), epsilon = 1e-7);
                }
            }
        }
    }

    #[test]
    fn odd_table_peaks_at_center() {
        let kernel = GaussianKernel::new(5, 5);
        let peak = kernel.get(2, 2);
        assert!(kernel.weights().iter().all(|&v| v <= peak));
    }

    #[cfg(feature = "backend_ndarray")]
    mod smoother {
        use super::*;
        use burn::tensor::Distribution;

        type NdArrayBackend = burn::backend::NdArray<f32>;

        fn values(tensor: Tensor<NdArrayBackend, 4>) -> Vec<f32> {
            tensor.into_data().to_vec::<f32>().unwrap()
        }

        #[test]
        fn output_shape_follows_window_formula() {
            let device = Default::default();
            let smoother = GaussianSmootherConfig::new([3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .init::<NdArrayBackend>(&device)
                .unwrap();

            let x = Tensor::<NdArrayBackend, 4>::ones([2, 3, 7, 8], &device);
            let y = smoother.forward(x);

            assert_eq!(y.dims(), [2, 3, 4, 4]);
            assert_eq!(smoother.output_size(7, 8).unwrap(), [4, 4]);
        }

        #[test]
        fn constant_input_is_preserved_without_padding() {
            let device = Default::default();
            let smoother = GaussianSmootherConfig::new([3, 3])
                .init::<NdArrayBackend>(&device)
                .unwrap();

            let x = Tensor::<NdArrayBackend, 4>::full([1, 2, 5, 5], 2.5, &device);
            for value in values(smoother.forward(x)) {
                assert_abs_diff_eq!(value, 2.5, epsilon = 1e-5);
            }
        }

        #[test]
        fn padding_taps_contribute_nothing() {
            let device = Default::default();
            let smoother = GaussianSmootherConfig::new([3, 3])
                .with_padding([1, 1])
                .init::<NdArrayBackend>(&device)
                .unwrap();
            let kernel = GaussianKernel::new(3, 3);

            let x = Tensor::<NdArrayBackend, 4>::ones([1, 1, 4, 4], &device);
            let y = values(smoother.forward(x));

            let corner: f32 = [(1, 1), (1, 2), (2, 1), (2, 2)]
                .iter()
                .map(|&(h, w)| kernel.get(h, w))
                .sum();
            assert_abs_diff_eq!(y[0], corner, epsilon = 1e-6);
            assert_abs_diff_eq!(y[5], 1.0, epsilon = 1e-5);
        }

        #[test]
        fn backward_is_adjoint_of_forward() {
            let device = Default::default();
            let smoother = GaussianSmootherConfig::new([3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .init::<NdArrayBackend>(&device)
                .unwrap();

            let x = Tensor::<NdArrayBackend, 4>::random([2, 2, 6, 7], Distribution::Uniform(-1.0, 1.0), &device);
            let [out_h, out_w] = smoother.output_size(6, 7).unwrap();
            let y = Tensor::<NdArrayBackend, 4>::random([2, 2, out_h, out_w], Distribution::Uniform(-1.0, 1.0), &device);

            let lhs: f32 = (smoother.forward(x.clone()) * y.clone()).sum().into_scalar();
            let back = smoother.backward(y, [6, 7]);
            assert_eq!(back.dims(), [2, 2, 6, 7]);
            let rhs: f32 = (x * back).sum().into_scalar();

            assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-4);
        }

        #[test]
        fn zero_stride_is_rejected() {
            let device = Default::default();
            let result = GaussianSmootherConfig::new([3, 3])
                .with_stride([0, 1])
                .init::<NdArrayBackend>(&device);
            assert!(result.is_err());
        }
    }
}
