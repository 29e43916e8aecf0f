use burn::{
    prelude::*,
    tensor::{module::conv2d, ops::ConvOptions, TensorData},
};


type Kernel3 = [[f32; 3]; 3];

const SOBEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

const SCHARR_X: Kernel3 = [[-3.0, 0.0, 3.0], [-10.0, 0.0, 10.0], [-3.0, 0.0, 3.0]];
const SCHARR_Y: Kernel3 = [[-3.0, -10.0, -3.0], [0.0, 0.0, 0.0], [3.0, 10.0, 3.0]];


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradientOperator {
    #[default]
    Sobel,
    Scharr,
}

impl GradientOperator {
    fn kernels(self) -> (&'static Kernel3, &'static Kernel3) {
        match self {
            Self::Sobel => (&SOBEL_X, &SOBEL_Y),
            Self::Scharr => (&SCHARR_X, &SCHARR_Y),
        }
    }
}


/// Two-channel `(Gx, Gy)` map of an `[N, C, H, W]` image, same spatial size.
///
/// Channels are averaged first; borders are zero padded.
pub fn gradient_map<B: Backend>(image: Tensor<B, 4>, operator: GradientOperator) -> Tensor<B, 4> {
    let device = image.device();
    let gray = image.mean_dim(1);

    let (kernel_x, kernel_y) = operator.kernels();
    let weights: Vec<f32> = kernel_x
        .iter()
        .chain(kernel_y.iter())
        .flat_map(|row| row.iter().copied())
        .collect();
    let weights = Tensor::<B, 4>::from_data(TensorData::new(weights, [2, 1, 3, 3]), &device);

    conv2d(gray, weights, None, ConvOptions::new([1, 1], [1, 1], [1, 1], 1))
}

pub fn sobel_gradient_map<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 4> {
    gradient_map(image, GradientOperator::Sobel)
}


#[cfg(all(test, feature = "backend_ndarray"))]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    type NdArrayBackend = burn::backend::NdArray<f32>;

    fn ramp(size: usize, along_width: bool) -> Tensor<NdArrayBackend, 4> {
        let values: Vec<f32> = (0..size * size)
            .map(|i| if along_width { (i % size) as f32 } else { (i / size) as f32 })
            .collect();
        Tensor::from_data(TensorData::new(values, [1, 1, size, size]), &Default::default())
    }

    fn at(values: &[f32], size: usize, channel: usize, h: usize, w: usize) -> f32 {
        values[(channel * size + h) * size + w]
    }

    #[test]
    fn horizontal_ramp_has_only_x_gradient() {
        let map = sobel_gradient_map(ramp(5, true));
        assert_eq!(map.dims(), [1, 2, 5, 5]);

        let values = map.into_data().to_vec::<f32>().unwrap();
        for h in 1..4 {
            for w in 1..4 {
                assert_eq!(at(&values, 5, 0, h, w), 8.0);
                assert_eq!(at(&values, 5, 1, h, w), 0.0);
            }
        }
    }

    #[test]
    fn vertical_ramp_has_only_y_gradient() {
        let values = gradient_map(ramp(4, false), GradientOperator::Scharr)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(at(&values, 4, 0, 1, 1), 0.0);
        assert_eq!(at(&values, 4, 1, 1, 1), 32.0);
    }

    #[test]
    fn channels_are_averaged() {
        let single = ramp(4, true);
        let triple = Tensor::cat(vec![single.clone(), single.clone(), single.clone()], 1);

        let lhs = sobel_gradient_map(single).into_data().to_vec::<f32>().unwrap();
        let rhs = sobel_gradient_map(triple).into_data().to_vec::<f32>().unwrap();
        for (a, b) in lhs.iter().zip(rhs) {
            assert_abs_diff_eq!(*a, b, epsilon = 1e-5);
        }
    }
}
