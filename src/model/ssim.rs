use burn::prelude::*;

use crate::{
    error::{LayerError, LayerResult},
    layers::gaussian::{GaussianSmoother, GaussianSmootherConfig},
};


#[derive(Config, Debug)]
pub struct StructuralSimilarityConfig {
    pub kernel_size: [usize; 2],
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
    #[config(default = "[0, 0]")]
    pub padding: [usize; 2],
    /// Luminance stabilizer, `(0.01)²` for unit-range data.
    #[config(default = 1e-4)]
    pub c1: f64,
    /// Contrast/structure stabilizer, `(0.03)²` for unit-range data.
    #[config(default = 9e-4)]
    pub c2: f64,
}

impl StructuralSimilarityConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LayerResult<StructuralSimilarity<B>> {
        StructuralSimilarity::new(device, self)
    }
}


/// Windowed structural similarity between two same-shaped tensors, reduced
/// to `1 − mean(SSIM)`.
#[derive(Module, Debug)]
pub struct StructuralSimilarity<B: Backend> {
    smoother: GaussianSmoother<B>,
    c1: f64,
    c2: f64,
}

#[derive(Clone, Debug)]
pub struct SsimOutput<B: Backend> {
    /// `[1]`
    pub loss: Tensor<B, 1>,
    /// Per-window `L·S`, `[N, C, H', W']`.
    pub similarity: Tensor<B, 4>,
}

/// Window statistics of one forward pass.
#[derive(Clone, Debug)]
pub struct SsimState<B: Backend> {
    a: Tensor<B, 4>,
    b: Tensor<B, 4>,
    mean_a: Tensor<B, 4>,
    mean_b: Tensor<B, 4>,
    var_a: Tensor<B, 4>,
    var_b: Tensor<B, 4>,
    covariance: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct SsimGrads<B: Backend> {
    pub a: Tensor<B, 4>,
    pub b: Tensor<B, 4>,
}


impl<B: Backend> StructuralSimilarity<B> {
    pub fn new(device: &B::Device, config: &StructuralSimilarityConfig) -> LayerResult<Self> {
        for (name, value) in [("c1", config.c1), ("c2", config.c2)] {
            if value.is_nan() || value <= 0.0 {
                return Err(LayerError::InvalidConstant { name, value });
            }
        }

        let smoother = GaussianSmootherConfig::new(config.kernel_size)
            .with_stride(config.stride)
            .with_padding(config.padding)
            .init(device)?;

        Ok(Self {
            smoother,
            c1: config.c1,
            c2: config.c2,
        })
    }

    pub fn forward(
        &self,
        a: Tensor<B, 4>,
        b: Tensor<B, 4>,
    ) -> LayerResult<(SsimOutput<B>, SsimState<B>)> {
        let dims = a.dims();
        if dims != b.dims() {
            return Err(LayerError::ShapeMismatch {
                left: dims,
                right: b.dims(),
            });
        }

        let [_, channels, height, width] = dims;
        self.smoother.output_size(height, width)?;

        // μA, μB, E[A²], E[B²], E[AB] in one depthwise pass
        let moments = self.smoother.forward(Tensor::cat(
            vec![
                a.clone(),
                b.clone(),
                a.clone().powf_scalar(2.0),
                b.clone().powf_scalar(2.0),
                a.clone() * b.clone(),
            ],
            1,
        ));
        let moment = |index: usize| moments.clone().narrow(1, index * channels, channels);

        let mean_a = moment(0);
        let mean_b = moment(1);
        let var_a = moment(2) - mean_a.clone().powf_scalar(2.0);
        let var_b = moment(3) - mean_b.clone().powf_scalar(2.0);
        let covariance = moment(4) - mean_a.clone() * mean_b.clone();

        let state = SsimState {
            a,
            b,
            mean_a,
            mean_b,
            var_a,
            var_b,
            covariance,
        };
        let terms = self.terms(&state);
        let similarity = terms.luminance() * terms.structure();
        let loss = similarity.clone().mean().neg().add_scalar(1.0);

        tracing::trace!(?dims, "structural similarity forward");

        Ok((SsimOutput { loss, similarity }, state))
    }

    /// Gradients of `grad_loss · loss` with respect to both inputs.
    pub fn backward(&self, state: &SsimState<B>, grad_loss: f32) -> SsimGrads<B> {
        let [_, channels, height, width] = state.a.dims();
        let windows = state.mean_a.dims().iter().product::<usize>() as f32;
        let scale = -grad_loss / windows;

        let terms = self.terms(state);
        let luminance = terms.luminance();
        let structure = terms.structure();

        // ∂S/∂σA² = ∂S/∂σB², ∂S/∂σAB
        let d_var = luminance.clone() * terms.n2.clone().neg() / terms.d2.clone().powf_scalar(2.0);
        let d_cov = luminance.clone().mul_scalar(2.0) / terms.d2.clone();

        let d_mean = |own: &Tensor<B, 4>, other: &Tensor<B, 4>| {
            let d_luminance = (other.clone().mul_scalar(2.0) * terms.d1.clone()
                - own.clone().mul_scalar(2.0) * terms.n1.clone())
                / terms.d1.clone().powf_scalar(2.0);

            structure.clone() * d_luminance
                - d_var.clone() * own.clone().mul_scalar(2.0)
                - d_cov.clone() * other.clone()
        };

        let stacked = Tensor::cat(
            vec![
                d_mean(&state.mean_a, &state.mean_b),
                d_mean(&state.mean_b, &state.mean_a),
                d_var.clone(),
                d_var,
                d_cov,
            ],
            1,
        )
        .mul_scalar(scale);

        let spread = self.smoother.backward(stacked, [height, width]);
        let part = |index: usize| spread.clone().narrow(1, index * channels, channels);

        let a = part(0) + part(2) * state.a.clone().mul_scalar(2.0) + part(4) * state.b.clone();
        let b = part(1) + part(3) * state.b.clone().mul_scalar(2.0) + part(4) * state.a.clone();

        SsimGrads { a, b }
    }

    fn terms(&self, state: &SsimState<B>) -> SsimTerms<B> {
        let mean_a = state.mean_a.clone();
        let mean_b = state.mean_b.clone();

        SsimTerms {
            n1: (mean_a.clone() * mean_b.clone()).mul_scalar(2.0).add_scalar(self.c1),
            d1: (mean_a.powf_scalar(2.0) + mean_b.powf_scalar(2.0)).add_scalar(self.c1),
            n2: state.covariance.clone().mul_scalar(2.0).add_scalar(self.c2),
            d2: (state.var_a.clone() + state.var_b.clone()).add_scalar(self.c2),
        }
    }
}

struct SsimTerms<B: Backend> {
    n1: Tensor<B, 4>,
    d1: Tensor<B, 4>,
    n2: Tensor<B, 4>,
    d2: Tensor<B, 4>,
}

impl<B: Backend> SsimTerms<B> {
    fn luminance(&self) -> Tensor<B, 4> {
        self.n1.clone() / self.d1.clone()
    }

    fn structure(&self) -> Tensor<B, 4> {
        self.n2.clone() / self.d2.clone()
    }
}
