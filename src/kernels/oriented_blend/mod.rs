use burn::tensor::{ops::FloatTensor, Tensor, TensorPrimitive};

#[cfg(feature = "backend_wgpu")]
pub mod forward;
#[cfg(feature = "backend_wgpu")]
pub mod kernel;


pub trait Backend: burn::tensor::backend::Backend {
    /// Per-pixel mixture of rotated-kernel responses.
    ///
    /// `responses`: `[B, R, C, H, W]`, `alphas`: `[B, R, H, W]`, output `[B, C, H, W]`
    /// with `out[b, c, h, w] = Σ_r responses[b, r, c, h, w] · alphas[b, r, h, w]`.
    fn oriented_blend(
        responses: FloatTensor<Self>,
        alphas: FloatTensor<Self>,
    ) -> FloatTensor<Self> {
        let responses = Tensor::<Self, 5>::from_primitive(TensorPrimitive::Float(responses));
        let alphas = Tensor::<Self, 4>::from_primitive(TensorPrimitive::Float(alphas));

        let blended: Tensor<Self, 4> = (responses * alphas.unsqueeze_dim::<5>(2))
            .sum_dim(1)
            .squeeze(1);

        blended.into_primitive().tensor()
    }
}

#[cfg(feature = "backend_ndarray")]
impl Backend for burn::backend::NdArray<f32> {}


pub fn oriented_blend<B: Backend>(
    responses: Tensor<B, 5>,    // Rotated responses: shape [B, R, C, H, W]
    alphas: Tensor<B, 4>,       // Interpolation weights: shape [B, R, H, W]
) -> Tensor<B, 4> {
    let output = B::oriented_blend(
        responses.into_primitive().tensor(),
        alphas.into_primitive().tensor(),
    );

    Tensor::from_primitive(TensorPrimitive::Float(output))
}
