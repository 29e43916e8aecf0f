pub mod correctness;
pub mod error;
pub mod kernels;
pub mod layers;
pub mod model;

#[cfg(test)]
mod tests {
    use super::model::{
        oriented_conv::{OrientedConv2d, OrientedConv2dConfig},
        ssim::StructuralSimilarityConfig,
    };
    use burn::prelude::*;

    #[cfg(feature = "backend_ndarray")]
    type NdArrayBackend = burn::backend::NdArray<f32>;

    fn test_config() -> OrientedConv2dConfig {
        OrientedConv2dConfig::square([3, 8], 3).with_padding([1, 1])
    }

    #[cfg(feature = "backend_ndarray")]
    fn build_layer(device: &<NdArrayBackend as Backend>::Device) -> OrientedConv2d<NdArrayBackend> {
        test_config().init(device).unwrap()
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn oriented_conv_initializes_ndarray() {
        let device = <NdArrayBackend as Backend>::Device::default();
        let layer = build_layer(&device);
        assert_eq!(layer.weight.val().dims(), [8, 3, 3, 3]);
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn oriented_conv_roundtrip_record_ndarray() {
        let device = <NdArrayBackend as Backend>::Device::default();
        let layer = build_layer(&device);
        let record = layer.clone().into_record();
        let loaded = build_layer(&device).load_record(record);

        let expected = layer.weight.val().into_data().to_vec::<f32>().unwrap();
        let actual = loaded.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn oriented_conv_runs_inference_ndarray() {
        let device = <NdArrayBackend as Backend>::Device::default();
        let layer = build_layer(&device);
        let input = Tensor::<NdArrayBackend, 4>::zeros([1, 3, 16, 16], &device);
        let gradient_map = Tensor::<NdArrayBackend, 4>::zeros([1, 2, 16, 16], &device);

        let (outputs, _) = layer.forward(input, gradient_map).unwrap();
        assert_eq!(outputs.output.dims(), [1, 8, 16, 16]);
    }

    #[test]
    #[cfg(feature = "backend_ndarray")]
    fn ssim_runs_inference_ndarray() {
        let device = <NdArrayBackend as Backend>::Device::default();
        let ssim = StructuralSimilarityConfig::new([5, 5])
            .init::<NdArrayBackend>(&device)
            .unwrap();
        let image = Tensor::<NdArrayBackend, 4>::ones([1, 1, 8, 8], &device);

        let (output, _) = ssim.forward(image.clone(), image).unwrap();
        assert_eq!(output.similarity.dims(), [1, 1, 4, 4]);
    }
}
