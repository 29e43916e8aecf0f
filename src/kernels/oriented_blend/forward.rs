use burn_jit::{
    kernel::into_contiguous,
    tensor::JitTensor,
    FloatElement,
    IntElement,
    JitBackend,
    JitRuntime,
};
use burn::tensor::{
    ops::FloatTensor,
    Shape,
};
use burn_wgpu::WgpuRuntime;
use cubecl::{
    CubeCount,
    CubeDim,
};

use super::Backend as OrientedBlendBackend;
use super::kernel::oriented_blend_forward_kernel;

pub type InnerBackend = JitBackend<WgpuRuntime, f32, i32>;


// TODO: route through burn-fusion once custom fusion ops are available, so the
// fused `Wgpu` backend can use this kernel as well.
impl<R: JitRuntime, F: FloatElement, I: IntElement> OrientedBlendBackend for JitBackend<R, F, I> {
    fn oriented_blend(
        responses: FloatTensor<Self>,   // Rotated responses: shape [B, R, C, H, W]
        alphas: FloatTensor<Self>,      // Interpolation weights: shape [B, R, H, W]
    ) -> FloatTensor<Self> {
        let cube_dim = CubeDim { x: 16, y: 16, z: 1 };

        responses.assert_is_on_same_device(&alphas);

        let responses = into_contiguous(responses);
        let alphas = into_contiguous(alphas);

        let batch = responses.shape.dims[0];
        let rotations = responses.shape.dims[1];
        let channels = responses.shape.dims[2];
        let height = responses.shape.dims[3];
        let width = responses.shape.dims[4];

        assert_eq!(batch, alphas.shape.dims[0], "batch size of responses and alphas must match");
        assert_eq!(rotations, alphas.shape.dims[1], "rotation count of responses and alphas must match");
        assert_eq!(height, alphas.shape.dims[2], "alpha height must match response height");
        assert_eq!(width, alphas.shape.dims[3], "alpha width must match response width");

        let shape_out = Shape::new([batch, channels, height, width]);

        let buffer = responses
            .client
            .empty(shape_out.num_elements() * core::mem::size_of::<F>());

        let output = JitTensor::new_contiguous(
            responses.client.clone(),
            responses.device.clone(),
            shape_out,
            buffer,
        );

        let cubes_needed_in_x = f32::ceil(height as f32 / cube_dim.x as f32) as u32;
        let cubes_needed_in_y = f32::ceil(width as f32 / cube_dim.y as f32) as u32;
        let cube_count = CubeCount::Static(cubes_needed_in_x, cubes_needed_in_y, batch as u32);

        oriented_blend_forward_kernel::launch::<F, R>(
            &responses.client,
            cube_count,
            cube_dim,
            responses.as_tensor_arg(1),
            alphas.as_tensor_arg(1),
            output.as_tensor_arg(1),
        );

        output
    }
}
