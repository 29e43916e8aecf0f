use cubecl::{
    prelude::*,
    cube,
};


#[cube(launch)]
pub fn oriented_blend_forward_kernel<F: Float>(
    responses: &Tensor<F>,  // Rotated responses: shape [B, R, C, H, W]
    alphas: &Tensor<F>,     // Interpolation weights: shape [B, R, H, W]
    output: &mut Tensor<F>, // Output tensor: shape [B, C, H, W]
) {
    let h = ABSOLUTE_POS_X;
    let w = ABSOLUTE_POS_Y;
    let batch = ABSOLUTE_POS_Z;

    let batch_size = output.shape(0);
    let channels = output.shape(1);
    let height = output.shape(2);
    let width = output.shape(3);

    if batch >= batch_size || h >= height || w >= width {
        return;
    }

    let rotations = responses.shape(1);

    let stride_responses_b = responses.stride(0);
    let stride_responses_r = responses.stride(1);
    let stride_responses_c = responses.stride(2);
    let stride_responses_h = responses.stride(3);
    let stride_responses_w = responses.stride(4);

    let stride_alphas_b = alphas.stride(0);
    let stride_alphas_r = alphas.stride(1);
    let stride_alphas_h = alphas.stride(2);
    let stride_alphas_w = alphas.stride(3);

    let stride_output_b = output.stride(0);
    let stride_output_c = output.stride(1);
    let stride_output_h = output.stride(2);
    let stride_output_w = output.stride(3);

    for c in 0..channels {
        let mut output_val = F::new(0.0);
        for r in 0..rotations {
            let idx_response = batch * stride_responses_b
                            + r * stride_responses_r
                            + c * stride_responses_c
                            + h * stride_responses_h
                            + w * stride_responses_w;

            let idx_alpha = batch * stride_alphas_b
                            + r * stride_alphas_r
                            + h * stride_alphas_h
                            + w * stride_alphas_w;

            output_val += responses[idx_response] * alphas[idx_alpha];
        }

        let idx_output = batch * stride_output_b
                        + c * stride_output_c
                        + h * stride_output_h
                        + w * stride_output_w;

        output[idx_output] = output_val;
    }
}
