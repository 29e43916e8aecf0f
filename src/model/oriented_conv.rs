use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
};

use crate::{
    error::{ensure_nonzero, LayerError, LayerResult},
    kernels::oriented_blend::Backend,
    layers::{
        conv::{oriented_backward, oriented_forward, ConvGeometry},
        gaussian::{GaussianSmoother, GaussianSmootherConfig},
        interpolation::interpolation_weights,
        orientation::estimate_orientation,
        rotation::RotatedKernelBank,
    },
};


#[derive(Config, Debug)]
pub struct OrientedConv2dConfig {
    /// `[input, output]` channel counts.
    pub channels: [usize; 2],
    /// `[height, width]`; rotation requires both to be equal.
    pub kernel_size: [usize; 2],
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
    #[config(default = "[0, 0]")]
    pub padding: [usize; 2],
    #[config(default = 1)]
    pub groups: usize,
    #[config(default = true)]
    pub bias: bool,
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
    #[config(default = "Initializer::Zeros")]
    pub bias_initializer: Initializer,
}

impl OrientedConv2dConfig {
    pub fn square(channels: [usize; 2], kernel_size: usize) -> Self {
        Self::new(channels, [kernel_size, kernel_size])
    }

    pub fn validate(&self) -> LayerResult<()> {
        let [in_channels, out_channels] = self.channels;
        let [kernel_h, kernel_w] = self.kernel_size;

        ensure_nonzero(in_channels, "input channels")?;
        ensure_nonzero(out_channels, "output channels")?;
        ensure_nonzero(kernel_h, "kernel height")?;
        ensure_nonzero(kernel_w, "kernel width")?;
        ensure_nonzero(self.stride[0], "stride height")?;
        ensure_nonzero(self.stride[1], "stride width")?;
        ensure_nonzero(self.groups, "groups")?;

        if kernel_h != kernel_w {
            return Err(LayerError::NonSquareKernel {
                height: kernel_h,
                width: kernel_w,
            });
        }

        if in_channels % self.groups != 0 {
            return Err(LayerError::GroupMismatch {
                what: "input",
                channels: in_channels,
                groups: self.groups,
            });
        }

        if out_channels % self.groups != 0 {
            return Err(LayerError::GroupMismatch {
                what: "output",
                channels: out_channels,
                groups: self.groups,
            });
        }

        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LayerResult<OrientedConv2d<B>> {
        OrientedConv2d::new(device, self)
    }
}


/// Convolution whose kernel is steered, per output location, towards the
/// dominant direction of an auxiliary gradient map.
///
/// One kernel is learned. Each forward pass derives its four quarter-turn
/// rotations, convolves the input with all of them and blends the responses
/// with the two rotations adjacent to the local gradient angle.
#[derive(Module, Debug)]
pub struct OrientedConv2d<B: Backend> {
    pub weight: Param<Tensor<B, 4>>,
    pub bias: Option<Param<Tensor<B, 1>>>,
    smoother: GaussianSmoother<B>,
    in_channels: usize,
    stride: [usize; 2],
    padding: [usize; 2],
    groups: usize,
}

/// Output shapes derived from the input shapes at reshape time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrientedConvShapes {
    pub output: [usize; 4],
    pub orientation: [usize; 4],
}

#[derive(Clone, Debug)]
pub struct OrientedConvOutput<B: Backend> {
    /// Blended response, `[N, O, H', W']`.
    pub output: Tensor<B, 4>,
    /// `(sin, cos)` of the local orientation, `[N, 2, H', W']`.
    pub orientation: Tensor<B, 4>,
    /// Smoothed `(Gx, Gy)`, `[N, 2, H', W']`.
    pub smoothed_gradients: Tensor<B, 4>,
    /// Local orientation in radians, `[N, 1, H', W']`.
    pub radians: Tensor<B, 4>,
}

/// Everything a forward pass derived that its backward pass needs.
#[derive(Clone, Debug)]
pub struct OrientedConvState<B: Backend> {
    input: Tensor<B, 4>,
    bank: RotatedKernelBank<B>,
    alphas: Tensor<B, 4>,
    output_dims: [usize; 4],
}

impl<B: Backend> OrientedConvState<B> {
    pub fn bank(&self) -> &RotatedKernelBank<B> {
        &self.bank
    }

    /// Interpolation weights `[N, 4, H', W']`.
    pub fn alphas(&self) -> &Tensor<B, 4> {
        &self.alphas
    }
}

#[derive(Clone, Debug)]
pub struct OrientedConvGrads<B: Backend> {
    pub input: Tensor<B, 4>,
    pub weight: Tensor<B, 4>,
    pub bias: Option<Tensor<B, 1>>,
}

impl<B: Backend> OrientedConvGrads<B> {
    /// Sums gradients of two backward passes over the same parameters.
    pub fn accumulate(self, other: Self) -> Self {
        let bias = match (self.bias, other.bias) {
            (Some(lhs), Some(rhs)) => Some(lhs + rhs),
            (lhs, rhs) => lhs.or(rhs),
        };

        Self {
            input: self.input + other.input,
            weight: self.weight + other.weight,
            bias,
        }
    }
}


impl<B: Backend> OrientedConv2d<B> {
    pub fn new(
        device: &B::Device,
        config: &OrientedConv2dConfig,
    ) -> LayerResult<Self> {
        config.validate()?;

        let [in_channels, out_channels] = config.channels;
        let kernel_size = config.kernel_size[0];
        let group_in = in_channels / config.groups;
        let group_out = out_channels / config.groups;
        let fan_in = group_in * kernel_size * kernel_size;
        let fan_out = group_out * kernel_size * kernel_size;

        let weight = config.initializer.init_with(
            [out_channels, group_in, kernel_size, kernel_size],
            Some(fan_in),
            Some(fan_out),
            device,
        );
        let bias = if config.bias {
            Some(config.bias_initializer.init_with([out_channels], Some(fan_in), Some(fan_out), device))
        } else {
            None
        };

        let smoother = GaussianSmootherConfig::new(config.kernel_size)
            .with_stride(config.stride)
            .with_padding(config.padding)
            .init(device)?;

        tracing::debug!(
            in_channels,
            out_channels,
            kernel_size,
            groups = config.groups,
            bias = config.bias,
            "configured oriented convolution",
        );

        Ok(Self {
            weight,
            bias,
            smoother,
            in_channels,
            stride: config.stride,
            padding: config.padding,
            groups: config.groups,
        })
    }

    /// Installs pre-trained parameters in place of the initialized ones.
    pub fn with_parameters(
        mut self,
        weight: Tensor<B, 4>,
        bias: Option<Tensor<B, 1>>,
    ) -> LayerResult<Self> {
        let expected = self.weight.val().dims();
        if weight.dims() != expected {
            return Err(LayerError::ParameterShape {
                tensor: "weight",
                expected: expected.to_vec(),
                actual: weight.dims().to_vec(),
            });
        }

        let bias = match (&self.bias, bias) {
            (Some(current), Some(bias)) => {
                let expected = current.val().dims();
                if bias.dims() != expected {
                    return Err(LayerError::ParameterShape {
                        tensor: "bias",
                        expected: expected.to_vec(),
                        actual: bias.dims().to_vec(),
                    });
                }
                Some(Param::from_tensor(bias))
            }
            (None, None) => None,
            (current, bias) => {
                return Err(LayerError::ParameterShape {
                    tensor: "bias",
                    expected: current.as_ref().map(|b| b.val().dims().to_vec()).unwrap_or_default(),
                    actual: bias.map(|b| b.dims().to_vec()).unwrap_or_default(),
                });
            }
        };

        tracing::info!("skipping parameter initialization");

        self.weight = Param::from_tensor(weight);
        self.bias = bias;

        Ok(self)
    }

    pub fn out_channels(&self) -> usize {
        self.weight.val().dims()[0]
    }

    pub fn kernel_size(&self) -> usize {
        self.weight.val().dims()[2]
    }

    fn geometry(&self) -> ConvGeometry {
        ConvGeometry {
            stride: self.stride,
            padding: self.padding,
            groups: self.groups,
        }
    }

    /// Checks the primary input against the gradient map and derives output shapes.
    pub fn reshape(
        &self,
        input: [usize; 4],
        gradient_map: [usize; 4],
    ) -> LayerResult<OrientedConvShapes> {
        let [batch, channels, height, width] = input;

        if channels != self.in_channels {
            return Err(LayerError::InputChannels {
                expected: self.in_channels,
                actual: channels,
            });
        }

        if gradient_map[1] != 2 {
            return Err(LayerError::GradientChannels(gradient_map[1]));
        }

        for (axis, input, gradient) in [
            ("batch", batch, gradient_map[0]),
            ("height", height, gradient_map[2]),
            ("width", width, gradient_map[3]),
        ] {
            if input != gradient {
                return Err(LayerError::GradientShapeMismatch {
                    axis,
                    input,
                    gradient,
                });
            }
        }

        let [out_h, out_w] = self.smoother.output_size(height, width)?;
        tracing::trace!(batch, out_h, out_w, "reshaped oriented convolution");

        Ok(OrientedConvShapes {
            output: [batch, self.out_channels(), out_h, out_w],
            orientation: [batch, 2, out_h, out_w],
        })
    }

    pub fn forward(
        &self,
        input: Tensor<B, 4>,
        gradient_map: Tensor<B, 4>,
    ) -> LayerResult<(OrientedConvOutput<B>, OrientedConvState<B>)> {
        let shapes = self.reshape(input.dims(), gradient_map.dims())?;
        let device = input.device();

        let field = estimate_orientation(&self.smoother, gradient_map)?;
        let alphas = interpolation_weights::<B>(field.host_radians().view(), &device);
        let bank = RotatedKernelBank::build(self.weight.val());

        let mut output = oriented_forward(input.clone(), &bank, alphas.clone(), &self.geometry());
        if let Some(bias) = &self.bias {
            output = output + bias.val().reshape([1, self.out_channels(), 1, 1]);
        }

        let state = OrientedConvState {
            input,
            bank,
            alphas,
            output_dims: shapes.output,
        };

        Ok((
            OrientedConvOutput {
                output,
                orientation: field.sin_cos,
                smoothed_gradients: field.smoothed,
                radians: field.radians,
            },
            state,
        ))
    }

    /// Propagates `grad_output` through the blend recorded in `state`.
    ///
    /// Gradients reach the primary input, the learned kernel (all four
    /// rotations folded back through their inverse permutations) and the
    /// bias. The gradient map is not differentiated: orientation is treated
    /// as a fixed function of the auxiliary input.
    pub fn backward(
        &self,
        state: &OrientedConvState<B>,
        grad_output: Tensor<B, 4>,
    ) -> LayerResult<OrientedConvGrads<B>> {
        let dims = grad_output.dims();
        if dims != state.output_dims {
            return Err(LayerError::ShapeMismatch {
                left: state.output_dims,
                right: dims,
            });
        }

        let (input, kernel_grads) = oriented_backward(
            state.input.clone(),
            grad_output.clone(),
            &state.bank,
            &state.alphas,
            &self.geometry(),
        );
        let weight = RotatedKernelBank::fold_gradients(kernel_grads);
        tracing::trace!(?dims, "oriented convolution backward");

        let bias = self.bias.as_ref().map(|_| {
            grad_output
                .sum_dim(0)
                .sum_dim(2)
                .sum_dim(3)
                .reshape([self.out_channels()])
        });

        Ok(OrientedConvGrads {
            input,
            weight,
            bias,
        })
    }
}
