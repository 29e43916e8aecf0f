use thiserror::Error;


#[derive(Debug, Error)]
pub enum LayerError {
    #[error("{what} must be nonzero")]
    ZeroDimension { what: &'static str },

    #[error("kernel must be square for rotation, got {height}x{width}")]
    NonSquareKernel { height: usize, width: usize },

    #[error("{what} channels ({channels}) must be a multiple of groups ({groups})")]
    GroupMismatch {
        what: &'static str,
        channels: usize,
        groups: usize,
    },

    #[error("`{name}` must be a positive constant, got {value}")]
    InvalidConstant { name: &'static str, value: f64 },

    #[error("kernel extent {kernel} exceeds padded input extent {padded} along {axis}")]
    KernelExceedsInput {
        axis: &'static str,
        kernel: usize,
        padded: usize,
    },

    #[error("gradient map must have 2 channels (Gx, Gy), got {0}")]
    GradientChannels(usize),

    #[error("input and gradient map disagree on {axis}: {input} vs {gradient}")]
    GradientShapeMismatch {
        axis: &'static str,
        input: usize,
        gradient: usize,
    },

    #[error("input has {actual} channels, layer expects {expected}")]
    InputChannels { expected: usize, actual: usize },

    #[error("compared tensors differ in shape: {left:?} vs {right:?}")]
    ShapeMismatch { left: [usize; 4], right: [usize; 4] },

    #[error("incorrect {tensor} shape: expected {expected:?}, got {actual:?}")]
    ParameterShape {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor readback failed: {0}")]
    TensorData(String),
}

pub type LayerResult<T> = Result<T, LayerError>;


pub(crate) fn ensure_nonzero(value: usize, what: &'static str) -> LayerResult<usize> {
    if value == 0 {
        return Err(LayerError::ZeroDimension { what });
    }

    Ok(value)
}
