pub mod oriented_conv;
pub mod ssim;
