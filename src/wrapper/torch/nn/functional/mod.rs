//! torch.nn.functional

mod interpolation;
pub use interpolation::{
    py_interpolate, resize_image_bilinear, resize_mask_bilinear, InterpolationMode,
};
