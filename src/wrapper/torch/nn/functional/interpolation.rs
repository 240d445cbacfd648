//! torch.nn.functional.interpolate 封装

use candle_core::Tensor;
use pyo3::{types::PyAnyMethods, IntoPyObject, Python};
use strum_macros::{Display, EnumString};

use crate::{error::Error, wrapper::torch::tensor::TensorWrapper};

/// 表示插值算法的枚举
///
/// mode: nearest|linear|bilinear|bicubic|trilinear|area|nearest-exact
#[derive(Debug, Clone, Copy, PartialEq, EnumString, Display)]
pub enum InterpolationMode {
    #[strum(to_string = "nearest")]
    Nearest,
    #[strum(to_string = "linear")]
    Linear,
    #[strum(to_string = "bilinear")]
    Bilinear,
    #[strum(to_string = "bicubic")]
    Bicubic,
    #[strum(to_string = "trilinear")]
    Trilinear,
    #[strum(to_string = "area")]
    Area,
    #[strum(to_string = "nearest-exact")]
    NearestExact,
}

/// Down/up samples the input.
///
/// Args:
/// size: optional, usize or (height, width)
/// scale_factor: optional, f32 or (f32,)
/// mode: InterpolationMode
/// align_corners: optional, bool
/// recompute_scale_factor: optional, bool
/// antialias: bool
#[allow(clippy::too_many_arguments)]
pub fn py_interpolate<'py, SIZE, SF>(
    py: Python<'py>,
    input: &Tensor,
    size: Option<SIZE>,
    scale_factor: Option<SF>,
    mode: InterpolationMode,
    align_corners: Option<bool>,
    recompute_scale_factor: Option<bool>,
    antialias: bool,
) -> Result<Tensor, Error>
where
    SIZE: IntoPyObject<'py>,
    SF: IntoPyObject<'py>,
{
    let device = input.device();

    let functional = py.import("torch")?.getattr("nn")?.getattr("functional")?;
    let py_input = TensorWrapper::<f32>::from_tensor(input.clone()).to_py_tensor(py)?;

    let args = (
        py_input,
        size,
        scale_factor,
        mode.to_string(),
        align_corners,
        recompute_scale_factor,
        antialias,
    );

    let py_any = functional.call_method1("interpolate", args)?;
    let result = TensorWrapper::<f32>::new(&py_any, device)?.into_tensor();
    Ok(result)
}

/// 双线性缩放图像
///
/// 输入输出形状: [batch, height, width, channels]
pub fn resize_image_bilinear(
    py: Python<'_>,
    image: &Tensor,
    width: usize,
    height: usize,
) -> Result<Tensor, Error> {
    let (_, h, w, _) = image.dims4()?;
    if (h, w) == (height, width) {
        return Ok(image.clone());
    }

    let nchw = image.permute((0, 3, 1, 2))?.contiguous()?;
    let resized = py_interpolate(
        py,
        &nchw,
        Some((height, width)),
        None::<f32>,
        InterpolationMode::Bilinear,
        Some(false),
        None,
        false,
    )?;
    Ok(resized.permute((0, 2, 3, 1))?.contiguous()?)
}

/// 双线性缩放遮罩
///
/// 输入 [height, width] 或 [batch, height, width], 输出 [batch, height, width]
pub fn resize_mask_bilinear(
    py: Python<'_>,
    mask: &Tensor,
    width: usize,
    height: usize,
) -> Result<Tensor, Error> {
    let mask = match mask.rank() {
        2 => mask.unsqueeze(0)?,
        3 => mask.clone(),
        n => {
            return Err(Error::InvalidTensorShape(format!(
                "expected a 2D or 3D mask, got {n}D"
            )))
        }
    };
    let (_, h, w) = mask.dims3()?;
    if (h, w) == (height, width) {
        return Ok(mask);
    }

    let resized = py_interpolate(
        py,
        &mask.unsqueeze(1)?,
        Some((height, width)),
        None::<f32>,
        InterpolationMode::Bilinear,
        Some(false),
        None,
        false,
    )?;
    Ok(resized.squeeze(1)?)
}
