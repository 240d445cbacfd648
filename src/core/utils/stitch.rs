//! 图像拼接
//!
//! 图像形状: [batch, height, width, channels]

use candle_core::{DType, Tensor};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::Error;

/// 拼接方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum StitchDirection {
    #[strum(to_string = "horizontal")]
    Horizontal,
    #[strum(to_string = "vertical")]
    Vertical,
}

/// 对齐方式
///
/// 垂直拼接时 top/bottom 分别表示左/右对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum StitchAlignment {
    #[strum(to_string = "top")]
    Top,
    #[strum(to_string = "center")]
    Center,
    #[strum(to_string = "bottom")]
    Bottom,
}

impl StitchAlignment {
    /// 将填充总量拆分为 (前, 后)
    pub fn split(&self, total: usize) -> (usize, usize) {
        match self {
            StitchAlignment::Top => (0, total),
            StitchAlignment::Bottom => (total, 0),
            StitchAlignment::Center => (total / 2, total - total / 2),
        }
    }
}

/// 3 维图像补齐 batch 维度
pub fn ensure_batch(image: Tensor) -> Result<Tensor, Error> {
    match image.rank() {
        3 => Ok(image.unsqueeze(0)?),
        4 => Ok(image),
        n => Err(Error::InvalidTensorShape(format!(
            "expected a 3D or 4D image, got {n}D"
        ))),
    }
}

/// 拼接图像
///
/// 先将次要维度零填充到最大值, 再在相邻图像之间插入间隙, 最后沿主轴拼接。
pub fn stitch_images(
    images: &[Tensor],
    direction: StitchDirection,
    alignment: StitchAlignment,
    gap: usize,
) -> Result<Tensor, Error> {
    if images.is_empty() {
        return Err(Error::ListEmpty);
    }

    // (填充维度, 拼接维度)
    let (pad_dim, cat_dim) = match direction {
        StitchDirection::Horizontal => (1, 2),
        StitchDirection::Vertical => (2, 1),
    };

    let images = images
        .iter()
        .map(|image| ensure_batch(image.to_dtype(DType::F32)?))
        .collect::<Result<Vec<_>, _>>()?;

    let (batch, _, _, channels) = images[0].dims4()?;
    for image in images.iter() {
        let (b, _, _, c) = image.dims4()?;
        if b != batch || c != channels {
            return Err(Error::InvalidTensorShape(format!(
                "cannot stitch [{b}, _, _, {c}] with [{batch}, _, _, {channels}]"
            )));
        }
    }

    let target = images
        .iter()
        .map(|image| image.dim(pad_dim))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .max()
        .unwrap_or_default();

    let mut parts = Vec::with_capacity(images.len() * 2);
    for (index, image) in images.iter().enumerate() {
        let current = image.dim(pad_dim)?;
        let aligned = if current < target {
            let (before, after) = alignment.split(target - current);
            image.pad_with_zeros(pad_dim, before, after)?
        } else {
            image.clone()
        };

        if index > 0 && gap > 0 {
            let mut shape = aligned.dims().to_vec();
            shape[cat_dim] = gap;
            parts.push(Tensor::zeros(shape, DType::F32, aligned.device())?);
        }
        parts.push(aligned);
    }

    Ok(Tensor::cat(&parts, cat_dim)?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use candle_core::Device;

    use super::*;

    #[test]
    fn test_alignment_split() -> anyhow::Result<()> {
        assert_eq!(StitchAlignment::Top.split(5), (0, 5));
        assert_eq!(StitchAlignment::Bottom.split(5), (5, 0));
        assert_eq!(StitchAlignment::Center.split(5), (2, 3));
        assert_eq!(StitchAlignment::from_str("center")?, StitchAlignment::Center);
        Ok(())
    }

    #[test]
    fn test_horizontal_stitch_pads_height() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::ones((1, 4, 2, 3), DType::F32, &device)?;
        let b = Tensor::ones((1, 2, 3, 3), DType::F32, &device)?;

        let out = stitch_images(
            &[a, b],
            StitchDirection::Horizontal,
            StitchAlignment::Center,
            1,
        )?;
        assert_eq!(out.dims(), &[1, 4, 6, 3]);

        // b 在高度上居中: 第 0 行与第 3 行为填充
        let column = out.narrow(2, 3, 1)?.narrow(3, 0, 1)?.flatten_all()?;
        assert_eq!(column.to_vec1::<f32>()?, vec![0.0, 1.0, 1.0, 0.0]);

        // 间隙列全为 0
        let gap = out.narrow(2, 2, 1)?.sum_all()?.to_scalar::<f32>()?;
        assert_eq!(gap, 0.0);
        Ok(())
    }

    #[test]
    fn test_vertical_stitch_pads_width() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::ones((1, 2, 4, 3), DType::F32, &device)?;
        let b = Tensor::ones((2, 3, 3), DType::F32, &device)?;

        let out = stitch_images(&[a, b], StitchDirection::Vertical, StitchAlignment::Top, 0)?;
        assert_eq!(out.dims(), &[1, 4, 4, 3]);

        // 左对齐: 最后一行最后一列为填充
        let pixel = out.narrow(1, 3, 1)?.narrow(2, 3, 1)?.sum_all()?;
        assert_eq!(pixel.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_stitch_rejects_channel_mismatch() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::ones((1, 2, 2, 3), DType::F32, &device)?;
        let b = Tensor::ones((1, 2, 2, 4), DType::F32, &device)?;

        let result = stitch_images(
            &[a, b],
            StitchDirection::Horizontal,
            StitchAlignment::Top,
            0,
        );
        assert!(result.is_err());
        Ok(())
    }
}
