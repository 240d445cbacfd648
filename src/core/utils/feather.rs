//! 潜在图像合成与边缘羽化
//!
//! 张量形状: [batch, channels, height, width], 坐标单位为 latent (8 像素)

use candle_core::{DType, Tensor};
use log::{debug, warn};

use crate::error::Error;

/// 图层位置与羽化宽度 (latent 单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPlacement {
    pub x: usize,
    pub y: usize,
    pub feather: usize,
}

impl LayerPlacement {
    /// 从像素坐标创建
    pub fn from_pixels(x: usize, y: usize, feather: usize) -> Self {
        Self {
            x: x / 8,
            y: y / 8,
            feather: feather / 8,
        }
    }
}

/// 一维线性羽化权重
///
/// `fade_start`/`fade_end` 表示该侧不贴合画布边缘, 需要渐变。
pub fn feather_weights(len: usize, feather: usize, fade_start: bool, fade_end: bool) -> Vec<f32> {
    let mut weights = vec![1.0f32; len];
    for t in 0..feather.min(len) {
        let fade = (t + 1) as f32 / feather as f32;
        if fade_start {
            weights[t] *= fade;
        }
        if fade_end {
            weights[len - 1 - t] *= fade;
        }
    }
    weights
}

/// 二维羽化遮罩, 形状 [1, 1, height, width]
pub fn feather_mask(
    rows: &[f32],
    cols: &[f32],
    device: &candle_core::Device,
) -> Result<Tensor, Error> {
    let mut data = Vec::with_capacity(rows.len() * cols.len());
    for r in rows {
        data.extend(cols.iter().map(|c| r * c));
    }
    let mask = Tensor::from_vec(data, (1, 1, rows.len(), cols.len()), device)?;
    Ok(mask)
}

/// 将单个源图层合成到目标上
///
/// 超出目标范围的部分会被裁剪; 完全位于目标之外时返回原目标。
pub fn composite_layer(
    target: &Tensor,
    source: &Tensor,
    placement: LayerPlacement,
) -> Result<Tensor, Error> {
    let (tb, tc, th, tw) = target.dims4()?;
    let (sb, sc, sh, sw) = source.dims4()?;
    let LayerPlacement { x, y, feather } = placement;

    if sc != tc {
        return Err(Error::InvalidTensorShape(format!(
            "channel mismatch, target {tc}, source {sc}"
        )));
    }
    if sb != tb && sb != 1 {
        return Err(Error::InvalidTensorShape(format!(
            "batch mismatch, target {tb}, source {sb}"
        )));
    }

    let max_y = (y + sh).min(th);
    let max_x = (x + sw).min(tw);
    if max_y <= y || max_x <= x {
        warn!("layer at ({x}, {y}) lies outside the target, skipped");
        return Ok(target.clone());
    }
    let (crop_h, crop_w) = (max_y - y, max_x - x);

    let cropped = source
        .narrow(2, 0, crop_h)?
        .narrow(3, 0, crop_w)?
        .to_dtype(target.dtype())?
        .broadcast_as((tb, tc, crop_h, crop_w))?
        .contiguous()?;

    let ranges = [0..tb, 0..tc, y..max_y, x..max_x];
    if feather == 0 {
        debug!("layer at ({x}, {y}) copied without feather");
        return Ok(target.slice_assign(&ranges, &cropped)?);
    }

    let rows = feather_weights(crop_h, feather, y > 0, max_y < th);
    let cols = feather_weights(crop_w, feather, x > 0, max_x < tw);
    let mask = feather_mask(&rows, &cols, target.device())?.to_dtype(target.dtype())?;
    let inv_mask = (1.0 - &mask)?;

    let region = target.narrow(2, y, crop_h)?.narrow(3, x, crop_w)?;
    let blended = (cropped.broadcast_mul(&mask)? + region.broadcast_mul(&inv_mask)?)?;

    debug!("layer at ({x}, {y}) blended with feather {feather}");
    Ok(target.slice_assign(&ranges, &blended.contiguous()?)?)
}

/// 依次合成多个图层, 单个图层失败时跳过并继续
pub fn composite_layers(
    target: &Tensor,
    layers: &[(Tensor, LayerPlacement)],
) -> Result<(Tensor, usize), Error> {
    let mut out = target.to_dtype(DType::F32)?;
    let mut composited = 0;
    for (index, (source, placement)) in layers.iter().enumerate() {
        match composite_layer(&out, source, *placement) {
            Ok(v) => {
                out = v;
                composited += 1;
            }
            Err(e) => warn!("layer {index} composite failed, {e}"),
        }
    }
    Ok((out, composited))
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn test_feather_weights() -> anyhow::Result<()> {
        let w = feather_weights(6, 2, true, true);
        assert_eq!(w, vec![0.5, 1.0, 1.0, 1.0, 1.0, 0.5]);

        let w = feather_weights(4, 2, false, true);
        assert_eq!(w, vec![1.0, 1.0, 1.0, 0.5]);

        // 羽化宽度超过长度时两侧叠加
        let w = feather_weights(2, 4, true, true);
        assert_eq!(w, vec![0.25 * 0.5, 0.5 * 0.25]);
        Ok(())
    }

    #[test]
    fn test_composite_without_feather() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((1, 1, 4, 4), DType::F32, &device)?;
        let source = Tensor::ones((1, 1, 2, 2), DType::F32, &device)?;

        let out = composite_layer(
            &target,
            &source,
            LayerPlacement {
                x: 1,
                y: 2,
                feather: 0,
            },
        )?;
        let rows = out.squeeze(0)?.squeeze(0)?.to_vec2::<f32>()?;
        assert_eq!(rows[0], vec![0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rows[2], vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(rows[3], vec![0.0, 1.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_composite_crops_at_edge() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((1, 1, 4, 4), DType::F32, &device)?;
        let source = Tensor::ones((1, 1, 3, 3), DType::F32, &device)?;

        let out = composite_layer(
            &target,
            &source,
            LayerPlacement {
                x: 3,
                y: 3,
                feather: 0,
            },
        )?;
        let total = out.sum_all()?.to_scalar::<f32>()?;
        assert_eq!(total, 1.0);
        Ok(())
    }

    #[test]
    fn test_composite_outside_target() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((1, 1, 4, 4), DType::F32, &device)?;
        let source = Tensor::ones((1, 1, 2, 2), DType::F32, &device)?;

        let out = composite_layer(
            &target,
            &source,
            LayerPlacement {
                x: 4,
                y: 0,
                feather: 0,
            },
        )?;
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_composite_with_feather() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((1, 1, 1, 8), DType::F32, &device)?;
        let source = Tensor::ones((1, 1, 1, 4), DType::F32, &device)?;

        let out = composite_layer(
            &target,
            &source,
            LayerPlacement {
                x: 2,
                y: 0,
                feather: 2,
            },
        )?;
        // 贴合上下边缘, 仅左右渐变
        let row = out.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(row, vec![0.0, 0.0, 0.5, 1.0, 1.0, 0.5, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_composite_broadcasts_source_batch() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((2, 1, 2, 2), DType::F32, &device)?;
        let source = Tensor::ones((1, 1, 2, 2), DType::F32, &device)?;

        let out = composite_layer(&target, &source, LayerPlacement::from_pixels(0, 0, 0))?;
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 8.0);
        Ok(())
    }

    #[test]
    fn test_composite_layers_skips_bad_layer() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let target = Tensor::zeros((1, 4, 2, 2), DType::F32, &device)?;
        let good = Tensor::ones((1, 4, 1, 1), DType::F32, &device)?;
        let bad = Tensor::ones((1, 3, 1, 1), DType::F32, &device)?;

        let (out, count) = composite_layers(
            &target,
            &[
                (bad, LayerPlacement::from_pixels(0, 0, 0)),
                (good, LayerPlacement::from_pixels(8, 8, 0)),
            ],
        )?;
        assert_eq!(count, 1);
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 4.0);
        Ok(())
    }
}
