//! 图像线性混合

use candle_core::Tensor;

use crate::error::Error;

/// 线性插值 `a * (1 - t) + b * t`
pub fn lerp(a: &Tensor, b: &Tensor, t: f64) -> Result<Tensor, Error> {
    let b = b.to_dtype(a.dtype())?;
    let out = (a.affine(1.0 - t, 0.0)? + b.affine(t, 0.0)?)?;
    Ok(out)
}

/// 加权累加 `a * 0.8 + b * 0.2 * strength`
pub fn accumulate(a: &Tensor, b: &Tensor, strength: f64) -> Result<Tensor, Error> {
    let b = b.to_dtype(a.dtype())?;
    let out = (a.affine(0.8, 0.0)? + b.affine(0.2 * strength, 0.0)?)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_lerp() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::zeros((1, 2, 2, 3), DType::F32, &device)?;
        let b = Tensor::ones((1, 2, 2, 3), DType::F32, &device)?;

        let out = lerp(&a, &b, 0.25)?;
        let v = out.flatten_all()?.to_vec1::<f32>()?;
        assert!(v.iter().all(|x| close(*x, 0.25)));

        let same = lerp(&a, &b, 0.0)?;
        assert_eq!(same.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_accumulate() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let a = Tensor::ones((1, 1, 1, 3), DType::F32, &device)?;
        let b = Tensor::ones((1, 1, 1, 3), DType::F32, &device)?;

        let out = accumulate(&a, &b, 0.5)?;
        let v = out.flatten_all()?.to_vec1::<f32>()?;
        assert!(v.iter().all(|x| close(*x, 0.9)));
        Ok(())
    }
}
