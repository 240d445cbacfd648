//! 随机种子与高斯噪声

use candle_core::{Device, Shape, Tensor};
use rand::{Rng, SeedableRng};

use crate::error::Error;

/// 随机种子上限 (不含)
pub const MAX_SEED: i64 = 2147483647;

/// 解析种子, -1 表示随机生成
pub fn resolve_seed(seed: i64) -> u64 {
    if seed < 0 {
        rand::rng().random_range(0..MAX_SEED) as u64
    } else {
        seed as u64
    }
}

/// 生成标准正态分布噪声
///
/// 相同的种子产生相同的噪声。
pub fn gaussian_noise<S: Into<Shape>>(shape: S, seed: u64, device: &Device) -> Result<Tensor, Error> {
    let shape: Shape = shape.into();
    let count = shape.elem_count();
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);

    // Box-Muller
    let mut data = Vec::with_capacity(count + 1);
    while data.len() < count {
        let u1: f32 = rng.random::<f32>().max(f32::MIN_POSITIVE);
        let u2: f32 = rng.random::<f32>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        data.push(radius * theta.cos());
        data.push(radius * theta.sin());
    }
    data.truncate(count);

    Ok(Tensor::from_vec(data, shape, device)?)
}
