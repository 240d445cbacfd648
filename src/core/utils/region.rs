//! 区域计算
//!
//! 像素坐标与 ComfyUI conditioning `area` (8 像素单位) 之间的换算、裁剪与对齐。

use serde::Serialize;
use serde_json::Value;

/// 1 个 area 单位对应的像素数
pub const UNIT: u32 = 8;
/// 默认画布分辨率
pub const DEFAULT_RESOLUTION: u32 = 512;
/// 区域最小边长
pub const MIN_AREA_SIZE: u32 = 8;
/// 节点属性中坐标与尺寸的上限
pub const MAX_RESOLUTION: u32 = 16384;
/// 区域强度上限
pub const MAX_STRENGTH: f64 = 10.0;

pub const MIN_SIGMA: f64 = 0.0;
pub const MAX_SIGMA: f64 = 99.0;

/// 向上对齐到 8 的倍数, 超出 u32 时取不大于 v 的最大倍数
pub fn align_up_8(v: u32) -> u32 {
    (v.saturating_add(7) >> 3) << 3
}

/// 向下对齐到 8 的倍数
pub fn align_down_8(v: u32) -> u32 {
    (v >> 3) << 3
}

/// 区域参数 `[x, y, width, height, strength, rotation]`, 像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaParams {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub strength: f64,
    pub rotation: f64,
}

impl Default for AreaParams {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: DEFAULT_RESOLUTION,
            height: DEFAULT_RESOLUTION,
            strength: 1.0,
            rotation: 0.0,
        }
    }
}

impl AreaParams {
    /// 从节点属性中的一组数值解析区域参数
    ///
    /// 缺失或为 null 的槽位使用默认值; 任一槽位不是数字时整组回退为默认值。
    pub fn from_values(values: &[Value]) -> Self {
        let defaults = [0.0, 0.0, DEFAULT_RESOLUTION as f64, DEFAULT_RESOLUTION as f64, 1.0, 0.0];

        let mut slots = defaults;
        for (slot, value) in slots.iter_mut().zip(values.iter()) {
            match value {
                Value::Null => {}
                Value::Number(n) => match n.as_f64() {
                    Some(v) if v.is_finite() => *slot = v,
                    _ => return Self::default().normalize(),
                },
                _ => return Self::default().normalize(),
            }
        }

        let pixels = |v: f64| v.clamp(0.0, MAX_RESOLUTION as f64) as u32;
        Self {
            x: pixels(slots[0]),
            y: pixels(slots[1]),
            width: pixels(slots[2]),
            height: pixels(slots[3]),
            strength: slots[4],
            rotation: slots[5],
        }
        .normalize()
    }

    /// 限制参数范围
    fn normalize(mut self) -> Self {
        self.width = self.width.max(MIN_AREA_SIZE);
        self.height = self.height.max(MIN_AREA_SIZE);
        self.strength = self.strength.clamp(0.0, MAX_STRENGTH);
        self.rotation = self.rotation.clamp(-180.0, 180.0);
        self
    }

    /// 是否覆盖整个画布
    pub fn is_fullscreen(&self, res_x: u32, res_y: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == res_x && self.height == res_y
    }

    /// 裁剪到画布范围, 并将宽高向上对齐到 8
    pub fn clamp_to_canvas(mut self, res_x: u32, res_y: u32) -> Self {
        if self.x.saturating_add(self.width) > res_x {
            self.width = res_x.saturating_sub(self.x).max(MIN_AREA_SIZE);
        }
        if self.y.saturating_add(self.height) > res_y {
            self.height = res_y.saturating_sub(self.y).max(MIN_AREA_SIZE);
        }

        self.width = align_up_8(self.width);
        self.height = align_up_8(self.height);
        self
    }

    /// 转换为写入 conditioning 的区域补丁
    pub fn to_patch(&self) -> RegionPatch {
        RegionPatch {
            area: AreaUnits::from_pixels(self.x, self.y, self.width, self.height),
            strength: self.strength,
            rotation: Some(self.rotation),
            ..Default::default()
        }
    }
}

/// ComfyUI conditioning area, 单位为 8 像素
///
/// 对应 python 元组 `(height, width, y, x)`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AreaUnits {
    pub height: u32,
    pub width: u32,
    pub y: u32,
    pub x: u32,
}

impl AreaUnits {
    pub fn from_pixels(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            height: height / UNIT,
            width: width / UNIT,
            y: y / UNIT,
            x: x / UNIT,
        }
    }

    pub fn from_tuple((height, width, y, x): (u32, u32, u32, u32)) -> Self {
        Self {
            height,
            width,
            y,
            x,
        }
    }

    pub fn to_tuple(self) -> (u32, u32, u32, u32) {
        (self.height, self.width, self.y, self.x)
    }

    /// 像素矩形 `(x, y, width, height)`
    pub fn to_pixels(self) -> (u32, u32, u32, u32) {
        (
            self.x.saturating_mul(UNIT),
            self.y.saturating_mul(UNIT),
            self.width.saturating_mul(UNIT),
            self.height.saturating_mul(UNIT),
        )
    }

    /// 按比例放大区域
    pub fn upscale(self, scalar: f64) -> Self {
        let scale = |units: u32| scale_units(units, scalar);
        Self {
            height: scale(self.height),
            width: scale(self.width),
            y: scale(self.y),
            x: scale(self.x),
        }
    }

    /// 将区域从旧分辨率拉伸到新分辨率
    ///
    /// 调用方需保证分辨率均大于 0
    pub fn stretch(self, from: (u32, u32), to: (u32, u32)) -> Self {
        let sx = to.0 as f64 / from.0 as f64;
        let sy = to.1 as f64 / from.1 as f64;
        Self {
            height: scale_units(self.height, sy),
            width: scale_units(self.width, sx),
            y: scale_units(self.y, sy),
            x: scale_units(self.x, sx),
        }
    }
}

/// 单位 -> 像素 -> 缩放 -> 对齐 -> 单位
fn scale_units(units: u32, scalar: f64) -> u32 {
    let pixels = (units as f64 * UNIT as f64 * scalar).clamp(0.0, u32::MAX as f64) as u32;
    align_up_8(pixels) / UNIT
}

/// 写入 conditioning 属性字典的区域信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionPatch {
    pub area: AreaUnits,
    pub strength: f64,
    pub min_sigma: f64,
    pub max_sigma: f64,
    pub rotation: Option<f64>,
    /// 旋转中心 (像素)
    pub rotation_center: Option<(u32, u32)>,
    /// 自由标签
    pub tags: Vec<(&'static str, String)>,
}

impl Default for RegionPatch {
    fn default() -> Self {
        Self {
            area: AreaUnits::default(),
            strength: 1.0,
            min_sigma: MIN_SIGMA,
            max_sigma: MAX_SIGMA,
            rotation: None,
            rotation_center: None,
            tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn values(v: Value) -> Vec<Value> {
        v.as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn test_align() -> anyhow::Result<()> {
        assert_eq!(align_up_8(0), 0);
        assert_eq!(align_up_8(1), 8);
        assert_eq!(align_up_8(40), 40);
        assert_eq!(align_up_8(41), 48);
        assert_eq!(align_down_8(47), 40);
        assert_eq!(align_up_8(u32::MAX), u32::MAX - 7);
        Ok(())
    }

    #[test]
    fn test_huge_values_are_capped() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([8, 0, 1e10, 64, 1.0, 0.0])));
        assert_eq!(params.width, MAX_RESOLUTION);

        let clamped = params.clamp_to_canvas(512, 512);
        assert_eq!((clamped.x, clamped.width, clamped.height), (8, 504, 64));

        let far = AreaParams::from_values(&values(json!([1e12, 1e12, 1e12, 1e12])));
        let clamped = far.clamp_to_canvas(512, 512);
        assert_eq!((far.x, far.y), (MAX_RESOLUTION, MAX_RESOLUTION));
        assert_eq!((clamped.width, clamped.height), (MIN_AREA_SIZE, MIN_AREA_SIZE));
        Ok(())
    }

    #[test]
    fn test_scale_saturates() -> anyhow::Result<()> {
        let area = AreaUnits::from_tuple((1, 600_000_000, 0, 0));
        let upscaled = area.upscale(1.0);
        assert_eq!(upscaled.width, u32::MAX / UNIT);
        assert_eq!(upscaled.height, 1);

        let stretched = area.stretch((1, 1), (16384, 16384));
        assert_eq!(stretched.width, u32::MAX / UNIT);
        assert_eq!(area.to_pixels().2, u32::MAX);
        Ok(())
    }

    #[test]
    fn test_clamp_to_canvas_width() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([600, 0, 100, 64, 1.0, 0.0])));
        let clamped = params.clamp_to_canvas(640, 640);

        assert_eq!(clamped.width, 40);
        assert_eq!(clamped.height, 64);
        Ok(())
    }

    #[test]
    fn test_clamp_rounds_up_after_clipping() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([0, 500, 33, 100])));
        let clamped = params.clamp_to_canvas(512, 512);

        assert_eq!(clamped.width, 40);
        // 512 - 500 = 12 -> 16
        assert_eq!(clamped.height, 16);
        Ok(())
    }

    #[test]
    fn test_clamp_outside_canvas_keeps_min_size() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([700, 0, 64, 64])));
        let clamped = params.clamp_to_canvas(640, 640);
        assert_eq!(clamped.width, 8);
        Ok(())
    }

    #[test]
    fn test_from_values_defaults_and_limits() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([-5, 16, 2, null, 20.0, -400.0])));
        assert_eq!(params.x, 0);
        assert_eq!(params.y, 16);
        assert_eq!(params.width, 8);
        assert_eq!(params.height, 512);
        assert_eq!(params.strength, 10.0);
        assert_eq!(params.rotation, -180.0);

        let short = AreaParams::from_values(&values(json!([32, 32, 128, 128])));
        assert_eq!(short.strength, 1.0);
        assert_eq!(short.rotation, 0.0);

        let invalid = AreaParams::from_values(&values(json!([32, "a", 128, 128])));
        assert_eq!(invalid, AreaParams::default());
        Ok(())
    }

    #[test]
    fn test_fullscreen() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([0, 0, 512, 768])));
        assert!(params.is_fullscreen(512, 768));
        assert!(!params.is_fullscreen(512, 512));
        Ok(())
    }

    #[test]
    fn test_to_patch() -> anyhow::Result<()> {
        let params = AreaParams::from_values(&values(json!([64, 32, 256, 128, 0.5, 45.0])));
        let patch = params.clamp_to_canvas(512, 512).to_patch();

        assert_eq!(patch.area.to_tuple(), (16, 32, 4, 8));
        assert_eq!(patch.strength, 0.5);
        assert_eq!(patch.rotation, Some(45.0));
        assert_eq!(patch.min_sigma, 0.0);
        assert_eq!(patch.max_sigma, 99.0);
        Ok(())
    }

    #[test]
    fn test_upscale() -> anyhow::Result<()> {
        let area = AreaUnits::from_tuple((8, 8, 2, 1));
        assert_eq!(area.upscale(2.0).to_tuple(), (16, 16, 4, 2));

        // 8 px * 1.5 = 12 px -> 16 px -> 2 单位
        let area = AreaUnits::from_tuple((1, 1, 0, 0));
        assert_eq!(area.upscale(1.5).to_tuple(), (2, 2, 0, 0));
        Ok(())
    }

    #[test]
    fn test_stretch() -> anyhow::Result<()> {
        let area = AreaUnits::from_tuple((8, 8, 4, 2));
        let stretched = area.stretch((512, 512), (1024, 768));

        assert_eq!(stretched.width, 16);
        assert_eq!(stretched.x, 4);
        assert_eq!(stretched.height, 12);
        assert_eq!(stretched.y, 6);
        Ok(())
    }

    #[test]
    fn test_pixels_roundtrip_floor() -> anyhow::Result<()> {
        let area = AreaUnits::from_pixels(15, 9, 100, 64);
        assert_eq!(area.to_tuple(), (8, 12, 1, 1));
        assert_eq!(area.to_pixels(), (8, 8, 96, 64));
        Ok(())
    }
}
