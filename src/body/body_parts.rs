//! 人体部位
//!
//! 15 个部位的默认布局定义在 640x1024 的基准画布上。

use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::core::utils::region::{align_down_8, align_up_8, AreaUnits, RegionPatch, MAX_STRENGTH};

/// 基准画布宽
pub const BASE_WIDTH: u32 = 640;
/// 基准画布高
pub const BASE_HEIGHT: u32 = 1024;
/// 部位最小边长
pub const MIN_PART_SIZE: i64 = 32;

/// 部位分组
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum BodyCategory {
    HeadNeck,
    Core,
    UpperLimb,
    LowerLimb,
}

/// 部位定义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPart {
    pub id: &'static str,
    pub name: &'static str,
    pub category: BodyCategory,
    /// 基准画布上的默认位置 (x, y)
    pub default_pos: (u32, u32),
    /// 基准画布上的默认尺寸 (宽, 高)
    pub default_size: (u32, u32),
}

const fn part(
    id: &'static str,
    name: &'static str,
    category: BodyCategory,
    default_pos: (u32, u32),
    default_size: (u32, u32),
) -> BodyPart {
    BodyPart {
        id,
        name,
        category,
        default_pos,
        default_size,
    }
}

pub const BODY_PARTS: [BodyPart; 15] = [
    part("head", "Head", BodyCategory::HeadNeck, (256, 50), (180, 220)),
    part("neck", "Neck", BodyCategory::HeadNeck, (310, 260), (60, 80)),
    part("torso", "Torso", BodyCategory::Core, (200, 280), (240, 360)),
    part("left_upper_arm", "Left Upper Arm", BodyCategory::UpperLimb, (120, 320), (80, 160)),
    part("left_forearm", "Left Forearm", BodyCategory::UpperLimb, (80, 480), (70, 140)),
    part("left_hand", "Left Hand", BodyCategory::UpperLimb, (50, 620), (50, 80)),
    part("right_upper_arm", "Right Upper Arm", BodyCategory::UpperLimb, (480, 320), (80, 160)),
    part("right_forearm", "Right Forearm", BodyCategory::UpperLimb, (520, 480), (70, 140)),
    part("right_hand", "Right Hand", BodyCategory::UpperLimb, (590, 620), (50, 80)),
    part("left_thigh", "Left Thigh", BodyCategory::LowerLimb, (220, 640), (90, 180)),
    part("left_calf", "Left Calf", BodyCategory::LowerLimb, (200, 820), (80, 160)),
    part("left_foot", "Left Foot", BodyCategory::LowerLimb, (180, 980), (80, 60)),
    part("right_thigh", "Right Thigh", BodyCategory::LowerLimb, (340, 640), (90, 180)),
    part("right_calf", "Right Calf", BodyCategory::LowerLimb, (360, 820), (80, 160)),
    part("right_foot", "Right Foot", BodyCategory::LowerLimb, (380, 980), (80, 60)),
];

/// 按 id 查找部位
pub fn find_part(id: &str) -> Option<&'static BodyPart> {
    BODY_PARTS.iter().find(|p| p.id == id)
}

/// 单个部位的配置 `[x, y, w, h, strength, rotation]`, 像素坐标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartConfig {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub strength: f64,
    pub rotation: f64,
}

impl PartConfig {
    /// 解析数值数组, 至少需要 x, y, w, h
    pub fn from_values(values: &[Value]) -> Option<Self> {
        let number = |index: usize, default: Option<f64>| match values.get(index) {
            Some(v) => v.as_f64().filter(|v| v.is_finite()),
            None => default,
        };

        Some(Self {
            x: number(0, None)?,
            y: number(1, None)?,
            width: number(2, None)?,
            height: number(3, None)?,
            strength: number(4, Some(1.0))?,
            rotation: number(5, Some(0.0))?,
        })
    }

    /// 部位默认配置, 按分辨率从基准画布缩放
    pub fn default_for(part: &BodyPart, res_x: u32, res_y: u32) -> Self {
        let scale_x = |v: u32| (v as f64 * res_x as f64 / BASE_WIDTH as f64).trunc();
        let scale_y = |v: u32| (v as f64 * res_y as f64 / BASE_HEIGHT as f64).trunc();

        Self {
            x: scale_x(part.default_pos.0),
            y: scale_y(part.default_pos.1),
            width: scale_x(part.default_size.0),
            height: scale_y(part.default_size.1),
            strength: 1.0,
            rotation: 0.0,
        }
    }

    /// 裁剪到画布并对齐到 8, 生成区域补丁
    pub fn to_patch(&self, part: &BodyPart, res_x: u32, res_y: u32) -> RegionPatch {
        let (res_x, res_y) = (res_x as i64, res_y as i64);
        let w = (self.width.trunc() as i64).clamp(0, res_x);
        let h = (self.height.trunc() as i64).clamp(0, res_y);

        let x = (res_x - w).min(self.x.trunc() as i64).max(0);
        let y = (res_y - h).min(self.y.trunc() as i64).max(0);
        let w = (res_x - x).min(w).max(MIN_PART_SIZE);
        let h = (res_y - y).min(h).max(MIN_PART_SIZE);
        let strength = self.strength.clamp(0.0, MAX_STRENGTH);
        let rotation = self.rotation.rem_euclid(360.0);

        let ax = align_down_8(x as u32);
        let ay = align_down_8(y as u32);
        let aw = align_up_8(w as u32);
        let ah = align_up_8(h as u32);

        let (rotation, rotation_center) = if rotation != 0.0 {
            (Some(rotation), Some((ax + aw / 2, ay + ah / 2)))
        } else {
            (None, None)
        };

        RegionPatch {
            area: AreaUnits::from_pixels(ax, ay, aw, ah),
            strength,
            rotation,
            rotation_center,
            tags: vec![
                ("body_part", part.id.to_string()),
                ("body_part_name", part.name.to_string()),
                ("body_part_category", part.category.to_string()),
            ],
            ..Default::default()
        }
    }
}

/// 前端保存的部位布局, 保持前端写入的顺序
#[derive(Debug, Clone, PartialEq)]
pub struct BodyLayout {
    pub parts: Vec<(String, Value)>,
}

impl BodyLayout {
    /// 属性键, 按优先级
    pub const PROPERTY_KEYS: [&'static str; 2] = ["current_body_parts_config", "parts_config"];

    /// 从节点属性解析, 不存在或为空时返回 None
    pub fn from_properties<'a>(lookup: impl Fn(&str) -> Option<&'a Value>) -> Option<Self> {
        Self::PROPERTY_KEYS.iter().find_map(|key| match lookup(key) {
            Some(Value::Object(map)) if !map.is_empty() => Some(Self {
                parts: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            _ => None,
        })
    }

    /// 全部 15 个部位的默认布局
    pub fn default_for(res_x: u32, res_y: u32) -> Self {
        let parts = BODY_PARTS
            .iter()
            .map(|part| {
                let c = PartConfig::default_for(part, res_x, res_y);
                let values = Value::from(vec![c.x, c.y, c.width, c.height, c.strength, c.rotation]);
                (part.id.to_string(), values)
            })
            .collect();
        Self { parts }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(v: Value) -> Option<PartConfig> {
        PartConfig::from_values(v.as_array()?)
    }

    #[test]
    fn test_part_table() -> anyhow::Result<()> {
        assert_eq!(BODY_PARTS.len(), 15);
        let head = find_part("head").ok_or(anyhow::anyhow!("head"))?;
        assert_eq!(head.category, BodyCategory::HeadNeck);
        assert_eq!(head.category.to_string(), "head_neck");
        assert_eq!(
            find_part("right_foot").map(|p| p.category.as_ref()),
            Some("lower_limb")
        );
        assert!(find_part("tail").is_none());
        Ok(())
    }

    #[test]
    fn test_default_scaling() -> anyhow::Result<()> {
        let head = find_part("head").ok_or(anyhow::anyhow!("head"))?;
        let base = PartConfig::default_for(head, 640, 1024);
        assert_eq!((base.x, base.y, base.width, base.height), (256.0, 50.0, 180.0, 220.0));

        // 256 * 320 / 640 = 128, 50 * 500 / 1024 = 24.4 -> 24
        let scaled = PartConfig::default_for(head, 320, 500);
        assert_eq!((scaled.x, scaled.y), (128.0, 24.0));
        assert_eq!((scaled.width, scaled.height), (90.0, 107.0));
        Ok(())
    }

    #[test]
    fn test_patch_alignment() -> anyhow::Result<()> {
        let head = find_part("head").ok_or(anyhow::anyhow!("head"))?;
        let patch = PartConfig::default_for(head, 640, 1024).to_patch(head, 640, 1024);

        // x 256, y 50 -> 48, w 180 -> 184, h 220 -> 224
        assert_eq!(patch.area.to_tuple(), (28, 23, 6, 32));
        assert_eq!(patch.strength, 1.0);
        assert_eq!(patch.rotation, None);
        assert_eq!(patch.rotation_center, None);
        assert_eq!(patch.tags[0], ("body_part", "head".to_string()));
        assert_eq!(patch.tags[2], ("body_part_category", "head_neck".to_string()));
        Ok(())
    }

    #[test]
    fn test_patch_clamp() -> anyhow::Result<()> {
        let hand = find_part("right_hand").ok_or(anyhow::anyhow!("hand"))?;
        let c = config(json!([620, -10, 50, 10, 25.0, -90.0])).ok_or(anyhow::anyhow!("config"))?;
        let patch = c.to_patch(hand, 640, 1024);

        // x = min(640 - 50, 620) = 590 -> 584, w = min(50, 50) -> 56, h = max(32, 10) = 32
        let (x, y, w, h) = patch.area.to_pixels();
        assert_eq!((x, y, w, h), (584, 0, 56, 32));
        assert_eq!(patch.strength, 10.0);
        assert_eq!(patch.rotation, Some(270.0));
        assert_eq!(patch.rotation_center, Some((584 + 28, 16)));
        Ok(())
    }

    #[test]
    fn test_patch_extreme_sizes() -> anyhow::Result<()> {
        let head = find_part("head").ok_or(anyhow::anyhow!("head"))?;

        let negative = config(json!([0, 0, -1e30, 64])).ok_or(anyhow::anyhow!("config"))?;
        let patch = negative.to_patch(head, 640, 1024);
        assert_eq!(patch.area.to_pixels(), (0, 0, 32, 64));

        let huge = config(json!([1e30, 1e30, 1e30, 1e30])).ok_or(anyhow::anyhow!("config"))?;
        let patch = huge.to_patch(head, 640, 1024);
        assert_eq!(patch.area.to_pixels(), (0, 0, 640, 1024));

        let outside = config(json!([5000, 0, 64, 64])).ok_or(anyhow::anyhow!("config"))?;
        let patch = outside.to_patch(head, 640, 1024);
        assert_eq!(patch.area.to_pixels(), (576, 0, 64, 64));
        Ok(())
    }

    #[test]
    fn test_config_parsing() -> anyhow::Result<()> {
        assert_eq!(
            config(json!([1, 2, 3, 4])),
            Some(PartConfig {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                strength: 1.0,
                rotation: 0.0
            })
        );
        assert!(config(json!([1, 2, 3])).is_none());
        assert!(config(json!([1, "a", 3, 4])).is_none());
        Ok(())
    }

    #[test]
    fn test_layout_from_properties() -> anyhow::Result<()> {
        let properties = json!({
            "parts_config": {"head": [0, 0, 64, 64, 1, 0]},
            "current_body_parts_config": {"torso": [0, 0, 64, 64, 1, 0], "neck": [8, 8, 64, 64, 1, 0]},
        });
        let layout = BodyLayout::from_properties(|key| properties.get(key))
            .ok_or(anyhow::anyhow!("layout"))?;
        let ids = layout.parts.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["torso", "neck"]);

        let fallback = json!({"current_body_parts_config": {}, "parts_config": {"head": [0, 0, 64, 64]}});
        let layout = BodyLayout::from_properties(|key| fallback.get(key))
            .ok_or(anyhow::anyhow!("layout"))?;
        assert_eq!(layout.parts[0].0, "head");

        let empty = json!({});
        assert!(BodyLayout::from_properties(|key| empty.get(key)).is_none());

        assert_eq!(BodyLayout::default_for(640, 1024).parts.len(), 15);
        Ok(())
    }
}
