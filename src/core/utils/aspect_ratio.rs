//! 宽高比
//!
//! - Kontext 宽高比: 中心裁剪
//! - 编辑器宽高比: 按比例缩放到目标尺寸

use serde::Serialize;
use strum_macros::{Display, EnumIter, EnumString};

/// Kontext 中心裁剪的比例容差
pub const CROP_TOLERANCE: f64 = 0.05;

/// Kontext 支持的宽高比
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter, Serialize)]
pub enum KontextAspectRatio {
    #[strum(to_string = "1:4")]
    R1x4,
    #[strum(to_string = "2:7")]
    R2x7,
    #[strum(to_string = "3:8")]
    R3x8,
    #[strum(to_string = "9:21")]
    R9x21,
    #[strum(to_string = "9:16")]
    R9x16,
    #[strum(to_string = "2:3")]
    R2x3,
    #[strum(to_string = "3:4")]
    R3x4,
    #[default]
    #[strum(to_string = "1:1")]
    R1x1,
    #[strum(to_string = "4:3")]
    R4x3,
    #[strum(to_string = "3:2")]
    R3x2,
    #[strum(to_string = "16:9")]
    R16x9,
    #[strum(to_string = "21:9")]
    R21x9,
    #[strum(to_string = "8:3")]
    R8x3,
    #[strum(to_string = "7:2")]
    R7x2,
    #[strum(to_string = "4:1")]
    R4x1,
}

impl KontextAspectRatio {
    /// (宽, 高)
    pub fn parts(&self) -> (u32, u32) {
        match self {
            KontextAspectRatio::R1x4 => (1, 4),
            KontextAspectRatio::R2x7 => (2, 7),
            KontextAspectRatio::R3x8 => (3, 8),
            KontextAspectRatio::R9x21 => (9, 21),
            KontextAspectRatio::R9x16 => (9, 16),
            KontextAspectRatio::R2x3 => (2, 3),
            KontextAspectRatio::R3x4 => (3, 4),
            KontextAspectRatio::R1x1 => (1, 1),
            KontextAspectRatio::R4x3 => (4, 3),
            KontextAspectRatio::R3x2 => (3, 2),
            KontextAspectRatio::R16x9 => (16, 9),
            KontextAspectRatio::R21x9 => (21, 9),
            KontextAspectRatio::R8x3 => (8, 3),
            KontextAspectRatio::R7x2 => (7, 2),
            KontextAspectRatio::R4x1 => (4, 1),
        }
    }

    pub fn ratio(&self) -> f64 {
        let (w, h) = self.parts();
        w as f64 / h as f64
    }
}

/// 裁剪框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// 计算中心裁剪框
///
/// 当前比例与目标比例相差小于容差时保持原图。
pub fn center_crop_box(width: usize, height: usize, ratio: f64) -> CropBox {
    let full = CropBox {
        x: 0,
        y: 0,
        width,
        height,
    };
    if width == 0 || height == 0 || ratio <= 0.0 {
        return full;
    }

    let current = width as f64 / height as f64;
    if (current - ratio).abs() < CROP_TOLERANCE {
        return full;
    }

    if current > ratio {
        let new_width = ((height as f64 * ratio) as usize).clamp(1, width);
        CropBox {
            x: (width - new_width) / 2,
            y: 0,
            width: new_width,
            height,
        }
    } else {
        let new_height = ((width as f64 / ratio) as usize).clamp(1, height);
        CropBox {
            x: 0,
            y: (height - new_height) / 2,
            width,
            height: new_height,
        }
    }
}

/// 多图编辑器的宽高比
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter, Serialize)]
pub enum EditorAspectRatio {
    #[strum(to_string = "1:1")]
    R1x1,
    #[strum(to_string = "2:3")]
    R2x3,
    #[strum(to_string = "3:2")]
    R3x2,
    #[strum(to_string = "9:16")]
    R9x16,
    #[strum(to_string = "16:9")]
    R16x9,
    #[strum(to_string = "4:3")]
    R4x3,
    #[strum(to_string = "3:4")]
    R3x4,
    #[default]
    #[strum(to_string = "match_input")]
    MatchInput,
}

impl EditorAspectRatio {
    /// (宽, 高), `match_input` 返回 None
    pub fn parts(&self) -> Option<(u32, u32)> {
        match self {
            EditorAspectRatio::R1x1 => Some((1, 1)),
            EditorAspectRatio::R2x3 => Some((2, 3)),
            EditorAspectRatio::R3x2 => Some((3, 2)),
            EditorAspectRatio::R9x16 => Some((9, 16)),
            EditorAspectRatio::R16x9 => Some((16, 9)),
            EditorAspectRatio::R4x3 => Some((4, 3)),
            EditorAspectRatio::R3x4 => Some((3, 4)),
            EditorAspectRatio::MatchInput => None,
        }
    }

    /// 目标尺寸 (宽, 高)
    ///
    /// 保留较短的一边, 按比例缩小另一边。
    pub fn target_size(&self, width: usize, height: usize) -> (usize, usize) {
        let Some((rw, rh)) = self.parts() else {
            return (width, height);
        };
        if width == 0 || height == 0 {
            return (width, height);
        }

        let (rw, rh) = (rw as f64, rh as f64);
        if width as f64 / height as f64 > rw / rh {
            (((height as f64 * rw / rh) as usize).max(1), height)
        } else {
            (width, ((width as f64 * rh / rw) as usize).max(1))
        }
    }
}
