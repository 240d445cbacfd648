//! 工具
//!
//! 纯数值计算, 不依赖 python

pub mod aspect_ratio;
pub mod blend;
pub mod feather;
pub mod noise;
pub mod region;
pub mod stitch;
