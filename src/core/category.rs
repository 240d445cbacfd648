//! 节点分类

/// 区域条件与潜在图像合成
pub const CATEGORY_DAVEMANE: &str = "Davemane42";
/// Flux Kontext
pub const CATEGORY_FLUX_KONTEXT: &str = "Davemane42/FluxKontext";
/// 多图编辑
pub const CATEGORY_MULTI_IMAGE: &str = "Davemane42/Multi-Image";
/// 人体部位
pub const CATEGORY_HUMAN_BODY: &str = "Dave/Human Body";
