//! 类型定义
//! 相关节点定义: ComfyUI/comfy/comfy_types/node_typing.py

pub const NODE_INT: &str = "INT";
pub const NODE_FLOAT: &str = "FLOAT";
pub const NODE_STRING: &str = "STRING";
pub const NODE_BOOLEAN: &str = "BOOLEAN";
pub const NODE_DICT: &str = "DICT";
pub const NODE_IMAGE: &str = "IMAGE";
pub const NODE_MASK: &str = "MASK";
pub const NODE_CONDITIONING: &str = "CONDITIONING";
pub const NODE_LATENT: &str = "LATENT";

/// 隐藏输入: 工作流信息
pub const HIDDEN_EXTRA_PNGINFO: &str = "EXTRA_PNGINFO";
/// 隐藏输入: 节点 ID
pub const HIDDEN_UNIQUE_ID: &str = "UNIQUE_ID";
