//! comfy 相关封装

pub mod node_helpers;
