//! ComfyUI 相关封装

pub mod node_input;
pub mod types;

mod prompt_server;
pub use prompt_server::PromptServer;
pub use prompt_server::EVENT_CHANNEL;
