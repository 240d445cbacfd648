//! Prompt Server

use log::error;
use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule},
    PyResult, PyTypeInfo, Python,
};

/// 前端事件通道
pub const EVENT_CHANNEL: &str = "davemane42";

/// comfyui PromptServer wrapper
pub trait PromptServer: PyTypeInfo {
    /// 节点执行出现异常时通知前端
    fn send_error(&self, py: Python, error_type: &str, message: &str) -> PyResult<()> {
        let server = PyModule::import(py, "server")?
            .getattr("PromptServer")?
            .getattr("instance")?;

        let error_data = PyDict::new(py);
        error_data.set_item("type", error_type)?;
        error_data.set_item("node", self.get_class_name(py)?)?;
        error_data.set_item("message", message)?;

        server
            .getattr("send_sync")?
            .call1((EVENT_CHANNEL, error_data))?;

        Ok(())
    }

    /// 通知前端, 失败时仅记录日志
    fn notify_error(&self, py: Python, error_type: &str, message: &str) {
        if let Err(e) = self.send_error(py, error_type, message) {
            error!("send error failed, {e}");
        }
    }

    /// Class 名称
    fn get_class_name(&self, py: Python) -> PyResult<String> {
        Self::type_object(py)
            .getattr("__name__")?
            .extract::<String>()
    }
}
