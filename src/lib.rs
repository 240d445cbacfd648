use pyo3::{
    pymodule,
    types::{PyDict, PyDictMethods, PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

pub mod core;
pub mod error;
pub mod wrapper;

pub mod body;
pub mod conditioning;
pub mod image;
pub mod kontext;
pub mod latent;

use crate::core::node::NodeRegister;

/// 初始化全局日志, 重复初始化时忽略
fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_ansi(true)
        .with_max_level(tracing::Level::DEBUG)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .try_init();
}

/// 全部节点
fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let mut nodes = Vec::new();
    nodes.extend(conditioning::node_register(py)?);
    nodes.extend(latent::node_register(py)?);
    nodes.extend(body::node_register(py)?);
    nodes.extend(kontext::node_register(py)?);
    nodes.extend(image::node_register(py)?);
    Ok(nodes)
}

/// A Python module implemented in Rust.
#[pymodule]
#[pyo3(name = "comfyui_dave_nodes")] // 需要与包名保持一致
fn py_init(py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    init_logger();

    m.add_submodule(&wrapper::submodule(py)?)?;
    m.add_submodule(&conditioning::submodule(py)?)?;
    m.add_submodule(&latent::submodule(py)?)?;
    m.add_submodule(&body::submodule(py)?)?;
    m.add_submodule(&kontext::submodule(py)?)?;
    m.add_submodule(&image::submodule(py)?)?;

    // 注册 ComfyUI NODE_CLASS_MAPPINGS/NODE_DISPLAY_NAME_MAPPINGS
    let node_mapping = PyDict::new(py);
    let name_mapping = PyDict::new(py);
    for NodeRegister(name, class, display_name) in node_register(py)? {
        node_mapping.set_item(name, class)?;
        name_mapping.set_item(name, display_name)?;
    }

    m.add("NODE_CLASS_MAPPINGS", node_mapping)?;
    m.add("NODE_DISPLAY_NAME_MAPPINGS", name_mapping)?;
    Ok(())
}
