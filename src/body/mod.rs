//! Human Body

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod body_parts;

mod human_body_parts_conditioning;
pub use human_body_parts_conditioning::HumanBodyPartsConditioning;

mod human_body_parts_debug;
pub use human_body_parts_debug::{format_body_report, HumanBodyPartsDebug};

/// 人体部位模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "body")?;
    submodule.add_class::<HumanBodyPartsConditioning>()?;
    submodule.add_class::<HumanBodyPartsDebug>()?;
    Ok(submodule)
}

/// Human body node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "HumanBodyPartsConditioning",
            py.get_type::<HumanBodyPartsConditioning>(),
            "🎯 Human Body Parts - Smart Distribution (Dave)",
        ),
        NodeRegister(
            "HumanBodyPartsDebug",
            py.get_type::<HumanBodyPartsDebug>(),
            "Human Body Parts Debug (Dave)",
        ),
    ];
    Ok(nodes)
}
