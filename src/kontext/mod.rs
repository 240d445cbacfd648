//! Flux Kontext

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod flux_kontext_node;
pub use flux_kontext_node::{
    apply_noise, preprocess_image, EditMetadata, ErrorMetadata, FluxKontextNode,
};

mod flux_kontext_image_stitch;
pub use flux_kontext_image_stitch::FluxKontextImageStitch;

/// Flux Kontext 模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "kontext")?;
    submodule.add_class::<FluxKontextNode>()?;
    submodule.add_class::<FluxKontextImageStitch>()?;
    Ok(submodule)
}

/// Flux Kontext node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "FluxKontextNode",
            py.get_type::<FluxKontextNode>(),
            "🎨 Flux Kontext Editor (Dave)",
        ),
        NodeRegister(
            "FluxKontextImageStitch",
            py.get_type::<FluxKontextImageStitch>(),
            "🔗 Flux Kontext Image Stitch (Dave)",
        ),
    ];
    Ok(nodes)
}
