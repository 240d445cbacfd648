//! 图片

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod multi_image_area_editor;
pub use multi_image_area_editor::{
    blend_by_mode, EditParams, EditSources, EditingMode, KontextMetadata, MultiImageAreaEditor,
};

/// 图片模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "image")?;
    submodule.add_class::<MultiImageAreaEditor>()?;
    Ok(submodule)
}

/// Image node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![NodeRegister(
        "MultiImageAreaEditor",
        py.get_type::<MultiImageAreaEditor>(),
        "🎨 Multi-Image Area Editor (Dave)",
    )];
    Ok(nodes)
}
