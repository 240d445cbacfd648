//! Latent

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod multi_latent_composite;
pub use multi_latent_composite::{parse_placements, source_index, MultiLatentComposite};

/// 潜在图像模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "latent")?;
    submodule.add_class::<MultiLatentComposite>()?;
    Ok(submodule)
}

/// Latent node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![NodeRegister(
        "MultiLatentComposite",
        py.get_type::<MultiLatentComposite>(),
        "Multi Latent Composite (Dave)",
    )];
    Ok(nodes)
}
