//! Conditioning

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod multi_area_conditioning;
pub use multi_area_conditioning::{AreaLayout, MultiAreaConditioning};

mod conditioning_upscale;
pub use conditioning_upscale::ConditioningUpscale;

mod conditioning_stretch;
pub use conditioning_stretch::{stretch_resolutions, ConditioningStretch};

mod conditioning_debug;
pub use conditioning_debug::{format_report, ConditioningDebug};

/// 条件模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "conditioning")?;
    submodule.add_class::<MultiAreaConditioning>()?;
    submodule.add_class::<ConditioningUpscale>()?;
    submodule.add_class::<ConditioningStretch>()?;
    submodule.add_class::<ConditioningDebug>()?;
    Ok(submodule)
}

/// Conditioning node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "MultiAreaConditioning",
            py.get_type::<MultiAreaConditioning>(),
            "Multi Area Conditioning (Dave)",
        ),
        NodeRegister(
            "ConditioningUpscale",
            py.get_type::<ConditioningUpscale>(),
            "Conditioning Upscale (Dave)",
        ),
        NodeRegister(
            "ConditioningStretch",
            py.get_type::<ConditioningStretch>(),
            "Conditioning Stretch (Dave)",
        ),
        NodeRegister(
            "ConditioningDebug",
            py.get_type::<ConditioningDebug>(),
            "Conditioning Debug (Dave)",
        ),
    ];
    Ok(nodes)
}
