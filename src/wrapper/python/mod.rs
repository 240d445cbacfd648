//! python 包装

mod py_isinstance;
pub use py_isinstance::{is_torch_tensor, isinstance_by_torch, isinstance_py};

use pyo3::{
    types::{PyModule, PyModuleMethods},
    wrap_pyfunction, Bound, PyResult, Python,
};

/// python 工具模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "python")?;
    submodule.add_function(wrap_pyfunction!(isinstance_by_torch, &submodule)?)?;
    submodule.add_function(wrap_pyfunction!(isinstance_py, &submodule)?)?;
    Ok(submodule)
}
