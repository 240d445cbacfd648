//! python 原生对象或函数封装

use pyo3::{
    pyfunction,
    types::{PyAnyMethods, PyModule},
    Bound, PyAny, PyResult, Python,
};

/// Instance judgment of torch
/// py_type: torch.Tensor
#[pyfunction]
pub fn isinstance_by_torch<'py>(
    py: Python<'py>,
    py_any: &Bound<'py, PyAny>,
    py_type: &str,
) -> PyResult<bool> {
    let py_type = py_type.trim_start_matches("torch.");
    let torch_module = py.import("torch")?;
    let torch_type = torch_module.getattr(py_type)?;
    isinstance_py(py, py_any, &torch_type)
}

/// Python `isinstance` function wrapper
#[pyfunction]
pub fn isinstance_py<'py>(
    py: Python<'py>,
    py_any: &Bound<'py, PyAny>,
    py_type: &Bound<'py, PyAny>,
) -> PyResult<bool> {
    let builtins = PyModule::import(py, "builtins")?;
    let isinstance_fn = builtins.getattr("isinstance")?;
    isinstance_fn.call1((py_any, py_type))?.extract()
}

/// 是否为 torch.Tensor, torch 不可用时返回 false
pub fn is_torch_tensor<'py>(py: Python<'py>, py_any: &Bound<'py, PyAny>) -> bool {
    isinstance_by_torch(py, py_any, "torch.Tensor").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use pyo3::types::{PyInt, PyString};

    use super::*;

    #[test]
    #[ignore]
    fn test_isinstance_py() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let binding = PyString::new(py, "this is a str.");
            let py_any = binding.as_any();
            let py_type = py_any.get_type();
            assert!(isinstance_py(py, py_any, py_type.as_any())?);

            let binding = PyInt::new(py, 1);
            assert!(!isinstance_py(py, binding.as_any(), py_type.as_any())?);
            Ok(())
        })
    }

    #[test]
    #[ignore]
    fn test_is_torch_tensor() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let binding = PyString::new(py, "not a tensor");
            assert!(!is_torch_tensor(py, binding.as_any()));

            let tensor = py.import("torch")?.getattr("zeros")?.call1((2, 2))?;
            assert!(is_torch_tensor(py, &tensor));
            Ok(())
        })
    }
}
