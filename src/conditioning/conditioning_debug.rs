//! 条件调试输出

use std::fmt::Write;

use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_DAVEMANE,
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, ConditioningAttrs},
        comfyui::{types::NODE_CONDITIONING, PromptServer},
    },
};

/// 条件调试输出
#[pyclass(subclass)]
pub struct ConditioningDebug {}

impl PromptServer for ConditioningDebug {}

#[pymethods]
impl ConditioningDebug {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_NODE")]
    fn output_node() -> bool {
        true
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types<'py>(py: Python<'py>) -> Bound<'py, PyTuple> {
        PyTuple::empty(py)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DAVEMANE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Log the area, strength, rotation and sigma range of every conditioning entry."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("conditioning", (NODE_CONDITIONING,))?;
                required
            })?;

            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        conditioning: Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyTuple>> {
        match self.report(&conditioning) {
            Ok(report) => info!("\n{report}"),
            Err(e) => {
                error!("ConditioningDebug error, {e}");
                self.notify_error(py, "ConditioningDebug", &e.to_string());
            }
        }
        Ok(PyTuple::empty(py))
    }
}

impl ConditioningDebug {
    fn report(&self, conditioning: &Bound<'_, PyAny>) -> Result<String, Error> {
        let entries = conditionings_py2rs(conditioning)?
            .iter()
            .map(|item| item.view())
            .collect::<Vec<_>>();
        Ok(format_report(&entries))
    }
}

/// 生成调试报告
pub fn format_report(entries: &[ConditioningAttrs]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Conditioning Debug Output");
    if entries.is_empty() {
        let _ = writeln!(out, "No conditioning data found");
        return out;
    }

    let na = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or("N/A".to_string());

    for (index, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "Conditioning Item {index}:");
        match entry.area {
            Some(area) => {
                let (x, y, w, h) = area.to_pixels();
                let _ = writeln!(out, "  Area (8px units): {:?}", area.to_tuple());
                let _ = writeln!(out, "  Pixel rect: x {x}, y {y}, width {w}, height {h}");
                let _ = writeln!(out, "  Strength: {}", na(entry.strength));
                let _ = writeln!(out, "  Rotation: {}°", na(entry.rotation));
                let _ = writeln!(
                    out,
                    "  Sigma range: {} - {}",
                    na(entry.min_sigma),
                    na(entry.max_sigma)
                );
            }
            None => {
                let _ = writeln!(out, "  Mode: Fullscreen");
            }
        }
        if !entry.other_keys.is_empty() {
            let _ = writeln!(out, "  Other attributes: {:?}", entry.other_keys);
        }
    }
    out
}
