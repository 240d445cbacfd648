//! 条件区域放大

use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyList, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_DAVEMANE,
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, conditionings_rs2py},
        comfyui::{
            types::{NODE_CONDITIONING, NODE_FLOAT},
            PromptServer,
        },
    },
};

/// 条件区域放大
#[pyclass(subclass)]
pub struct ConditioningUpscale {}

impl PromptServer for ConditioningUpscale {}

#[pymethods]
impl ConditioningUpscale {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_CONDITIONING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("conditioning",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DAVEMANE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Scale every conditioning area by a factor, keeping 8-pixel alignment."
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
                required.set_item(
                    "scalar",
                    (NODE_FLOAT, {
                        let params = PyDict::new(py);
                        params.set_item("default", 2.0)?;
                        params.set_item("min", 0.1)?;
                        params.set_item("max", 100.0)?;
                        params.set_item("step", 0.1)?;
                        params
                    }),
                )?;
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
        scalar: f64,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        info!("ConditioningUpscale scalar {scalar}");
        let results = self.upscale(py, &conditioning, scalar);

        match results {
            Ok(v) => Ok((v.into_any(),)),
            Err(e) => {
                error!("ConditioningUpscale error, {e}");
                self.notify_error(py, "ConditioningUpscale", &e.to_string());
                Ok((conditioning,))
            }
        }
    }
}

impl ConditioningUpscale {
    /// 仅处理像素单位的 area, 其余条目原样保留
    fn upscale<'py>(
        &self,
        py: Python<'py>,
        conditioning: &Bound<'py, PyAny>,
        scalar: f64,
    ) -> Result<Bound<'py, PyList>, Error> {
        if !scalar.is_finite() || scalar <= 0.0 {
            return Err(Error::InvalidParameter(format!("scalar {scalar}")));
        }

        let items = conditionings_py2rs(conditioning)?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match item.area() {
                Some(area) => results.push(item.with_area(area.upscale(scalar))?),
                None => results.push(item),
            }
        }

        conditionings_rs2py(py, results)
    }
}
