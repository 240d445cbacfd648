//! 条件区域拉伸

use log::{error, info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyList, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::{category::CATEGORY_DAVEMANE, utils::region::MAX_RESOLUTION},
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, conditionings_rs2py},
        comfyui::{
            types::{NODE_CONDITIONING, NODE_INT},
            PromptServer,
        },
    },
};

/// 条件区域拉伸
#[pyclass(subclass)]
pub struct ConditioningStretch {}

impl PromptServer for ConditioningStretch {}

#[pymethods]
impl ConditioningStretch {
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
        "Stretch conditioning areas from one canvas resolution to another."
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
                for key in ["resolutionX", "resolutionY", "newWidth", "newHeight"] {
                    required.set_item(
                        key,
                        (NODE_INT, {
                            let params = PyDict::new(py);
                            params.set_item("default", 512)?;
                            params.set_item("min", 64)?;
                            params.set_item("max", MAX_RESOLUTION)?;
                            params.set_item("step", 64)?;
                            params
                        }),
                    )?;
                }
                required
            })?;

            Ok(dict.into())
        })
    }

    #[allow(non_snake_case)]
    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        conditioning: Bound<'py, PyAny>,
        resolutionX: i64,
        resolutionY: i64,
        newWidth: i64,
        newHeight: i64,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        info!("ConditioningStretch {resolutionX}x{resolutionY} -> {newWidth}x{newHeight}");
        let Some((from, to)) = stretch_resolutions(resolutionX, resolutionY, newWidth, newHeight)
        else {
            warn!("ConditioningStretch invalid resolution, conditioning returned unchanged");
            return Ok((conditioning,));
        };

        let results = self.stretch(py, &conditioning, from, to);

        match results {
            Ok(v) => Ok((v.into_any(),)),
            Err(e) => {
                error!("ConditioningStretch error, {e}");
                self.notify_error(py, "ConditioningStretch", &e.to_string());
                Ok((conditioning,))
            }
        }
    }
}

impl ConditioningStretch {
    fn stretch<'py>(
        &self,
        py: Python<'py>,
        conditioning: &Bound<'py, PyAny>,
        from: (u32, u32),
        to: (u32, u32),
    ) -> Result<Bound<'py, PyList>, Error> {
        let items = conditionings_py2rs(conditioning)?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match item.area() {
                Some(area) => results.push(item.with_area(area.stretch(from, to))?),
                None => results.push(item),
            }
        }

        conditionings_rs2py(py, results)
    }
}

/// 校验拉伸前后的分辨率, 任一值不为正数时返回 None
pub fn stretch_resolutions(
    res_x: i64,
    res_y: i64,
    new_width: i64,
    new_height: i64,
) -> Option<((u32, u32), (u32, u32))> {
    let positive = |v: i64| u32::try_from(v).ok().filter(|v| *v > 0);
    Some((
        (positive(res_x)?, positive(res_y)?),
        (positive(new_width)?, positive(new_height)?),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretch_resolutions() -> anyhow::Result<()> {
        assert_eq!(
            stretch_resolutions(512, 512, 1024, 768),
            Some(((512, 512), (1024, 768)))
        );
        assert_eq!(stretch_resolutions(0, 512, 1024, 768), None);
        assert_eq!(stretch_resolutions(512, 512, 1024, -8), None);
        assert_eq!(stretch_resolutions(512, i64::MAX, 1024, 768), None);
        Ok(())
    }
}
