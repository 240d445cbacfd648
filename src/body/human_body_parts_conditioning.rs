//! 人体部位条件
//!
//! 将输入 conditioning 复制到每个人体部位的区域上。

use log::{debug, error, info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyList, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use serde_json::Value;

use crate::{
    body::body_parts::{find_part, BodyLayout, PartConfig, BASE_HEIGHT, BASE_WIDTH},
    core::category::CATEGORY_HUMAN_BODY,
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, conditionings_rs2py},
        comfyui::{
            node_input::InputKwargs,
            types::{HIDDEN_EXTRA_PNGINFO, HIDDEN_UNIQUE_ID, NODE_CONDITIONING, NODE_INT},
            PromptServer,
        },
    },
};

/// 人体部位条件
#[pyclass(subclass)]
pub struct HumanBodyPartsConditioning {}

impl PromptServer for HumanBodyPartsConditioning {}

#[pymethods]
impl HumanBodyPartsConditioning {
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
    const CATEGORY: &'static str = CATEGORY_HUMAN_BODY;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Distribute one conditioning over the body-part regions laid out in the editor."
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
                required.set_item(
                    "conditioning",
                    (NODE_CONDITIONING, {
                        let params = PyDict::new(py);
                        params.set_item("tooltip", "Conditioning distributed to every body part")?;
                        params
                    }),
                )?;
                for (key, default, tooltip) in [
                    ("resolution_x", BASE_WIDTH, "Image width"),
                    ("resolution_y", BASE_HEIGHT, "Image height"),
                ] {
                    required.set_item(
                        key,
                        (NODE_INT, {
                            let params = PyDict::new(py);
                            params.set_item("default", default)?;
                            params.set_item("min", 64)?;
                            params.set_item("max", 4096)?;
                            params.set_item("step", 8)?;
                            params.set_item("tooltip", tooltip)?;
                            params
                        }),
                    )?;
                }
                required
            })?;

            dict.set_item("hidden", {
                let hidden = PyDict::new(py);
                hidden.set_item("extra_pnginfo", HIDDEN_EXTRA_PNGINFO)?;
                hidden.set_item("unique_id", HIDDEN_UNIQUE_ID)?;
                hidden
            })?;

            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute", signature = (conditioning, resolution_x, resolution_y, **kwargs))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        conditioning: Bound<'py, PyAny>,
        resolution_x: u32,
        resolution_y: u32,
        kwargs: Option<Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        info!("HumanBodyPartsConditioning resolution {resolution_x}x{resolution_y}");
        let layout = self.layout(&kwargs, resolution_x, resolution_y);
        let results = self.distribute(py, &conditioning, &layout, resolution_x, resolution_y);

        match results {
            Ok(v) => Ok((v.into_any(),)),
            Err(e) => {
                error!("HumanBodyPartsConditioning error, {e}");
                self.notify_error(py, "HumanBodyPartsConditioning", &e.to_string());
                Ok((conditioning,))
            }
        }
    }
}

impl HumanBodyPartsConditioning {
    /// 读取前端布局, 不存在时使用默认布局
    fn layout(&self, kwargs: &Option<Bound<'_, PyDict>>, res_x: u32, res_y: u32) -> BodyLayout {
        let node = kwargs
            .as_ref()
            .ok_or(Error::PyMissingKwargs("hidden inputs".to_string()))
            .and_then(|kwargs| InputKwargs::new(kwargs).workflow_node());

        let layout = match &node {
            Ok(node) => BodyLayout::from_properties(|key| node.property(key)),
            Err(e) => {
                warn!("body parts layout not found, {e}");
                None
            }
        };

        layout.unwrap_or_else(|| {
            info!("using default body parts layout");
            BodyLayout::default_for(res_x, res_y)
        })
    }

    fn distribute<'py>(
        &self,
        py: Python<'py>,
        conditioning: &Bound<'py, PyAny>,
        layout: &BodyLayout,
        res_x: u32,
        res_y: u32,
    ) -> Result<Bound<'py, PyList>, Error> {
        let items = conditionings_py2rs(conditioning)?;

        let mut results = Vec::with_capacity(items.len() * layout.parts.len());
        for (id, values) in layout.parts.iter() {
            let Some(part) = find_part(id) else {
                warn!("unknown body part {id}, skipped");
                continue;
            };
            let config = match values {
                Value::Array(values) => PartConfig::from_values(values),
                _ => None,
            };
            let Some(config) = config else {
                warn!("body part {id} has an invalid config {values}, skipped");
                continue;
            };

            let patch = config.to_patch(part, res_x, res_y);
            debug!("body part {id} area {:?}", patch.area.to_pixels());
            for item in items.iter() {
                results.push(item.with_region(&patch)?);
            }
        }

        info!(
            "HumanBodyPartsConditioning produced {} region entries",
            results.len()
        );
        conditionings_rs2py(py, results)
    }
}

#[cfg(test)]
mod tests {
    use pyo3::types::{PyAnyMethods, PyListMethods};

    use super::*;

    #[test]
    #[ignore]
    fn test_default_layout_distribution() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let torch = py.import("torch")?;
            let embedding = torch.getattr("zeros")?.call1(((1, 77, 768),))?;
            let conditioning = PyList::empty(py);
            conditioning.append(PyList::new(py, [embedding, PyDict::new(py).into_any()])?)?;

            let node = HumanBodyPartsConditioning::new();
            let layout = node.layout(&None, 640, 1024);
            let results = node.distribute(py, conditioning.as_any(), &layout, 640, 1024)?;
            assert_eq!(results.len(), 15);

            let head = results.get_item(0)?.get_item(1)?;
            let area: (u32, u32, u32, u32) = head.get_item("area")?.extract()?;
            assert_eq!(area, (28, 23, 6, 32));
            let body_part: String = head.get_item("body_part")?.extract()?;
            assert_eq!(body_part, "head");
            Ok(())
        })
    }
}
