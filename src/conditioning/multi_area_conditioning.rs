//! 多区域条件
//!
//! 将最多 4 路 conditioning 分别限制到前端绘制的矩形区域内。

use log::{debug, error, info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyList, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use serde_json::Value;

use crate::{
    core::{
        category::CATEGORY_DAVEMANE,
        utils::region::{AreaParams, DEFAULT_RESOLUTION},
    },
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, conditionings_rs2py, is_valid_conditioning},
        comfyui::{
            node_input::{InputKwargs, WorkflowNode},
            types::{HIDDEN_EXTRA_PNGINFO, HIDDEN_UNIQUE_ID, NODE_CONDITIONING, NODE_INT},
            PromptServer,
        },
    },
};

/// 区域槽位数量
pub const AREA_SLOTS: usize = 4;

/// 前端保存的区域布局
#[derive(Debug, Clone, PartialEq)]
pub struct AreaLayout {
    pub values: Vec<AreaParams>,
    pub width: u32,
    pub height: u32,
}

impl Default for AreaLayout {
    fn default() -> Self {
        Self {
            values: vec![AreaParams::default(); AREA_SLOTS],
            width: DEFAULT_RESOLUTION,
            height: DEFAULT_RESOLUTION,
        }
    }
}

impl AreaLayout {
    /// 从工作流节点属性解析, 缺失或格式错误的字段使用默认值
    pub fn from_node(node: &WorkflowNode) -> Self {
        let mut values = match node.property("values") {
            Some(Value::Array(list)) => list
                .iter()
                .map(|entry| match entry {
                    Value::Array(slots) => AreaParams::from_values(slots),
                    _ => AreaParams::default(),
                })
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        if values.len() < AREA_SLOTS {
            values.resize(AREA_SLOTS, AreaParams::default());
        }

        let resolution = |key: &str| {
            node.property_as::<f64>(key)
                .filter(|v| v.is_finite() && *v >= 1.0)
                .map(|v| v as u32)
                .unwrap_or(DEFAULT_RESOLUTION)
        };

        Self {
            values,
            width: resolution("width"),
            height: resolution("height"),
        }
    }

    /// 从隐藏输入解析, 失败时使用默认布局
    pub fn from_kwargs(kwargs: &Option<Bound<'_, PyDict>>) -> Self {
        let node = kwargs
            .as_ref()
            .ok_or(Error::PyMissingKwargs("hidden inputs".to_string()))
            .and_then(|kwargs| InputKwargs::new(kwargs).workflow_node());

        match node {
            Ok(node) => Self::from_node(&node),
            Err(e) => {
                warn!("area layout not found, using defaults, {e}");
                Self::default()
            }
        }
    }
}

/// 多区域条件
#[pyclass(subclass)]
pub struct MultiAreaConditioning {}

impl PromptServer for MultiAreaConditioning {}

#[pymethods]
impl MultiAreaConditioning {
    #[new]
    fn new() -> Self {
        Self {}
    }

    // 返回参数类型
    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_CONDITIONING, NODE_INT, NODE_INT)
    }

    // 返回参数名称
    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("conditioning", "resolutionX", "resolutionY")
    }

    // 节点分类
    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DAVEMANE;

    // 节点描述
    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Restrict up to four conditionings to rectangular areas with strength and rotation."
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
                required.set_item("conditioning0", (NODE_CONDITIONING,))?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                for slot in 1..AREA_SLOTS {
                    optional.set_item(format!("conditioning{slot}"), (NODE_CONDITIONING,))?;
                }
                optional
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

    #[pyo3(
        name = "execute",
        signature = (conditioning0, conditioning1=None, conditioning2=None, conditioning3=None, **kwargs)
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        conditioning0: Bound<'py, PyAny>,
        conditioning1: Option<Bound<'py, PyAny>>,
        conditioning2: Option<Bound<'py, PyAny>>,
        conditioning3: Option<Bound<'py, PyAny>>,
        kwargs: Option<Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>, u32, u32)> {
        let layout = AreaLayout::from_kwargs(&kwargs);
        info!(
            "MultiAreaConditioning canvas {}x{}, {} areas",
            layout.width,
            layout.height,
            layout.values.len()
        );

        let inputs = [
            Some(conditioning0.clone()),
            conditioning1,
            conditioning2,
            conditioning3,
        ];
        let results = self.apply_areas(py, &inputs, &layout);

        match results {
            Ok(v) => Ok((v.into_any(), layout.width, layout.height)),
            Err(e) => {
                error!("MultiAreaConditioning error, {e}");
                self.notify_error(py, "MultiAreaConditioning", &e.to_string());
                Ok((conditioning0, layout.width, layout.height))
            }
        }
    }
}

impl MultiAreaConditioning {
    /// 槽位 N 使用布局中的第 N 个区域
    fn apply_areas<'py>(
        &self,
        py: Python<'py>,
        inputs: &[Option<Bound<'py, PyAny>>],
        layout: &AreaLayout,
    ) -> Result<Bound<'py, PyList>, Error> {
        let mut results = Vec::new();
        for (slot, conditioning) in inputs.iter().enumerate() {
            let Some(conditioning) = conditioning else {
                continue;
            };
            let Some(params) = layout.values.get(slot) else {
                break;
            };
            if !is_valid_conditioning(py, conditioning) {
                warn!("conditioning{slot} is not a valid conditioning, skipped");
                continue;
            }

            let items = conditionings_py2rs(conditioning)?;
            if params.is_fullscreen(layout.width, layout.height) {
                debug!("conditioning{slot} fullscreen, {} entries", items.len());
                results.extend(items);
                continue;
            }

            let clamped = params.clamp_to_canvas(layout.width, layout.height);
            debug!("conditioning{slot} area {clamped:?}");
            let patch = clamped.to_patch();
            for item in items.iter() {
                results.push(item.with_region(&patch)?);
            }
        }

        conditionings_rs2py(py, results)
    }
}

#[cfg(test)]
mod tests {
    use pyo3::types::{PyAnyMethods, PyListMethods};
    use serde_json::json;

    use super::*;

    fn node(properties: Value) -> anyhow::Result<WorkflowNode> {
        Ok(serde_json::from_value(json!({
            "id": 5,
            "type": "MultiAreaConditioning",
            "properties": properties,
        }))?)
    }

    #[test]
    fn test_layout_from_node() -> anyhow::Result<()> {
        let node = node(json!({
            "values": [[0, 0, 768, 512, 1.0, 0.0], [64, 32, 256, 128, 0.5, 30.0]],
            "width": 768,
            "height": 512,
        }))?;
        let layout = AreaLayout::from_node(&node);

        assert_eq!((layout.width, layout.height), (768, 512));
        assert_eq!(layout.values.len(), AREA_SLOTS);
        assert!(layout.values[0].is_fullscreen(768, 512));
        assert_eq!(layout.values[1].strength, 0.5);
        assert_eq!(layout.values[1].rotation, 30.0);
        assert_eq!(layout.values[3], AreaParams::default());
        Ok(())
    }

    #[test]
    fn test_layout_defaults() -> anyhow::Result<()> {
        let layout = AreaLayout::from_node(&node(json!({}))?);
        assert_eq!(layout, AreaLayout::default());

        let layout = AreaLayout::from_node(&node(json!({
            "values": "broken",
            "width": "wide",
            "height": 0,
        }))?);
        assert_eq!(layout, AreaLayout::default());
        Ok(())
    }

    #[test]
    fn test_layout_bad_entry_falls_back() -> anyhow::Result<()> {
        let layout = AreaLayout::from_node(&node(json!({
            "values": [null, [8, 8, 64, 64]],
        }))?);
        assert_eq!(layout.values[0], AreaParams::default());
        assert_eq!(layout.values[1].width, 64);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_execute_applies_area() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let embedding = py.import("torch")?.getattr("zeros")?.call1((1, 77, 768))?;
            let entry = PyList::new(py, [embedding, PyDict::new(py).into_any()])?;
            let cond = PyList::new(py, [entry])?;

            let layout = AreaLayout {
                values: vec![AreaParams::from_values(&[json!(64), json!(64), json!(100), json!(100)])],
                width: 512,
                height: 512,
            };
            let node = MultiAreaConditioning::new();
            let out = node.apply_areas(py, &[Some(cond.into_any()), None], &layout)?;

            assert_eq!(out.len(), 1);
            let attrs = out.get_item(0)?.get_item(1)?;
            let area: (u32, u32, u32, u32) = attrs.get_item("area")?.extract()?;
            assert_eq!(area, (13, 13, 8, 8));
            Ok(())
        })
    }

    fn entry(py: Python<'_>, strength: f64) -> anyhow::Result<Bound<'_, PyList>> {
        let attrs = PyDict::new(py);
        attrs.set_item("strength", strength)?;
        let embedding = py.import("torch")?.getattr("zeros")?.call1((1, 77, 768))?;
        Ok(PyList::new(py, [embedding, attrs.into_any()])?)
    }

    #[test]
    #[ignore]
    fn test_fullscreen_area_passes_through() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let cond = PyList::new(py, [entry(py, 0.7)?, entry(py, 1.0)?])?;

            let layout = AreaLayout {
                values: vec![AreaParams::from_values(&[json!(0), json!(0), json!(512), json!(768)])],
                width: 512,
                height: 768,
            };
            let node = MultiAreaConditioning::new();
            let out = node.apply_areas(py, &[Some(cond.into_any())], &layout)?;

            assert_eq!(out.len(), 2);
            let attrs = out.get_item(0)?.get_item(1)?;
            let attrs = attrs.downcast::<PyDict>().map_err(|e| anyhow::anyhow!("{e}"))?;
            assert!(!attrs.contains("area")?);
            let strength = attrs.get_item("strength")?.ok_or(anyhow::anyhow!("strength"))?;
            assert_eq!(strength.extract::<f64>()?, 0.7);
            Ok(())
        })
    }
}
