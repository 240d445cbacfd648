//! 人体部位条件调试

use std::fmt::Write;

use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_HUMAN_BODY,
    error::Error,
    wrapper::{
        comfy::node_helpers::{conditionings_py2rs, ConditioningAttrs},
        comfyui::{
            types::{NODE_CONDITIONING, NODE_STRING},
            PromptServer,
        },
    },
};

/// 人体部位条件调试
#[pyclass(subclass)]
pub struct HumanBodyPartsDebug {}

impl PromptServer for HumanBodyPartsDebug {}

#[pymethods]
impl HumanBodyPartsDebug {
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
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("debug_info",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_HUMAN_BODY;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Describe the body-part regions carried by a conditioning."
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
                        params.set_item("tooltip", "Conditioning to inspect")?;
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
    ) -> PyResult<(String,)> {
        match self.report(&conditioning) {
            Ok(report) => {
                info!("HumanBodyPartsDebug inspected conditioning");
                Ok((report,))
            }
            Err(e) => {
                error!("HumanBodyPartsDebug error, {e}");
                self.notify_error(py, "HumanBodyPartsDebug", &e.to_string());
                Ok((format!("Debug error: {e}"),))
            }
        }
    }
}

impl HumanBodyPartsDebug {
    fn report(&self, conditioning: &Bound<'_, PyAny>) -> Result<String, Error> {
        let entries = conditionings_py2rs(conditioning)?
            .iter()
            .map(|item| item.view())
            .collect::<Vec<_>>();
        Ok(format_body_report(&entries))
    }
}

/// 生成部位调试信息
pub fn format_body_report(entries: &[ConditioningAttrs]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Human Body Parts Conditioning ===");

    for (index, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "Conditioning #{}:", index + 1);
        let _ = writeln!(out, "  Tensor shape: {:?}", entry.embedding_shape);

        if let Some(part) = &entry.body_part {
            let name = entry.body_part_name.as_deref().unwrap_or("Unknown");
            let _ = writeln!(out, "  Body part: {name} ({part})");
        }
        if let Some(category) = &entry.body_part_category {
            let _ = writeln!(out, "  Category: {category}");
        }
        if let Some(area) = entry.area {
            let (x, y, w, h) = area.to_pixels();
            let _ = writeln!(out, "  Area: x={x}, y={y}, w={w}, h={h}");
        }
        if let Some(strength) = entry.strength {
            let _ = writeln!(out, "  Strength: {strength:.3}");
        }
        if let Some(rotation) = entry.rotation {
            let _ = writeln!(out, "  Rotation: {rotation:.1}°");
            if let Some((cx, cy)) = entry.rotation_center {
                let _ = writeln!(out, "  Rotation center: ({cx}, {cy})");
            }
        }
        let _ = writeln!(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::core::utils::region::AreaUnits;

    use super::*;

    #[test]
    fn test_format_body_report() -> anyhow::Result<()> {
        let entries = vec![
            ConditioningAttrs {
                embedding_shape: vec![1, 77, 768],
                area: Some(AreaUnits::from_tuple((28, 23, 6, 32))),
                strength: Some(1.0),
                rotation: Some(90.0),
                rotation_center: Some((348.0, 160.0)),
                body_part: Some("head".to_string()),
                body_part_name: Some("Head".to_string()),
                body_part_category: Some("head_neck".to_string()),
                ..Default::default()
            },
            ConditioningAttrs::default(),
        ];

        let report = format_body_report(&entries);
        assert!(report.contains("Tensor shape: [1, 77, 768]"));
        assert!(report.contains("Body part: Head (head)"));
        assert!(report.contains("Category: head_neck"));
        assert!(report.contains("Area: x=256, y=48, w=184, h=224"));
        assert!(report.contains("Strength: 1.000"));
        assert!(report.contains("Rotation: 90.0°"));
        assert!(report.contains("Rotation center: (348, 160)"));
        assert!(report.contains("Conditioning #2:\n  Tensor shape: []\n\n"));
        Ok(())
    }
}
