//! 多潜在图像合成
//!
//! 将多个源 latent 按前端配置的位置与羽化宽度合成到目标 latent 上。

use candle_core::{Device, Tensor};
use log::{error, info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use serde_json::Value;

use crate::{
    core::{
        category::CATEGORY_DAVEMANE,
        utils::feather::{composite_layers, LayerPlacement},
    },
    error::Error,
    wrapper::{
        comfy::node_helpers::{latent_samples, latent_with_samples},
        comfyui::{
            node_input::{InputKwargs, WorkflowNode},
            types::{HIDDEN_EXTRA_PNGINFO, HIDDEN_UNIQUE_ID, NODE_LATENT},
            PromptServer,
        },
        torch::tensor::{to_like, TensorWrapper},
    },
};

/// 源输入名称前缀
const SOURCE_PREFIX: &str = "samples_from";

/// 解析图层位置 `[[x, y, feather], ...]`, 像素单位
pub fn parse_placements(values: Option<&Value>) -> Vec<LayerPlacement> {
    let Some(Value::Array(list)) = values else {
        return Vec::new();
    };

    let pixel = |entry: &Value, index: usize| {
        entry
            .get(index)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v.max(0.0) as usize)
            .unwrap_or_default()
    };

    list.iter()
        .map(|entry| LayerPlacement::from_pixels(pixel(entry, 0), pixel(entry, 1), pixel(entry, 2)))
        .collect()
}

/// `samples_fromN` 中的 N
pub fn source_index(key: &str) -> Option<usize> {
    key.strip_prefix(SOURCE_PREFIX)?.parse::<usize>().ok()
}

/// 多潜在图像合成
#[pyclass(subclass)]
pub struct MultiLatentComposite {
    device: Device,
}

impl PromptServer for MultiLatentComposite {}

#[pymethods]
impl MultiLatentComposite {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_LATENT,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("composite_latent",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DAVEMANE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Composite several latents onto a target with per-layer position and edge feathering."
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
                    "samples_to",
                    (NODE_LATENT, {
                        let params = PyDict::new(py);
                        params.set_item("tooltip", "Target latent, the base layer")?;
                        params
                    }),
                )?;
                required.set_item(
                    "samples_from0",
                    (NODE_LATENT, {
                        let params = PyDict::new(py);
                        params.set_item("tooltip", "Source latent composited onto the target")?;
                        params
                    }),
                )?;
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

    #[pyo3(name = "execute", signature = (samples_to, samples_from0, **kwargs))]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        samples_to: Bound<'py, PyAny>,
        samples_from0: Bound<'py, PyAny>,
        kwargs: Option<Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let results = self.composite(py, &samples_to, samples_from0, kwargs);

        match results {
            Ok(v) => Ok((v.into_any(),)),
            Err(e) => {
                error!("MultiLatentComposite error, {e}");
                self.notify_error(py, "MultiLatentComposite", &e.to_string());
                Ok((samples_to,))
            }
        }
    }
}

impl MultiLatentComposite {
    fn composite<'py>(
        &self,
        py: Python<'py>,
        samples_to: &Bound<'py, PyAny>,
        samples_from0: Bound<'py, PyAny>,
        kwargs: Option<Bound<'py, PyDict>>,
    ) -> Result<Bound<'py, PyDict>, Error> {
        let node = kwargs
            .as_ref()
            .ok_or(Error::PyMissingKwargs("hidden inputs".to_string()))
            .and_then(|kwargs| InputKwargs::new(kwargs).workflow_node());
        let placements = match node {
            Ok(node) => placements_of(&node),
            Err(e) => {
                warn!("latent layout not found, {e}");
                Vec::new()
            }
        };

        let sources = collect_sources(samples_from0, kwargs.as_ref());
        info!(
            "MultiLatentComposite {} sources, {} placements",
            sources.len(),
            placements.len()
        );
        if sources.len() > placements.len() {
            warn!(
                "{} sources have no placement, ignored",
                sources.len() - placements.len()
            );
        }

        let target_py = latent_samples(samples_to)?;
        let target = TensorWrapper::<f32>::new(&target_py, &self.device)?.into_tensor();

        let mut layers: Vec<(Tensor, LayerPlacement)> = Vec::new();
        for (index, (source, placement)) in sources.iter().zip(placements.iter()).enumerate() {
            let tensor = latent_samples(source)
                .and_then(|s| TensorWrapper::<f32>::new(&s, &self.device))
                .map(|w| w.into_tensor());
            match tensor {
                Ok(tensor) => layers.push((tensor, *placement)),
                Err(e) => warn!("source {index} skipped, {e}"),
            }
        }

        let (out, composited) = composite_layers(&target, &layers)?;
        info!("MultiLatentComposite composited {composited} layers");

        let out_py = TensorWrapper::<f32>::from_tensor(out).to_py_tensor(py)?;
        let out_py = to_like(&out_py, &target_py)?;
        latent_with_samples(samples_to, out_py)
    }
}

fn placements_of(node: &WorkflowNode) -> Vec<LayerPlacement> {
    parse_placements(node.property("values"))
}

/// samples_from0 以及按序号排序的 samples_fromN
fn collect_sources<'py>(
    samples_from0: Bound<'py, PyAny>,
    kwargs: Option<&Bound<'py, PyDict>>,
) -> Vec<Bound<'py, PyAny>> {
    let mut indexed = Vec::new();
    if let Some(kwargs) = kwargs {
        for (key, value) in kwargs.iter() {
            let Ok(key) = key.extract::<String>() else {
                continue;
            };
            match source_index(&key) {
                Some(n) if n > 0 && !value.is_none() => indexed.push((n, value)),
                _ => {}
            }
        }
    }
    indexed.sort_by_key(|(n, _)| *n);

    let mut sources = vec![samples_from0];
    sources.extend(indexed.into_iter().map(|(_, v)| v));
    sources
}
