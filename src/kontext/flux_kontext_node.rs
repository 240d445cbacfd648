//! Flux Kontext 编辑
//!
//! 图像预处理后叠加带种子的高斯噪声, 作为编辑推理的占位实现。

use candle_core::{Device, Tensor};
use log::{debug, error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use pythonize::pythonize;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::{
    core::{
        category::CATEGORY_FLUX_KONTEXT,
        utils::{
            aspect_ratio::{center_crop_box, KontextAspectRatio},
            noise::{gaussian_noise, resolve_seed, MAX_SEED},
            stitch::ensure_batch,
        },
    },
    error::Error,
    wrapper::{
        comfyui::{
            types::{
                HIDDEN_UNIQUE_ID, NODE_DICT, NODE_FLOAT, NODE_IMAGE, NODE_INT, NODE_MASK,
                NODE_STRING,
            },
            PromptServer,
        },
        torch::{
            nn::functional::resize_mask_bilinear,
            tensor::{to_like, TensorWrapper},
        },
    },
};

/// 噪声幅度
pub const NOISE_FACTOR: f64 = 0.02;
pub const MODEL_TYPE: &str = "flux_kontext";
pub const NODE_VERSION: &str = "1.0.0";

/// 编辑元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditMetadata {
    pub model_type: &'static str,
    pub original_prompt: String,
    pub used_prompt: String,
    pub aspect_ratio: String,
    pub guidance_scale: f64,
    pub num_steps: i64,
    pub seed: u64,
    pub node_version: &'static str,
}

/// 失败时的元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMetadata {
    pub model_type: &'static str,
    pub status: &'static str,
    pub error_message: String,
    pub original_prompt: String,
}

impl ErrorMetadata {
    pub fn new(error_message: String, original_prompt: String) -> Self {
        Self {
            model_type: MODEL_TYPE,
            status: "error",
            error_message,
            original_prompt,
        }
    }
}

/// 归一化到 [0, 1] 并按宽高比中心裁剪
///
/// 输入输出形状: [batch, height, width, channels]
pub fn preprocess_image(image: Tensor, ratio: KontextAspectRatio) -> Result<Tensor, Error> {
    let image = ensure_batch(image)?;

    let max = image.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    let image = if max > 1.0 {
        image.affine(1.0 / 255.0, 0.0)?
    } else {
        image
    };

    let (_, height, width, _) = image.dims4()?;
    let crop = center_crop_box(width, height, ratio.ratio());
    debug!("kontext crop {width}x{height} -> {crop:?}");

    Ok(image
        .narrow(1, crop.y, crop.height)?
        .narrow(2, crop.x, crop.width)?)
}

/// 叠加噪声, 有遮罩时只作用于遮罩区域
///
/// mask: [batch, height, width], 与图像同尺寸
pub fn apply_noise(image: &Tensor, seed: u64, mask: Option<&Tensor>) -> Result<Tensor, Error> {
    let noise = gaussian_noise(image.dims(), seed, image.device())?
        .to_dtype(image.dtype())?
        .affine(NOISE_FACTOR, 0.0)?;

    let noise = match mask {
        Some(mask) => {
            let mask = mask.to_dtype(image.dtype())?.unsqueeze(3)?;
            noise.broadcast_mul(&mask)?
        }
        None => noise,
    };

    Ok((image + noise)?.clamp(0f32, 1f32)?)
}

/// Flux Kontext 编辑
#[pyclass(subclass)]
pub struct FluxKontextNode {
    device: Device,
}

impl PromptServer for FluxKontextNode {}

#[pymethods]
impl FluxKontextNode {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_IMAGE, NODE_STRING, NODE_DICT)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("edited_image", "used_prompt", "edit_metadata")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_FLUX_KONTEXT;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Flux Kontext image edit. Crops the image to the aspect ratio and applies a seeded edit pass."
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
                    "image",
                    (NODE_IMAGE, {
                        let image = PyDict::new(py);
                        image.set_item("tooltip", "Source image to edit")?;
                        image
                    }),
                )?;
                required.set_item(
                    "prompt",
                    (NODE_STRING, {
                        let prompt = PyDict::new(py);
                        prompt.set_item("multiline", true)?;
                        prompt.set_item(
                            "default",
                            "Change the background to a beautiful sunset landscape",
                        )?;
                        prompt.set_item("tooltip", "Edit instruction")?;
                        prompt
                    }),
                )?;
                required.set_item(
                    "aspect_ratio",
                    (
                        KontextAspectRatio::iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>(),
                        {
                            let aspect_ratio = PyDict::new(py);
                            aspect_ratio
                                .set_item("default", KontextAspectRatio::default().to_string())?;
                            aspect_ratio.set_item("tooltip", "Aspect ratio, between 1:4 and 4:1")?;
                            aspect_ratio
                        },
                    ),
                )?;
                required.set_item(
                    "guidance_scale",
                    (NODE_FLOAT, {
                        let guidance_scale = PyDict::new(py);
                        guidance_scale.set_item("default", 7.0)?;
                        guidance_scale.set_item("min", 1.0)?;
                        guidance_scale.set_item("max", 20.0)?;
                        guidance_scale.set_item("step", 0.1)?;
                        guidance_scale.set_item("tooltip", "Prompt guidance strength")?;
                        guidance_scale
                    }),
                )?;
                required.set_item(
                    "num_inference_steps",
                    (NODE_INT, {
                        let steps = PyDict::new(py);
                        steps.set_item("default", 20)?;
                        steps.set_item("min", 1)?;
                        steps.set_item("max", 100)?;
                        steps.set_item("step", 1)?;
                        steps.set_item("tooltip", "Inference steps")?;
                        steps
                    }),
                )?;
                required.set_item(
                    "seed",
                    (NODE_INT, {
                        let seed = PyDict::new(py);
                        seed.set_item("default", -1)?;
                        seed.set_item("min", -1)?;
                        seed.set_item("max", MAX_SEED)?;
                        seed.set_item("tooltip", "Random seed, -1 for random")?;
                        seed
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "mask",
                    (NODE_MASK, {
                        let mask = PyDict::new(py);
                        mask.set_item("tooltip", "Limit the edit to the masked area")?;
                        mask
                    }),
                )?;
                optional.set_item(
                    "controlnet_image",
                    (NODE_IMAGE, {
                        let controlnet_image = PyDict::new(py);
                        controlnet_image.set_item("tooltip", "Optional structure guidance image")?;
                        controlnet_image
                    }),
                )?;
                optional
            })?;

            dict.set_item("hidden", {
                let hidden = PyDict::new(py);
                hidden.set_item("unique_id", HIDDEN_UNIQUE_ID)?;
                hidden
            })?;

            Ok(dict.into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(
        name = "execute",
        signature = (image, prompt, aspect_ratio, guidance_scale, num_inference_steps, seed, mask=None, controlnet_image=None, **kwargs)
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        image: Bound<'py, PyAny>,
        prompt: String,
        aspect_ratio: String,
        guidance_scale: f64,
        num_inference_steps: i64,
        seed: i64,
        mask: Option<Bound<'py, PyAny>>,
        controlnet_image: Option<Bound<'py, PyAny>>,
        kwargs: Option<Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyAny>, String, Bound<'py, PyAny>)> {
        let unique_id = kwargs
            .as_ref()
            .and_then(|kwargs| kwargs.get_item("unique_id").ok().flatten())
            .map(|v| v.to_string())
            .unwrap_or_default();
        info!("FluxKontextNode {unique_id} aspect ratio {aspect_ratio}, steps {num_inference_steps}, guidance {guidance_scale}");
        if controlnet_image.is_some() {
            debug!("controlnet image connected");
        }

        let results = self.edit(py, &image, &prompt, &aspect_ratio, seed, mask.as_ref());

        match results {
            Ok((edited, seed)) => {
                let used_prompt = prompt.trim().to_string();
                let metadata = EditMetadata {
                    model_type: MODEL_TYPE,
                    original_prompt: prompt,
                    used_prompt: used_prompt.clone(),
                    aspect_ratio,
                    guidance_scale,
                    num_steps: num_inference_steps,
                    seed,
                    node_version: NODE_VERSION,
                };
                let metadata = pythonize(py, &metadata)?;
                Ok((edited, used_prompt, metadata))
            }
            Err(e) => {
                error!("FluxKontextNode error, {e}");
                self.notify_error(py, "FluxKontextNode", &e.to_string());
                let metadata = ErrorMetadata::new(e.to_string(), prompt.clone());
                let metadata = pythonize(py, &metadata)?;
                Ok((image, prompt, metadata))
            }
        }
    }
}

impl FluxKontextNode {
    /// 返回编辑后的图像与实际使用的种子
    fn edit<'py>(
        &self,
        py: Python<'py>,
        image: &Bound<'py, PyAny>,
        prompt: &str,
        aspect_ratio: &str,
        seed: i64,
        mask: Option<&Bound<'py, PyAny>>,
    ) -> Result<(Bound<'py, PyAny>, u64), Error> {
        let ratio = aspect_ratio
            .parse::<KontextAspectRatio>()
            .map_err(|e| Error::ParseEnumString(format!("{aspect_ratio}, {e}")))?;
        let seed = resolve_seed(seed);
        debug!("kontext prompt {:?}, seed {seed}", prompt.trim());

        let tensor = TensorWrapper::<f32>::new(image, &self.device)?.into_tensor();
        let processed = preprocess_image(tensor, ratio)?;
        let (_, height, width, _) = processed.dims4()?;

        let mask = match mask {
            Some(mask) => {
                let mask = TensorWrapper::<f32>::new(mask, &self.device)?.into_tensor();
                Some(resize_mask_bilinear(py, &mask, width, height)?)
            }
            None => None,
        };

        let edited = apply_noise(&processed, seed, mask.as_ref())?;
        info!("FluxKontextNode edited {width}x{height}");

        let edited = TensorWrapper::<f32>::from_tensor(edited).to_py_tensor(py)?;
        Ok((to_like(&edited, image)?, seed))
    }
}
