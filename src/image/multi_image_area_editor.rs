//! 多图区域编辑器
//!
//! 按编辑模式将源图像、风格参考或上一轮结果混合到基础图像上。

use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use log::{debug, error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    core::{
        category::CATEGORY_MULTI_IMAGE,
        utils::{
            aspect_ratio::EditorAspectRatio,
            blend::{accumulate, lerp},
            stitch::ensure_batch,
        },
    },
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_BOOLEAN, NODE_FLOAT, NODE_IMAGE, NODE_INT, NODE_MASK, NODE_STRING},
            PromptServer,
        },
        torch::{
            nn::functional::resize_image_bilinear,
            tensor::{to_like, TensorWrapper},
        },
    },
};

/// 源图像槽位数量
pub const SOURCE_SLOTS: usize = 4;
/// 多轮编辑的模拟迭代上限
pub const MAX_SIMULATED_ROUNDS: u32 = 3;
pub const KONTEXT_VERSION: &str = "1.0";

/// 编辑模式
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EditingMode {
    #[default]
    LocalEdit,
    StyleTransfer,
    CharacterConsistency,
    MultiRoundEdit,
}

/// 编辑参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditParams {
    pub mode: EditingMode,
    pub aspect_ratio: EditorAspectRatio,
    pub guidance_scale: f64,
    pub max_iterations: u32,
    pub preserve_character: bool,
    pub context_strength: f64,
}

/// 输出的 JSON 元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KontextMetadata {
    pub editing_mode: EditingMode,
    pub aspect_ratio: String,
    pub guidance_scale: f64,
    pub num_source_images: usize,
    pub preserve_character: bool,
    pub context_strength: f64,
    pub kontext_version: &'static str,
    pub supports_iterative: bool,
    pub supports_regional: bool,
}

impl KontextMetadata {
    pub fn new(params: &EditParams, num_source_images: usize) -> Self {
        Self {
            editing_mode: params.mode,
            aspect_ratio: params.aspect_ratio.to_string(),
            guidance_scale: params.guidance_scale,
            num_source_images,
            preserve_character: params.preserve_character,
            context_strength: params.context_strength,
            kontext_version: KONTEXT_VERSION,
            supports_iterative: true,
            supports_regional: true,
        }
    }
}

/// 混合输入, 所有图像已缩放到基础图像尺寸
pub struct EditSources {
    pub base: Tensor,
    /// (源图像, 提示词), 按槽位
    pub slots: Vec<Option<(Tensor, String)>>,
    pub reference: Option<Tensor>,
    pub previous: Option<Tensor>,
}

impl EditSources {
    fn sources(&self) -> impl Iterator<Item = &Tensor> {
        self.slots.iter().flatten().map(|(t, _)| t)
    }
}

/// 按编辑模式混合
pub fn blend_by_mode(inputs: &EditSources, params: &EditParams) -> Result<Tensor, Error> {
    let base = &inputs.base;
    let mut result = base.clone();

    match params.mode {
        EditingMode::LocalEdit => {
            for (source, prompt) in inputs.slots.iter().flatten() {
                if prompt.trim().is_empty() {
                    continue;
                }
                result = lerp(&result, source, params.context_strength)?;
            }
        }
        EditingMode::StyleTransfer => {
            if let Some(reference) = &inputs.reference {
                let factor = if params.preserve_character { 0.3 } else { 0.7 };
                result = lerp(base, reference, factor)?;
            }
        }
        EditingMode::CharacterConsistency => {
            for source in inputs.sources() {
                result = accumulate(&result, source, params.context_strength)?;
            }
        }
        EditingMode::MultiRoundEdit => {
            if let Some(previous) = &inputs.previous {
                result = previous.clone();
            }
            for _ in 0..params.max_iterations.min(MAX_SIMULATED_ROUNDS) {
                result = lerp(&result, base, 0.05)?;
            }
        }
    }

    Ok(result)
}

/// 图像形状中的 (高, 宽)
///
/// 支持 [height, width, channels] 与 [batch, height, width, channels]
pub fn image_hw(shape: &[usize]) -> Option<(usize, usize)> {
    match shape {
        [h, w, _] | [_, h, w, _] => Some((*h, *w)),
        _ => None,
    }
}

/// 缺省的分图提示词
fn default_prompt(slot: usize) -> String {
    format!("Edit the region of image {}, keep natural transitions", slot + 1)
}

/// 多图区域编辑器
#[pyclass(subclass)]
pub struct MultiImageAreaEditor {
    device: Device,
}

impl PromptServer for MultiImageAreaEditor {}

#[pymethods]
impl MultiImageAreaEditor {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str, &'static str) {
        (NODE_IMAGE, NODE_STRING, NODE_STRING, NODE_MASK, NODE_IMAGE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str, &'static str) {
        (
            "edited_image",
            "edit_log",
            "kontext_metadata",
            "combined_mask",
            "stitch_preview",
        )
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_MULTI_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Blend several source images into a base image by editing mode, with a stitched preview."
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
                required.set_item("base_image", (NODE_IMAGE,))?;
                required.set_item(
                    "kontext_prompt",
                    (NODE_STRING, {
                        let prompt = PyDict::new(py);
                        prompt.set_item("multiline", true)?;
                        prompt.set_item(
                            "default",
                            "High quality composition, blend every region seamlessly, keep characters consistent",
                        )?;
                        prompt
                    }),
                )?;
                required.set_item(
                    "editing_mode",
                    (
                        EditingMode::iter().map(|v| v.to_string()).collect::<Vec<_>>(),
                        {
                            let mode = PyDict::new(py);
                            mode.set_item("default", EditingMode::default().to_string())?;
                            mode
                        },
                    ),
                )?;
                required.set_item(
                    "aspect_ratio",
                    (
                        EditorAspectRatio::iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>(),
                        {
                            let aspect_ratio = PyDict::new(py);
                            aspect_ratio
                                .set_item("default", EditorAspectRatio::default().to_string())?;
                            aspect_ratio
                        },
                    ),
                )?;
                required.set_item(
                    "guidance_scale",
                    (NODE_FLOAT, {
                        let guidance_scale = PyDict::new(py);
                        guidance_scale.set_item("default", 3.0)?;
                        guidance_scale.set_item("min", 1.0)?;
                        guidance_scale.set_item("max", 10.0)?;
                        guidance_scale.set_item("step", 0.1)?;
                        guidance_scale
                    }),
                )?;
                required.set_item(
                    "enable_iterative_editing",
                    (NODE_BOOLEAN, {
                        let iterative = PyDict::new(py);
                        iterative.set_item("default", true)?;
                        iterative
                    }),
                )?;
                required.set_item(
                    "max_iterations",
                    (NODE_INT, {
                        let max_iterations = PyDict::new(py);
                        max_iterations.set_item("default", 6)?;
                        max_iterations.set_item("min", 1)?;
                        max_iterations.set_item("max", 10)?;
                        max_iterations
                    }),
                )?;
                required.set_item(
                    "preserve_character",
                    (NODE_BOOLEAN, {
                        let preserve = PyDict::new(py);
                        preserve.set_item("default", true)?;
                        preserve
                    }),
                )?;
                required.set_item(
                    "context_strength",
                    (NODE_FLOAT, {
                        let strength = PyDict::new(py);
                        strength.set_item("default", 0.8)?;
                        strength.set_item("min", 0.0)?;
                        strength.set_item("max", 1.0)?;
                        strength.set_item("step", 0.1)?;
                        strength
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                for slot in 0..SOURCE_SLOTS {
                    optional.set_item(format!("source_image_{}", slot + 1), (NODE_IMAGE,))?;
                }
                optional.set_item("reference_style", (NODE_IMAGE,))?;
                for slot in 0..SOURCE_SLOTS {
                    optional.set_item(
                        format!("image_{}_prompt", slot + 1),
                        (NODE_STRING, {
                            let prompt = PyDict::new(py);
                            prompt.set_item("multiline", true)?;
                            prompt.set_item("default", default_prompt(slot))?;
                            prompt
                        }),
                    )?;
                }
                optional.set_item("previous_edit", (NODE_IMAGE,))?;
                optional
            })?;

            Ok(dict.into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    #[allow(clippy::type_complexity)]
    #[pyo3(
        name = "execute",
        signature = (
            base_image, kontext_prompt, editing_mode, aspect_ratio, guidance_scale,
            enable_iterative_editing, max_iterations, preserve_character, context_strength,
            source_image_1=None, source_image_2=None, source_image_3=None, source_image_4=None,
            reference_style=None, image_1_prompt=None, image_2_prompt=None, image_3_prompt=None,
            image_4_prompt=None, previous_edit=None
        )
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        base_image: Bound<'py, PyAny>,
        kontext_prompt: String,
        editing_mode: String,
        aspect_ratio: String,
        guidance_scale: f64,
        enable_iterative_editing: bool,
        max_iterations: u32,
        preserve_character: bool,
        context_strength: f64,
        source_image_1: Option<Bound<'py, PyAny>>,
        source_image_2: Option<Bound<'py, PyAny>>,
        source_image_3: Option<Bound<'py, PyAny>>,
        source_image_4: Option<Bound<'py, PyAny>>,
        reference_style: Option<Bound<'py, PyAny>>,
        image_1_prompt: Option<String>,
        image_2_prompt: Option<String>,
        image_3_prompt: Option<String>,
        image_4_prompt: Option<String>,
        previous_edit: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(
        Bound<'py, PyAny>,
        String,
        String,
        Bound<'py, PyAny>,
        Bound<'py, PyAny>,
    )> {
        info!("MultiImageAreaEditor mode {editing_mode}, aspect ratio {aspect_ratio}, iterative {enable_iterative_editing}");

        let sources = [source_image_1, source_image_2, source_image_3, source_image_4];
        let prompts = [image_1_prompt, image_2_prompt, image_3_prompt, image_4_prompt]
            .into_iter()
            .enumerate()
            .map(|(slot, prompt)| prompt.unwrap_or_else(|| default_prompt(slot)))
            .collect::<Vec<_>>();

        let results = self.edit(
            py,
            &base_image,
            &kontext_prompt,
            (&editing_mode, &aspect_ratio),
            (guidance_scale, max_iterations, preserve_character, context_strength),
            &sources,
            &prompts,
            reference_style.as_ref(),
            previous_edit.as_ref(),
        );

        match results {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("MultiImageAreaEditor error, {e}");
                self.notify_error(py, "MultiImageAreaEditor", &e.to_string());

                let mask = self.empty_mask(py, &base_image)?;
                Ok((
                    base_image.clone(),
                    format!("Kontext edit error: {e}"),
                    "ERROR".to_string(),
                    mask,
                    base_image,
                ))
            }
        }
    }
}

impl MultiImageAreaEditor {
    #[allow(clippy::too_many_arguments)]
    #[allow(clippy::type_complexity)]
    fn edit<'py>(
        &self,
        py: Python<'py>,
        base_image: &Bound<'py, PyAny>,
        kontext_prompt: &str,
        (editing_mode, aspect_ratio): (&str, &str),
        (guidance_scale, max_iterations, preserve_character, context_strength): (f64, u32, bool, f64),
        sources: &[Option<Bound<'py, PyAny>>],
        prompts: &[String],
        reference_style: Option<&Bound<'py, PyAny>>,
        previous_edit: Option<&Bound<'py, PyAny>>,
    ) -> Result<
        (
            Bound<'py, PyAny>,
            String,
            String,
            Bound<'py, PyAny>,
            Bound<'py, PyAny>,
        ),
        Error,
    > {
        let started = Instant::now();
        let params = EditParams {
            mode: editing_mode
                .parse::<EditingMode>()
                .map_err(|e| Error::ParseEnumString(format!("{editing_mode}, {e}")))?,
            aspect_ratio: aspect_ratio
                .parse::<EditorAspectRatio>()
                .map_err(|e| Error::ParseEnumString(format!("{aspect_ratio}, {e}")))?,
            guidance_scale,
            max_iterations,
            preserve_character,
            context_strength: context_strength.clamp(0.0, 1.0),
        };

        let mut log = vec![
            "Kontext edit started".to_string(),
            format!("Editing mode: {}", params.mode),
            format!("Aspect ratio: {}", params.aspect_ratio),
            format!("Prompt: {}", kontext_prompt.chars().take(100).collect::<String>()),
        ];

        let base = self.to_image(base_image)?;
        let (_, height, width, _) = base.dims4()?;
        log.push(format!("Base image size: {width}x{height}"));

        // 原尺寸的源图像, 用于预览
        let mut raw_sources = Vec::new();
        let mut slots = Vec::with_capacity(SOURCE_SLOTS);
        for (slot, (source, prompt)) in sources.iter().zip(prompts.iter()).enumerate() {
            let Some(source) = source else {
                slots.push(None);
                continue;
            };
            let raw = self.to_image(source)?;
            let fitted = resize_image_bilinear(py, &raw, width, height)?;
            log.push(format!("Source image {}: loaded", slot + 1));
            if !prompt.trim().is_empty() {
                log.push(format!(
                    "Image {} prompt: {}",
                    slot + 1,
                    prompt.chars().take(50).collect::<String>()
                ));
            }
            raw_sources.push(raw);
            slots.push(Some((fitted, prompt.clone())));
        }

        let fit = |image: Option<&Bound<'py, PyAny>>| -> Result<Option<Tensor>, Error> {
            match image {
                Some(image) => {
                    let image = self.to_image(image)?;
                    Ok(Some(resize_image_bilinear(py, &image, width, height)?))
                }
                None => Ok(None),
            }
        };
        let inputs = EditSources {
            base,
            slots,
            reference: fit(reference_style)?,
            previous: fit(previous_edit)?,
        };

        let mut result = blend_by_mode(&inputs, &params)?;
        log.push(format!("{} finished", params.mode));

        if params.aspect_ratio != EditorAspectRatio::MatchInput {
            let (new_width, new_height) = params.aspect_ratio.target_size(width, height);
            result = resize_image_bilinear(py, &result, new_width, new_height)?;
            log.push(format!("Aspect ratio resize: {new_width}x{new_height}"));
        }

        let preview = stitch_preview(py, &inputs.base, &raw_sources)?;
        let mask = Tensor::zeros((1, height, width), DType::F32, &self.device)?;
        let metadata = KontextMetadata::new(&params, raw_sources.len());
        let metadata = serde_json::to_string(&metadata)?;

        log.push(format!(
            "Finished in {:.2}s",
            started.elapsed().as_secs_f64()
        ));
        let log = log.join("\n");
        debug!("{log}");

        let result = TensorWrapper::<f32>::from_tensor(result).to_py_tensor(py)?;
        let preview = TensorWrapper::<f32>::from_tensor(preview).to_py_tensor(py)?;
        let mask = TensorWrapper::<f32>::from_tensor(mask).to_py_tensor(py)?;

        Ok((
            to_like(&result, base_image)?,
            log,
            metadata,
            mask,
            to_like(&preview, base_image)?,
        ))
    }

    fn to_image(&self, image: &Bound<'_, PyAny>) -> Result<Tensor, Error> {
        let tensor = TensorWrapper::<f32>::new(image, &self.device)?.into_tensor();
        ensure_batch(tensor)
    }

    /// 与基础图像同尺寸的空遮罩 [1, H, W]
    fn empty_mask<'py>(
        &self,
        py: Python<'py>,
        base_image: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let shape = base_image
            .getattr("shape")
            .and_then(|v| v.extract::<Vec<usize>>())
            .unwrap_or_default();
        let (height, width) = image_hw(&shape).unwrap_or((1, 1));

        let torch = py.import("torch")?;
        torch.getattr("zeros")?.call1(((1, height, width),))
    }
}

/// 基础图像与源图像沿宽度拼接, 源图像高度缩放到基础图像高度
fn stitch_preview(py: Python<'_>, base: &Tensor, sources: &[Tensor]) -> Result<Tensor, Error> {
    if sources.is_empty() {
        return Ok(base.clone());
    }

    let (_, height, _, _) = base.dims4()?;
    let mut parts = vec![base.clone()];
    for source in sources {
        let (_, _, w, _) = source.dims4()?;
        parts.push(resize_image_bilinear(py, source, w, height)?);
    }
    Ok(Tensor::cat(&parts, 2)?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn params(mode: EditingMode) -> EditParams {
        EditParams {
            mode,
            aspect_ratio: EditorAspectRatio::MatchInput,
            guidance_scale: 3.0,
            max_iterations: 6,
            preserve_character: true,
            context_strength: 0.5,
        }
    }

    fn mean(t: &Tensor) -> anyhow::Result<f32> {
        Ok(t.mean_all()?.to_scalar::<f32>()?)
    }

    fn sources(base: f32, slots: &[Option<(f32, &str)>]) -> anyhow::Result<EditSources> {
        let device = Device::Cpu;
        let fill = |v: f32| Tensor::full(v, (1, 2, 2, 3), &device);
        let slots = slots
            .iter()
            .map(|slot| -> anyhow::Result<Option<(Tensor, String)>> {
                match slot {
                    Some((v, prompt)) => Ok(Some((fill(*v)?, prompt.to_string()))),
                    None => Ok(None),
                }
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(EditSources {
            base: fill(base)?,
            slots,
            reference: None,
            previous: None,
        })
    }

    #[test]
    fn test_editing_mode_names() -> anyhow::Result<()> {
        assert_eq!(EditingMode::LocalEdit.to_string(), "local_edit");
        assert_eq!(
            EditingMode::from_str("character_consistency")?,
            EditingMode::CharacterConsistency
        );
        assert!(EditingMode::from_str("unknown").is_err());
        Ok(())
    }

    #[test]
    fn test_local_edit_skips_empty_prompts() -> anyhow::Result<()> {
        let inputs = sources(0.0, &[Some((1.0, "red hat")), None, Some((1.0, "  "))])?;
        let out = blend_by_mode(&inputs, &params(EditingMode::LocalEdit))?;
        assert!((mean(&out)? - 0.5).abs() < 1e-6);

        let inputs = sources(0.0, &[Some((1.0, "a")), Some((1.0, "b"))])?;
        let out = blend_by_mode(&inputs, &params(EditingMode::LocalEdit))?;
        assert!((mean(&out)? - 0.75).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_style_transfer() -> anyhow::Result<()> {
        let mut inputs = sources(0.0, &[])?;
        let out = blend_by_mode(&inputs, &params(EditingMode::StyleTransfer))?;
        assert_eq!(mean(&out)?, 0.0);

        inputs.reference = Some(Tensor::ones((1, 2, 2, 3), DType::F32, &Device::Cpu)?);
        let out = blend_by_mode(&inputs, &params(EditingMode::StyleTransfer))?;
        assert!((mean(&out)? - 0.3).abs() < 1e-6);

        let mut loose = params(EditingMode::StyleTransfer);
        loose.preserve_character = false;
        let out = blend_by_mode(&inputs, &loose)?;
        assert!((mean(&out)? - 0.7).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_character_consistency() -> anyhow::Result<()> {
        let inputs = sources(1.0, &[Some((1.0, "")), Some((0.0, "x"))])?;
        let out = blend_by_mode(&inputs, &params(EditingMode::CharacterConsistency))?;
        // 1 * 0.8 + 1 * 0.1 = 0.9, 0.9 * 0.8 + 0 = 0.72
        assert!((mean(&out)? - 0.72).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_multi_round_edit() -> anyhow::Result<()> {
        let mut inputs = sources(1.0, &[])?;
        inputs.previous = Some(Tensor::zeros((1, 2, 2, 3), DType::F32, &Device::Cpu)?);

        let out = blend_by_mode(&inputs, &params(EditingMode::MultiRoundEdit))?;
        // 3 轮: 1 - 0.95^3
        let expected = 1.0 - 0.95f32.powi(3);
        assert!((mean(&out)? - expected).abs() < 1e-5);

        let mut single = params(EditingMode::MultiRoundEdit);
        single.max_iterations = 1;
        let out = blend_by_mode(&inputs, &single)?;
        assert!((mean(&out)? - 0.05).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_metadata_json() -> anyhow::Result<()> {
        let metadata = KontextMetadata::new(&params(EditingMode::StyleTransfer), 2);
        let value: serde_json::Value = serde_json::from_str(&serde_json::to_string(&metadata)?)?;
        assert_eq!(value["editing_mode"], "style_transfer");
        assert_eq!(value["aspect_ratio"], "match_input");
        assert_eq!(value["num_source_images"], 2);
        assert_eq!(value["kontext_version"], "1.0");
        Ok(())
    }

    #[test]
    fn test_image_hw() -> anyhow::Result<()> {
        assert_eq!(image_hw(&[1, 64, 32, 3]), Some((64, 32)));
        assert_eq!(image_hw(&[64, 32, 3]), Some((64, 32)));
        assert_eq!(image_hw(&[3]), None);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_stitch_preview() -> anyhow::Result<()> {
        Python::with_gil(|py| -> anyhow::Result<()> {
            let device = Device::Cpu;
            let base = Tensor::zeros((1, 8, 8, 3), DType::F32, &device)?;
            let source = Tensor::ones((1, 4, 6, 3), DType::F32, &device)?;

            let preview = stitch_preview(py, &base, &[source])?;
            assert_eq!(preview.dims(), &[1, 8, 14, 3]);
            Ok(())
        })
    }
}
