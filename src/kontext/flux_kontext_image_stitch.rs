//! Flux Kontext 图像拼接

use candle_core::{Device, Tensor};
use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};
use strum::IntoEnumIterator;

use crate::{
    core::{
        category::CATEGORY_FLUX_KONTEXT,
        utils::stitch::{stitch_images, StitchAlignment, StitchDirection},
    },
    error::Error,
    wrapper::{
        comfyui::{
            types::{NODE_IMAGE, NODE_INT},
            PromptServer,
        },
        torch::tensor::{to_like, TensorWrapper},
    },
};

/// 间隙上限
const MAX_GAP: i64 = 100;

/// Flux Kontext 图像拼接
#[pyclass(subclass)]
pub struct FluxKontextImageStitch {
    device: Device,
}

impl PromptServer for FluxKontextImageStitch {}

#[pymethods]
impl FluxKontextImageStitch {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_IMAGE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("stitched_image",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_FLUX_KONTEXT;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Stitch two to four images side by side or stacked, padding the shorter ones."
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
                    "image1",
                    (NODE_IMAGE, {
                        let image1 = PyDict::new(py);
                        image1.set_item("tooltip", "First image")?;
                        image1
                    }),
                )?;
                required.set_item(
                    "image2",
                    (NODE_IMAGE, {
                        let image2 = PyDict::new(py);
                        image2.set_item("tooltip", "Second image")?;
                        image2
                    }),
                )?;
                required.set_item(
                    "stitch_direction",
                    (
                        StitchDirection::iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>(),
                        {
                            let direction = PyDict::new(py);
                            direction.set_item("default", StitchDirection::Horizontal.to_string())?;
                            direction.set_item("tooltip", "Stitch direction")?;
                            direction
                        },
                    ),
                )?;
                required.set_item(
                    "alignment",
                    (
                        StitchAlignment::iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>(),
                        {
                            let alignment = PyDict::new(py);
                            alignment.set_item("default", StitchAlignment::Center.to_string())?;
                            alignment.set_item("tooltip", "Alignment of smaller images")?;
                            alignment
                        },
                    ),
                )?;
                required.set_item(
                    "gap",
                    (NODE_INT, {
                        let gap = PyDict::new(py);
                        gap.set_item("default", 0)?;
                        gap.set_item("min", 0)?;
                        gap.set_item("max", MAX_GAP)?;
                        gap.set_item("step", 1)?;
                        gap.set_item("tooltip", "Gap between images in pixels")?;
                        gap
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "image3",
                    (NODE_IMAGE, {
                        let image3 = PyDict::new(py);
                        image3.set_item("tooltip", "Optional third image")?;
                        image3
                    }),
                )?;
                optional.set_item(
                    "image4",
                    (NODE_IMAGE, {
                        let image4 = PyDict::new(py);
                        image4.set_item("tooltip", "Optional fourth image")?;
                        image4
                    }),
                )?;
                optional
            })?;

            Ok(dict.into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(
        name = "execute",
        signature = (image1, image2, stitch_direction, alignment, gap, image3=None, image4=None)
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        image1: Bound<'py, PyAny>,
        image2: Bound<'py, PyAny>,
        stitch_direction: String,
        alignment: String,
        gap: i64,
        image3: Option<Bound<'py, PyAny>>,
        image4: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let mut images = vec![&image1, &image2];
        images.extend(image3.iter());
        images.extend(image4.iter());
        info!(
            "FluxKontextImageStitch {} images, {stitch_direction}, {alignment}, gap {gap}",
            images.len()
        );

        let results = self.stitch(py, &images, &stitch_direction, &alignment, gap);

        match results {
            Ok(v) => Ok((v,)),
            Err(e) => {
                error!("FluxKontextImageStitch error, {e}");
                self.notify_error(py, "FluxKontextImageStitch", &e.to_string());
                Ok((image1,))
            }
        }
    }
}

impl FluxKontextImageStitch {
    fn stitch<'py>(
        &self,
        py: Python<'py>,
        images: &[&Bound<'py, PyAny>],
        direction: &str,
        alignment: &str,
        gap: i64,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let direction = direction
            .parse::<StitchDirection>()
            .map_err(|e| Error::ParseEnumString(format!("{direction}, {e}")))?;
        let alignment = alignment
            .parse::<StitchAlignment>()
            .map_err(|e| Error::ParseEnumString(format!("{alignment}, {e}")))?;
        let gap = gap.clamp(0, MAX_GAP) as usize;

        let tensors = images
            .iter()
            .map(|image| {
                TensorWrapper::<f32>::new(image, &self.device).map(|w| w.into_tensor())
            })
            .collect::<Result<Vec<Tensor>, Error>>()?;

        let stitched = stitch_images(&tensors, direction, alignment, gap)?;
        info!("FluxKontextImageStitch output {:?}", stitched.dims());

        let stitched = TensorWrapper::<f32>::from_tensor(stitched).to_py_tensor(py)?;
        Ok(to_like(&stitched, images[0])?)
    }
}
