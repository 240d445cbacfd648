//! node_helpers
//!
//! conditioning: `[[embedding, attrs], ...]`
//! latent: `{"samples": tensor, ...}`

use log::warn;
use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyList, PyListMethods},
    Bound, PyAny, Python,
};

use crate::{
    core::utils::region::{AreaUnits, RegionPatch},
    error::Error,
    wrapper::python::is_torch_tensor,
};

/// 条件条目, embedding 不做拷贝
#[derive(Debug, Clone)]
pub struct ConditioningItem<'py> {
    pub embedding: Bound<'py, PyAny>,
    pub attrs: Bound<'py, PyDict>,
}

impl<'py> ConditioningItem<'py> {
    /// 复制属性字典并写入区域信息
    pub fn with_region(&self, patch: &RegionPatch) -> Result<Self, Error> {
        let attrs = self.attrs.copy()?;
        attrs.set_item("area", patch.area.to_tuple())?;
        attrs.set_item("strength", patch.strength)?;
        attrs.set_item("min_sigma", patch.min_sigma)?;
        attrs.set_item("max_sigma", patch.max_sigma)?;
        if let Some(rotation) = patch.rotation {
            attrs.set_item("rotation", rotation)?;
        }
        if let Some(center) = patch.rotation_center {
            attrs.set_item("rotation_center", center)?;
        }
        for (key, value) in patch.tags.iter() {
            attrs.set_item(*key, value)?;
        }

        Ok(Self {
            embedding: self.embedding.clone(),
            attrs,
        })
    }

    /// 复制属性字典并替换 area
    pub fn with_area(&self, area: AreaUnits) -> Result<Self, Error> {
        let attrs = self.attrs.copy()?;
        attrs.set_item("area", area.to_tuple())?;
        Ok(Self {
            embedding: self.embedding.clone(),
            attrs,
        })
    }

    /// 像素单位的 area, 百分比等其他格式返回 None
    pub fn area(&self) -> Option<AreaUnits> {
        self.attrs
            .get_item("area")
            .ok()
            .flatten()
            .and_then(|v| v.extract::<(u32, u32, u32, u32)>().ok())
            .map(AreaUnits::from_tuple)
    }

    /// 只读视图
    pub fn view(&self) -> ConditioningAttrs {
        let get = |key: &str| self.attrs.get_item(key).ok().flatten();
        let get_f64 = |key: &str| get(key).and_then(|v| v.extract::<f64>().ok());
        let get_str = |key: &str| get(key).and_then(|v| v.str().ok()).map(|v| v.to_string());

        let embedding_shape = self
            .embedding
            .getattr("shape")
            .and_then(|v| v.extract::<Vec<usize>>())
            .unwrap_or_default();

        let other_keys = self
            .attrs
            .keys()
            .iter()
            .filter_map(|k| k.extract::<String>().ok())
            .filter(|k| !ConditioningAttrs::KNOWN_KEYS.contains(&k.as_str()))
            .collect();

        ConditioningAttrs {
            embedding_shape,
            area: self.area(),
            strength: get_f64("strength"),
            rotation: get_f64("rotation"),
            rotation_center: get("rotation_center")
                .and_then(|v| v.extract::<(f64, f64)>().ok()),
            min_sigma: get_f64("min_sigma"),
            max_sigma: get_f64("max_sigma"),
            body_part: get_str("body_part"),
            body_part_name: get_str("body_part_name"),
            body_part_category: get_str("body_part_category"),
            other_keys,
        }
    }
}

/// 条件属性的类型化视图
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConditioningAttrs {
    pub embedding_shape: Vec<usize>,
    pub area: Option<AreaUnits>,
    pub strength: Option<f64>,
    pub rotation: Option<f64>,
    pub rotation_center: Option<(f64, f64)>,
    pub min_sigma: Option<f64>,
    pub max_sigma: Option<f64>,
    pub body_part: Option<String>,
    pub body_part_name: Option<String>,
    pub body_part_category: Option<String>,
    pub other_keys: Vec<String>,
}

impl ConditioningAttrs {
    const KNOWN_KEYS: [&'static str; 9] = [
        "area",
        "strength",
        "rotation",
        "rotation_center",
        "min_sigma",
        "max_sigma",
        "body_part",
        "body_part_name",
        "body_part_category",
    ];
}

/// 是否为有效的 conditioning: 非空, 且首个条目的第一个元素为 torch.Tensor
pub fn is_valid_conditioning<'py>(py: Python<'py>, conditioning: &Bound<'py, PyAny>) -> bool {
    let first = conditioning
        .len()
        .ok()
        .filter(|len| *len > 0)
        .and_then(|_| conditioning.get_item(0).ok())
        .and_then(|item| item.get_item(0).ok());

    match first {
        Some(embedding) => is_torch_tensor(py, &embedding),
        None => false,
    }
}

/// Convert Python's conditioning to Rust type
///
/// 格式错误的条目跳过
pub fn conditionings_py2rs<'py>(
    conditioning: &Bound<'py, PyAny>,
) -> Result<Vec<ConditioningItem<'py>>, Error> {
    let mut items = Vec::new();
    for (index, item) in conditioning.try_iter()?.enumerate() {
        match conditioning_item(&item?) {
            Ok(v) => items.push(v),
            Err(e) => warn!("conditioning entry {index} skipped, {e}"),
        }
    }
    Ok(items)
}

fn conditioning_item<'py>(item: &Bound<'py, PyAny>) -> Result<ConditioningItem<'py>, Error> {
    let len = item.len()?;
    if len < 2 {
        return Err(Error::InvalidConditioning(format!(
            "expected [embedding, attrs], got {len} elements"
        )));
    }
    let embedding = item.get_item(0)?;
    let attrs = item
        .get_item(1)?
        .downcast_into::<PyDict>()
        .map_err(|e| Error::PyDowncastError(e.to_string()))?;
    Ok(ConditioningItem { embedding, attrs })
}

/// Convert Rust's conditioning to Python type
pub fn conditionings_rs2py<'py>(
    py: Python<'py>,
    items: Vec<ConditioningItem<'py>>,
) -> Result<Bound<'py, PyList>, Error> {
    let mut list = Vec::with_capacity(items.len());
    for item in items {
        let entry = PyList::new(py, [item.embedding, item.attrs.into_any()])?;
        list.push(entry);
    }
    Ok(PyList::new(py, list)?)
}

/// 读取 latent 的 samples
pub fn latent_samples<'py>(latent: &Bound<'py, PyAny>) -> Result<Bound<'py, PyAny>, Error> {
    let latent = latent
        .downcast::<PyDict>()
        .map_err(|e| Error::PyDowncastError(e.to_string()))?;
    latent
        .get_item("samples")?
        .ok_or(Error::OptionNone("latent has no samples".to_string()))
}

/// 复制 latent 字典并替换 samples
pub fn latent_with_samples<'py>(
    latent: &Bound<'py, PyAny>,
    samples: Bound<'py, PyAny>,
) -> Result<Bound<'py, PyDict>, Error> {
    let latent = latent
        .downcast::<PyDict>()
        .map_err(|e| Error::PyDowncastError(e.to_string()))?
        .copy()?;
    latent.set_item("samples", samples)?;
    Ok(latent)
}
