//! torch.Tensor 与 candle Tensor 互转
//! 依赖:
//! - python: torch

use std::marker::PhantomData;

use candle_core::{Device, Tensor, WithDType};
use numpy::{Element, PyArray, PyArrayDyn, PyArrayMethods, PyUntypedArrayMethods};
use pyo3::{
    exceptions::PyRuntimeError, types::PyAnyMethods, Bound, IntoPyObject, PyAny, PyErr, PyResult,
    Python,
};

use crate::error::Error;

pub struct TensorWrapper<T>
where
    T: Element + WithDType,
{
    tensor: Tensor,
    _marker: PhantomData<T>,
}

impl<T> TensorWrapper<T>
where
    T: Element + WithDType,
{
    pub fn new<'py>(py_any: &Bound<'py, PyAny>, device: &Device) -> Result<Self, Error> {
        let tensor = Self::torch_to_candle(py_any, device)?;

        Ok(Self {
            tensor,
            _marker: PhantomData,
        })
    }

    pub fn from_tensor(tensor: Tensor) -> Self {
        Self {
            tensor,
            _marker: PhantomData,
        }
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }

    /// 从 Python torch.Tensor 转为 Rust candle_core::Tensor
    ///
    /// 任意设备与精度的张量先转到 cpu 与 float32, 再转换为 `T` 对应的 numpy 类型
    /// (numpy 不支持 bfloat16)
    fn torch_to_candle<'py>(
        torch_tensor: &Bound<'py, PyAny>,
        device: &Device,
    ) -> Result<Tensor, Error> {
        let py = torch_tensor.py();

        let np = torch_tensor
            .call_method0("detach")?
            .call_method0("cpu")?
            .call_method0("float")?
            .call_method0("contiguous")?
            .call_method0("numpy")?
            .call_method1("astype", (numpy::dtype::<T>(py),))?;

        let arr = np
            .downcast::<PyArrayDyn<T>>()
            .map_err(|e| Error::PyDowncastError(e.to_string()))?;

        let shape = arr.shape().to_vec();
        let data = arr.to_vec()?;

        Ok(Tensor::from_vec(data, shape, device)?)
    }
}

impl<T> TensorWrapper<T>
where
    T: Element + WithDType,
{
    /// 转换为 python 的 torch.Tensor
    /// ```python,ignore
    /// import torch
    /// tensor = torch.from_numpy(data)
    /// ```
    pub fn to_py_tensor<'py>(self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let data = self.into_pyobject(py)?;

        let torch = py.import("torch")?;
        torch.getattr("from_numpy")?.call1((data,))
    }
}

/// 转换到参考张量的设备与精度
/// ```python,ignore
/// tensor.to(reference)
/// ```
pub fn to_like<'py>(
    tensor: &Bound<'py, PyAny>,
    reference: &Bound<'py, PyAny>,
) -> PyResult<Bound<'py, PyAny>> {
    tensor.call_method1("to", (reference,))
}

impl<'py, T> IntoPyObject<'py> for TensorWrapper<T>
where
    T: Element + WithDType,
{
    type Target = PyArrayDyn<T>;
    type Output = Bound<'py, Self::Target>;
    type Error = PyErr;

    fn into_pyobject(self, py: Python<'py>) -> Result<Self::Output, Self::Error> {
        let to_py_err = |e: candle_core::Error| PyErr::new::<PyRuntimeError, _>(e.to_string());

        let tensor = self.into_tensor();
        let shape = tensor.dims().to_vec();
        let data = tensor
            .to_dtype(T::DTYPE)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<T>())
            .map_err(to_py_err)?;

        PyArray::from_iter(py, data).reshape(shape)
    }
}
