//! 错误处理

#[allow(unused)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("option none, {0}")]
    OptionNone(String),
    #[error("strum error, {0}")]
    ParseEnumString(String),
    #[error("serde json error, {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("the list is empty")]
    ListEmpty,

    #[error("py error, {0}")]
    PyErr(#[from] pyo3::PyErr),
    #[error("pythonize error, {0}")]
    PythonizeError(#[from] pythonize::PythonizeError),
    #[error("py missing kwargs, {0}")]
    PyMissingKwargs(String),
    #[error("py downcast error, {0}")]
    PyDowncastError(String),

    #[error("tensor error, {0}")]
    TensorErr(#[from] candle_core::Error),
    #[error("invalid tensor shape, {0}")]
    InvalidTensorShape(String),
    #[error("numpy error, {0}")]
    NotContiguousError(#[from] numpy::NotContiguousError),

    #[error("invalid conditioning, {0}")]
    InvalidConditioning(String),
    #[error("invalid parameter, {0}")]
    InvalidParameter(String),
}

impl From<strum::ParseError> for Error {
    fn from(e: strum::ParseError) -> Self {
        Error::ParseEnumString(e.to_string())
    }
}
