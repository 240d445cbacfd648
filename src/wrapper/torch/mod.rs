//! torch 封装

pub mod nn;
pub mod tensor;
