//! 工作流输入参数 extra_pnginfo 解析
//!
//! 前端将区域布局保存在工作流节点的 properties 中,
//! 节点通过隐藏输入 unique_id 找到自身。

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods},
    Bound,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::error::Error;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ExtraPnginfo {
    #[serde(default)]
    pub workflow: Workflow,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Workflow {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct WorkflowNode {
    /// 数字或字符串
    #[serde(default)]
    pub id: Value,
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

impl Workflow {
    /// 按节点 ID 查找, 数字与字符串按文本比较
    pub fn find_node(&self, unique_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|node| node.id_matches(unique_id))
    }
}

impl WorkflowNode {
    pub fn id_matches(&self, unique_id: &str) -> bool {
        match &self.id {
            Value::String(s) => s == unique_id,
            Value::Number(n) => n.to_string() == unique_id,
            _ => false,
        }
    }

    /// 读取原始属性
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }

    /// 读取并解析属性, 格式错误时返回 None
    pub fn property_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.property(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

pub struct InputKwargs<'py> {
    kwargs: Bound<'py, PyDict>,
}

impl<'py> InputKwargs<'py> {
    pub fn new(kwargs: &Bound<'py, PyDict>) -> Self {
        Self {
            kwargs: kwargs.clone(),
        }
    }

    /// 从 python kwargs 解析输入参数
    pub fn parse<T>(&self, key: &str) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let value_obj = self
            .kwargs
            .get_item(key)?
            .filter(|v| !v.is_none())
            .ok_or(Error::PyMissingKwargs(format!(
                "the {key} parameter does not exist"
            )))?;

        let value: T = pythonize::depythonize(&value_obj)?;

        Ok(value)
    }

    pub fn extra_pnginfo(&self) -> Result<ExtraPnginfo, Error> {
        self.parse("extra_pnginfo")
    }

    /// 节点 ID, 前端可能传入字符串或数字
    pub fn unique_id(&self) -> Result<String, Error> {
        let value: Value = self.parse("unique_id")?;
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            v => Err(Error::InvalidParameter(format!("unique_id: {v}"))),
        }
    }

    /// 当前节点在工作流中的定义
    pub fn workflow_node(&self) -> Result<WorkflowNode, Error> {
        let unique_id = self.unique_id()?;
        let extra_pnginfo = self.extra_pnginfo()?;
        extra_pnginfo
            .workflow
            .find_node(&unique_id)
            .cloned()
            .ok_or(Error::OptionNone(format!(
                "node {unique_id} not found in workflow"
            )))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn extra_pnginfo() -> anyhow::Result<ExtraPnginfo> {
        let value = json!({
            "workflow": {
                "last_node_id": 12,
                "nodes": [
                    {"id": 3, "type": "MultiAreaConditioning", "properties": {
                        "values": [[0, 0, 256, 256, 1.0, 0.0]],
                        "width": 768,
                        "height": 512
                    }},
                    {"id": "7:2", "type": "MultiLatentComposite", "properties": {
                        "values": [[64, 64, 16]]
                    }},
                    {"id": 9, "properties": null}
                ]
            }
        });
        Ok(serde_json::from_value(value)?)
    }

    #[test]
    fn test_find_node() -> anyhow::Result<()> {
        let info = extra_pnginfo()?;

        let node = info.workflow.find_node("3");
        assert!(node.is_some());
        assert_eq!(
            node.and_then(|n| n.property_as::<u32>("width")),
            Some(768)
        );

        let node = info.workflow.find_node("7:2");
        assert_eq!(
            node.and_then(|n| n.property_as::<Vec<Vec<u32>>>("values")),
            Some(vec![vec![64, 64, 16]])
        );

        assert!(info.workflow.find_node("4").is_none());
        Ok(())
    }

    #[test]
    fn test_lenient_properties() -> anyhow::Result<()> {
        let info = extra_pnginfo()?;
        let node = info.workflow.find_node("9");
        assert!(node.is_some());
        assert!(node.and_then(|n| n.property("values")).is_none());

        let empty: ExtraPnginfo = serde_json::from_value(json!({}))?;
        assert!(empty.workflow.nodes.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_property_type() -> anyhow::Result<()> {
        let info = extra_pnginfo()?;
        let node = info.workflow.find_node("3");
        assert_eq!(node.and_then(|n| n.property_as::<String>("width")), None);
        Ok(())
    }
}
