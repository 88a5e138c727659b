// ==========================================
// 工位换型排程引擎 - 工位与产品领域模型
// ==========================================

use crate::domain::types::AttributeDataType;
use serde::{Deserialize, Serialize};

// ==========================================
// Workstation - 工位 (资源)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workstation {
    pub id: String,
    pub number: String,
    pub production_line_id: Option<String>, // 产线 (决定工作日历)
    #[serde(default)]
    pub buffer: bool, // 缓冲工位
}

impl Workstation {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            number: id.clone(),
            id,
            production_line_id: None,
            buffer: false,
        }
    }

    pub fn on_line(mut self, production_line_id: impl Into<String>) -> Self {
        self.production_line_id = Some(production_line_id.into());
        self
    }

    pub fn as_buffer(mut self) -> Self {
        self.buffer = true;
        self
    }
}

// ==========================================
// Product / AttributeValue - 产品及属性值
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeValue {
    pub attribute_id: String, // 属性 (如 Color)
    pub value_id: String,     // 取值 (如 Red)
    pub data_type: AttributeDataType,
}

impl AttributeValue {
    pub fn calculated(attribute_id: impl Into<String>, value_id: impl Into<String>) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            value_id: value_id.into(),
            data_type: AttributeDataType::Calculated,
        }
    }

    pub fn other(attribute_id: impl Into<String>, value_id: impl Into<String>) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            value_id: value_id.into(),
            data_type: AttributeDataType::Other,
        }
    }

    pub fn is_calculated(&self) -> bool {
        self.data_type == AttributeDataType::Calculated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub number: String,
    #[serde(default)]
    pub attribute_values: Vec<AttributeValue>,
}

impl Product {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            number: id.clone(),
            id,
            attribute_values: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: AttributeValue) -> Self {
        self.attribute_values.push(value);
        self
    }

    /// 参与换型匹配的属性值
    pub fn calculated_values(&self) -> Vec<AttributeValue> {
        self.attribute_values
            .iter()
            .filter(|v| v.is_calculated())
            .cloned()
            .collect()
    }
}
