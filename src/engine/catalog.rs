// ==========================================
// 工位换型排程引擎 - 只读目录 (属性 / 换型定额 / 主数据)
// ==========================================
// 说明: 目录对引擎只读；存储由上游系统负责
// ==========================================

use crate::domain::{AttributeValue, ChangeoverNorm, Product, TechnologyOperation, Workstation};
use std::collections::BTreeMap;
use tracing::warn;

/// 产品属性目录
pub trait AttributeCatalog: Send + Sync {
    /// 产品的 CALCULATED 属性值；未知产品返回 None
    fn calculated_values(&self, product_id: &str) -> Option<Vec<AttributeValue>>;
}

/// 换型定额目录
pub trait ChangeoverNormCatalog: Send + Sync {
    /// (工位, 属性) 的定额，保持目录迭代顺序
    fn norms_for(&self, workstation_id: &str, attribute_id: &str) -> Vec<ChangeoverNorm>;

    /// 工位上是否配置了任何定额
    fn has_norms(&self, workstation_id: &str) -> bool;
}

/// 工位 / 工序主数据
pub trait ProductionCatalog: Send + Sync {
    fn workstation(&self, id: &str) -> Option<Workstation>;
    fn operation(&self, id: &str) -> Option<TechnologyOperation>;
}

/// 引擎使用的目录聚合
pub trait Catalog: AttributeCatalog + ChangeoverNormCatalog + ProductionCatalog {}

impl<T> Catalog for T where T: AttributeCatalog + ChangeoverNormCatalog + ProductionCatalog {}

// ==========================================
// InMemoryCatalog - 内存目录
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    workstations: BTreeMap<String, Workstation>,
    products: BTreeMap<String, Product>,
    operations: BTreeMap<String, TechnologyOperation>,
    norms: Vec<ChangeoverNorm>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workstation(&mut self, workstation: Workstation) -> &mut Self {
        self.workstations.insert(workstation.id.clone(), workstation);
        self
    }

    pub fn add_product(&mut self, product: Product) -> &mut Self {
        self.products.insert(product.id.clone(), product);
        self
    }

    pub fn add_operation(&mut self, operation: TechnologyOperation) -> &mut Self {
        self.operations.insert(operation.id.clone(), operation);
        self
    }

    /// 登记定额；结构不完整的定额丢弃并告警
    pub fn add_norm(&mut self, norm: ChangeoverNorm) -> &mut Self {
        if norm.is_well_formed() {
            self.norms.push(norm);
        } else {
            warn!(norm_id = %norm.id, "换型定额不完整，已忽略");
        }
        self
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }
}

impl AttributeCatalog for InMemoryCatalog {
    fn calculated_values(&self, product_id: &str) -> Option<Vec<AttributeValue>> {
        self.products.get(product_id).map(Product::calculated_values)
    }
}

impl ChangeoverNormCatalog for InMemoryCatalog {
    fn norms_for(&self, workstation_id: &str, attribute_id: &str) -> Vec<ChangeoverNorm> {
        self.norms
            .iter()
            .filter(|n| n.workstation_id == workstation_id && n.attribute_id == attribute_id)
            .cloned()
            .collect()
    }

    fn has_norms(&self, workstation_id: &str) -> bool {
        self.norms.iter().any(|n| n.workstation_id == workstation_id)
    }
}

impl ProductionCatalog for InMemoryCatalog {
    fn workstation(&self, id: &str) -> Option<Workstation> {
        self.workstations.get(id).cloned()
    }

    fn operation(&self, id: &str) -> Option<TechnologyOperation> {
        self.operations.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculated_values_filter_other() {
        let mut catalog = InMemoryCatalog::new();
        catalog.add_product(
            Product::new("P1")
                .with_value(AttributeValue::calculated("Color", "Red"))
                .with_value(AttributeValue::other("Label", "X")),
        );

        let values = catalog.calculated_values("P1").unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].attribute_id, "Color");
        assert!(catalog.calculated_values("P9").is_none());
    }

    #[test]
    fn test_malformed_norm_is_ignored() {
        let mut catalog = InMemoryCatalog::new();
        let mut broken = ChangeoverNorm::between_values("N-2", "WS", "Color", "Red", "Blue", 60);
        broken.from_value_id = None;
        catalog
            .add_norm(ChangeoverNorm::generic("N-1", "WS", "Color", 60))
            .add_norm(broken);

        assert_eq!(catalog.norms_for("WS", "Color").len(), 1);
        assert!(catalog.has_norms("WS"));
        assert!(!catalog.has_norms("WS-2"));
    }
}
