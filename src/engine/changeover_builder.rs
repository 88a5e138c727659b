// ==========================================
// 工位换型排程引擎 - 换型集合构建
// ==========================================
// 匹配: 仅 CALCULATED 属性参与
//   - 前序产品无同属性取值 -> 跳过该属性
//   - BETWEEN_VALUES: 当前值 == to 且前序取值含 from
//   - GENERIC: 恒生效
// 锚定: 串行换型首尾相接；并行换型同时从锚点开始
//   block_end = max(finish)，空集合时为锚点
// ==========================================

use crate::domain::{AttributeValue, ChangeoverInstance, NormChangeoverType};
use crate::engine::catalog::{Catalog, ChangeoverNormCatalog};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// 换型实例关联的前序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviousLink<'a> {
    Task(&'a str),
    Position(&'a str),
    None,
}

/// 锚定后的换型集合
#[derive(Debug, Clone, PartialEq)]
pub struct AnchoredChangeovers {
    pub instances: Vec<ChangeoverInstance>,
    pub block_end: NaiveDateTime,
}

pub struct ChangeoverSetBuilder {
    catalog: Arc<dyn Catalog>,
}

impl ChangeoverSetBuilder {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// 匹配前序/当前产品属性，生成未锚定的换型实例
    ///
    /// # 参数
    /// - workstation_id: 工位
    /// - current_task_id: 当前任务（或排程位置）
    /// - current_values: 当前产品的 CALCULATED 属性值
    /// - previous_values: 前序产品的 CALCULATED 属性值
    /// - previous: 前序关联
    ///
    /// # 返回
    /// 每条命中定额一个实例（按定额去重）
    pub fn build(
        &self,
        workstation_id: &str,
        current_task_id: &str,
        current_values: &[AttributeValue],
        previous_values: &[AttributeValue],
        previous: PreviousLink<'_>,
    ) -> Vec<ChangeoverInstance> {
        let (previous_task_id, previous_position_id) = match previous {
            PreviousLink::Task(id) => (Some(id), None),
            PreviousLink::Position(id) => (None, Some(id)),
            PreviousLink::None => (None, None),
        };

        let mut seen_norms: HashSet<String> = HashSet::new();
        let mut instances = Vec::new();

        for cv in current_values.iter().filter(|v| v.is_calculated()) {
            let matching: Vec<&str> = previous_values
                .iter()
                .filter(|pv| pv.is_calculated() && pv.attribute_id == cv.attribute_id)
                .map(|pv| pv.value_id.as_str())
                .collect();
            if matching.is_empty() {
                continue;
            }

            for norm in self.catalog.norms_for(workstation_id, &cv.attribute_id) {
                let applies = match norm.changeover_type {
                    NormChangeoverType::Generic => true,
                    NormChangeoverType::BetweenValues => {
                        norm.to_value_id.as_deref() == Some(cv.value_id.as_str())
                            && norm
                                .from_value_id
                                .as_deref()
                                .map_or(false, |from| matching.contains(&from))
                    }
                };
                if applies && seen_norms.insert(norm.id.clone()) {
                    instances.push(ChangeoverInstance::from_norm(
                        &norm,
                        current_task_id,
                        previous_task_id,
                        previous_position_id,
                    ));
                }
            }
        }

        debug!(
            workstation_id = workstation_id,
            current_task_id = current_task_id,
            matched = instances.len(),
            "换型定额匹配完成"
        );
        instances
    }

    /// 以 reference_start 为锚点排布换型
    pub fn anchor(instances: Vec<ChangeoverInstance>, reference_start: NaiveDateTime) -> AnchoredChangeovers {
        let mut block_end = reference_start;
        let mut chain_end = reference_start;

        let anchored = instances
            .into_iter()
            .map(|mut inst| {
                let start = if inst.parallel { reference_start } else { chain_end };
                let finish = start + Duration::seconds(inst.duration_secs);
                if !inst.parallel {
                    chain_end = finish;
                }
                block_end = block_end.max(finish);
                inst.start = Some(start);
                inst.finish = Some(finish);
                inst
            })
            .collect();

        AnchoredChangeovers {
            instances: anchored,
            block_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChangeoverNorm;
    use crate::engine::catalog::InMemoryCatalog;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn builder(norms: Vec<ChangeoverNorm>) -> ChangeoverSetBuilder {
        let mut catalog = InMemoryCatalog::new();
        for n in norms {
            catalog.add_norm(n);
        }
        ChangeoverSetBuilder::new(Arc::new(catalog))
    }

    fn color(v: &str) -> Vec<AttributeValue> {
        vec![AttributeValue::calculated("Color", v)]
    }

    #[test]
    fn test_between_values_requires_both_ends() {
        let b = builder(vec![ChangeoverNorm::between_values(
            "N-RB", "WS", "Color", "Red", "Blue", 600,
        )]);

        let hit = b.build("WS", "B", &color("Blue"), &color("Red"), PreviousLink::Task("A"));
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].previous_task_id.as_deref(), Some("A"));

        assert!(b.build("WS", "B", &color("Blue"), &color("Green"), PreviousLink::Task("A")).is_empty());
        assert!(b.build("WS", "B", &color("Red"), &color("Red"), PreviousLink::Task("A")).is_empty());
    }

    #[test]
    fn test_missing_previous_attribute_skips_generic() {
        let b = builder(vec![ChangeoverNorm::generic("N-G", "WS", "Color", 300)]);
        let previous = vec![AttributeValue::calculated("Width", "1200")];
        assert!(b.build("WS", "B", &color("Blue"), &previous, PreviousLink::None).is_empty());

        // 非 CALCULATED 取值不参与
        let previous = vec![AttributeValue::other("Color", "Red")];
        assert!(b.build("WS", "B", &color("Blue"), &previous, PreviousLink::None).is_empty());

        assert_eq!(b.build("WS", "B", &color("Blue"), &color("Blue"), PreviousLink::None).len(), 1);
    }

    #[test]
    fn test_one_instance_per_norm() {
        let b = builder(vec![ChangeoverNorm::generic("N-G", "WS", "Color", 300)]);
        let current = vec![
            AttributeValue::calculated("Color", "Blue"),
            AttributeValue::calculated("Color", "Navy"),
        ];
        let built = b.build("WS", "B", &current, &color("Red"), PreviousLink::Position("POS-1"));
        assert_eq!(built.len(), 1);
        assert!(built[0].previous_task_id.is_none());
        assert_eq!(built[0].previous_position_id.as_deref(), Some("POS-1"));
    }

    #[test]
    fn test_anchor_chain_sum_and_max_merge() {
        let b = builder(vec![
            ChangeoverNorm::generic("N-1", "WS", "Color", 600),
            ChangeoverNorm::generic("N-2", "WS", "Color", 300),
            ChangeoverNorm::generic("N-3", "WS", "Color", 1800).in_parallel(),
        ]);
        let built = b.build("WS", "B", &color("Blue"), &color("Red"), PreviousLink::None);
        let anchored = ChangeoverSetBuilder::anchor(built, at(9, 0));

        let by_norm = |id: &str| {
            anchored
                .instances
                .iter()
                .find(|i| i.norm_id.as_deref() == Some(id))
                .unwrap()
                .clone()
        };
        assert_eq!(by_norm("N-1").start, Some(at(9, 0)));
        assert_eq!(by_norm("N-2").start, Some(at(9, 10)));
        assert_eq!(by_norm("N-2").finish, Some(at(9, 15)));
        assert_eq!(by_norm("N-3").start, Some(at(9, 0)));
        // 并行 30 分钟 > 串行 15 分钟
        assert_eq!(anchored.block_end, at(9, 30));
    }

    #[test]
    fn test_anchor_empty_set_keeps_reference() {
        let anchored = ChangeoverSetBuilder::anchor(Vec::new(), at(9, 0));
        assert!(anchored.instances.is_empty());
        assert_eq!(anchored.block_end, at(9, 0));
    }
}
