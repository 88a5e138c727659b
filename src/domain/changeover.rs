// ==========================================
// 工位换型排程引擎 - 换型定额与换型实例
// ==========================================
// 红线: 派生实例 (BASED_ON_NORM) 每条定额在一个任务上只出现一次
// 红线: 人工实例 (OWN) 不被定额重算删除
// ==========================================

use crate::domain::types::{ChangeoverType, NormChangeoverType};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// ChangeoverNorm - 换型定额 (只读输入)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeoverNorm {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub workstation_id: String,
    pub attribute_id: String,
    pub changeover_type: NormChangeoverType,
    pub from_value_id: Option<String>, // 仅 BETWEEN_VALUES 必填
    pub to_value_id: Option<String>,   // 仅 BETWEEN_VALUES 必填
    pub duration_secs: i64,            // 时长 (秒)
    #[serde(default)]
    pub parallel: bool, // 并行换型
}

impl ChangeoverNorm {
    /// 通用定额：属性存在即产生换型
    pub fn generic(
        id: impl Into<String>,
        workstation_id: impl Into<String>,
        attribute_id: impl Into<String>,
        duration_secs: i64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            workstation_id: workstation_id.into(),
            attribute_id: attribute_id.into(),
            changeover_type: NormChangeoverType::Generic,
            from_value_id: None,
            to_value_id: None,
            duration_secs,
            parallel: false,
        }
    }

    /// 取值间定额：from -> to
    pub fn between_values(
        id: impl Into<String>,
        workstation_id: impl Into<String>,
        attribute_id: impl Into<String>,
        from_value_id: impl Into<String>,
        to_value_id: impl Into<String>,
        duration_secs: i64,
    ) -> Self {
        let mut norm = Self::generic(id, workstation_id, attribute_id, duration_secs);
        norm.changeover_type = NormChangeoverType::BetweenValues;
        norm.from_value_id = Some(from_value_id.into());
        norm.to_value_id = Some(to_value_id.into());
        norm
    }

    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// BETWEEN_VALUES 定额必须同时具备 from/to
    pub fn is_well_formed(&self) -> bool {
        match self.changeover_type {
            NormChangeoverType::Generic => self.duration_secs >= 0,
            NormChangeoverType::BetweenValues => {
                self.duration_secs >= 0 && self.from_value_id.is_some() && self.to_value_id.is_some()
            }
        }
    }
}

// ==========================================
// ChangeoverInstance - 换型实例
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeoverInstance {
    pub id: String,
    pub norm_id: Option<String>,              // 人工实例可不关联定额
    pub name: String,
    pub description: Option<String>,
    pub workstation_id: String,
    pub attribute_id: Option<String>,
    pub from_value_id: Option<String>,
    pub to_value_id: Option<String>,
    pub current_task_id: String,              // 当前任务
    pub previous_task_id: Option<String>,     // 前序任务 (来自其它时间线时为空)
    pub previous_position_id: Option<String>, // 前序排程位置 (批量重排时)
    pub duration_secs: i64,
    pub parallel: bool,
    pub start: Option<NaiveDateTime>,
    pub finish: Option<NaiveDateTime>,
    pub changeover_type: ChangeoverType,
}

impl ChangeoverInstance {
    /// 派生实例ID：同一任务 + 同一定额得到同一ID，重算幂等
    pub fn derived_id(current_task_id: &str, norm_id: &str) -> String {
        let key = format!("{}/{}", current_task_id, norm_id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }

    /// 由定额推导实例（未锚定时间）
    pub fn from_norm(
        norm: &ChangeoverNorm,
        current_task_id: &str,
        previous_task_id: Option<&str>,
        previous_position_id: Option<&str>,
    ) -> Self {
        Self {
            id: Self::derived_id(current_task_id, &norm.id),
            norm_id: Some(norm.id.clone()),
            name: norm.name.clone(),
            description: norm.description.clone(),
            workstation_id: norm.workstation_id.clone(),
            attribute_id: Some(norm.attribute_id.clone()),
            from_value_id: norm.from_value_id.clone(),
            to_value_id: norm.to_value_id.clone(),
            current_task_id: current_task_id.to_string(),
            previous_task_id: previous_task_id.map(str::to_string),
            previous_position_id: previous_position_id.map(str::to_string),
            duration_secs: norm.duration_secs,
            parallel: norm.parallel,
            start: None,
            finish: None,
            changeover_type: ChangeoverType::BasedOnNorm,
        }
    }

    /// 人工维护的换型实例
    pub fn own(
        name: impl Into<String>,
        workstation_id: impl Into<String>,
        current_task_id: impl Into<String>,
        previous_task_id: Option<String>,
        start: NaiveDateTime,
        duration_secs: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            norm_id: None,
            name: name.into(),
            description: None,
            workstation_id: workstation_id.into(),
            attribute_id: None,
            from_value_id: None,
            to_value_id: None,
            current_task_id: current_task_id.into(),
            previous_task_id,
            previous_position_id: None,
            duration_secs,
            parallel: false,
            start: Some(start),
            finish: Some(start + Duration::seconds(duration_secs)),
            changeover_type: ChangeoverType::Own,
        }
    }

    pub fn is_based_on_norm(&self) -> bool {
        self.changeover_type == ChangeoverType::BasedOnNorm
    }

    pub fn is_own(&self) -> bool {
        self.changeover_type == ChangeoverType::Own
    }

    /// 单条实例校验：时段完整且有序
    pub fn is_valid(&self) -> bool {
        match (self.start, self.finish) {
            (Some(s), Some(f)) => s <= f && self.duration_secs >= 0,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_id_is_stable() {
        let a = ChangeoverInstance::derived_id("OT-B", "N-1");
        let b = ChangeoverInstance::derived_id("OT-B", "N-1");
        let c = ChangeoverInstance::derived_id("OT-C", "N-1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_between_values_norm_requires_both_ends() {
        let mut norm = ChangeoverNorm::between_values("N-1", "WS", "Color", "Red", "Blue", 600);
        assert!(norm.is_well_formed());
        norm.to_value_id = None;
        assert!(!norm.is_well_formed());
    }

    #[test]
    fn test_instance_without_dates_is_invalid() {
        let norm = ChangeoverNorm::generic("N-1", "WS", "Color", 60);
        let inst = ChangeoverInstance::from_norm(&norm, "OT-B", Some("OT-A"), None);
        assert!(!inst.is_valid());
        assert!(inst.is_based_on_norm());
    }
}
