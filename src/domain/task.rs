// ==========================================
// 工位换型排程引擎 - 作业任务领域模型
// ==========================================
// 红线: 引擎只修改排程相关字段 (start/finish/换型集合)
// 红线: shouldSkip 不落库，改由 PropagationContext 承载
// ==========================================

use crate::domain::types::TaskState;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Task - 作业任务 (Operational Task)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,                             // 任务ID
    pub number: String,                         // 任务编号
    pub workstation_id: Option<String>,         // 工位 (未分配时为空)
    pub requested_start: Option<NaiveDateTime>, // 上游计划给出的开始时间
    pub start: Option<NaiveDateTime>,           // 生效开始时间 (含换型)
    pub finish: Option<NaiveDateTime>,          // 生效结束时间
    pub order_id: Option<String>,               // 所属订单
    pub operation_id: Option<String>,           // 工艺工序
    pub parent_id: Option<String>,              // 层级父任务
    pub actual_staff: Option<i32>,              // 实际人数
    pub state: TaskState,                       // 生命周期状态
}

impl Task {
    /// 创建待排程任务（PENDING，无工位无日期）
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            number: id.clone(),
            id,
            workstation_id: None,
            requested_start: None,
            start: None,
            finish: None,
            order_id: None,
            operation_id: None,
            parent_id: None,
            actual_staff: None,
            state: TaskState::Pending,
        }
    }

    pub fn with_workstation(mut self, workstation_id: impl Into<String>) -> Self {
        self.workstation_id = Some(workstation_id.into());
        self
    }

    pub fn with_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// 设置计划时段（requested_start 与 start 同步）
    pub fn with_dates(mut self, start: NaiveDateTime, finish: NaiveDateTime) -> Self {
        self.requested_start = Some(start);
        self.start = Some(start);
        self.finish = Some(finish);
        self
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    /// 请求开始时间；旧数据没有 requested_start 时退回 start
    pub fn requested_or_start(&self) -> Option<NaiveDateTime> {
        self.requested_start.or(self.start)
    }

    /// 是否已落在时间线上（有工位且有开始时间）
    pub fn is_on_timeline(&self) -> bool {
        self.workstation_id.is_some() && self.start.is_some()
    }

    pub fn is_on_workstation(&self, workstation_id: &str) -> bool {
        self.workstation_id.as_deref() == Some(workstation_id)
    }

    /// start ≤ finish（任一为空视为满足）
    pub fn dates_in_order(&self) -> bool {
        match (self.start, self.finish) {
            (Some(s), Some(f)) => s <= f,
            _ => true,
        }
    }
}

// ==========================================
// TimeRange - 闭区间时间范围
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self { from: None, to: None }
    }

    pub fn between(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// 任务时段与范围是否相交（无日期任务只在无界范围内命中）
    pub fn intersects(&self, task: &Task) -> bool {
        let (start, finish) = match (task.start, task.finish) {
            (Some(s), Some(f)) => (s, f),
            (Some(s), None) => (s, s),
            (None, Some(f)) => (f, f),
            (None, None) => return self.from.is_none() && self.to.is_none(),
        };
        let after_from = self.from.map_or(true, |from| finish >= from);
        let before_to = self.to.map_or(true, |to| start <= to);
        after_from && before_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_task_builder_sets_requested_start() {
        let task = Task::new("OT-1").with_workstation("WS-1").with_dates(at(8, 0), at(9, 0));
        assert_eq!(task.requested_start, Some(at(8, 0)));
        assert!(task.is_on_timeline());
        assert!(task.dates_in_order());
    }

    #[test]
    fn test_time_range_intersects() {
        let task = Task::new("OT-1").with_dates(at(8, 0), at(9, 0));
        assert!(TimeRange::between(at(8, 30), at(10, 0)).intersects(&task));
        assert!(!TimeRange::between(at(9, 30), at(10, 0)).intersects(&task));
        assert!(TimeRange::unbounded().intersects(&Task::new("OT-2")));
        assert!(!TimeRange::between(at(8, 0), at(9, 0)).intersects(&Task::new("OT-2")));
    }
}
