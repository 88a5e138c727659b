// ==========================================
// 工位换型排程引擎 - 排程方案 / 排程位置
// ==========================================
// 用途: 批量重排 (schedule -> positions) 的只读输入与输出
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub start_time: NaiveDateTime,
}

// ==========================================
// SchedulePosition - 排程位置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulePosition {
    pub id: String,
    pub schedule_id: String,
    pub order_id: String,
    pub operation_id: String,
    pub workstation_id: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub machine_work_time_secs: i64,
    pub additional_time_secs: i64,
    pub operation_runs: f64,
}

impl SchedulePosition {
    pub fn new(
        id: impl Into<String>,
        schedule_id: impl Into<String>,
        order_id: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            schedule_id: schedule_id.into(),
            order_id: order_id.into(),
            operation_id: operation_id.into(),
            workstation_id: None,
            start: None,
            end: None,
            machine_work_time_secs: 0,
            additional_time_secs: 0,
            operation_runs: 1.0,
        }
    }

    pub fn on_workstation(mut self, workstation_id: impl Into<String>) -> Self {
        self.workstation_id = Some(workstation_id.into());
        self
    }
}
