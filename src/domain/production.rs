// ==========================================
// 工位换型排程引擎 - 订单与工艺工序
// ==========================================
// 说明: 订单/工序对引擎只读，工时定额用于推算任务结束时间
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// Order - 生产订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub number: String,
    pub product_id: Option<String>,
    #[serde(default)]
    pub planned_quantity: f64,
    pub start: Option<NaiveDateTime>,  // 订单计划开始 (由任务日期并集推导)
    pub finish: Option<NaiveDateTime>, // 订单计划结束
    #[serde(default)]
    pub parent_task_id: Option<String>, // 子订单关联的上层任务
}

impl Order {
    pub fn new(id: impl Into<String>, product_id: impl Into<String>, planned_quantity: f64) -> Self {
        let id = id.into();
        Self {
            number: id.clone(),
            id,
            product_id: Some(product_id.into()),
            planned_quantity,
            start: None,
            finish: None,
            parent_task_id: None,
        }
    }

    pub fn for_parent_task(mut self, task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(task_id.into());
        self
    }
}

// ==========================================
// WorkstationTimeNorm - 工位专属工时定额
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkstationTimeNorm {
    pub tpz_secs: i64,                 // 准备时间
    pub tj_secs: i64,                  // 单件时间
    pub time_next_operation_secs: i64, // 到下道工序的间隔
}

// ==========================================
// TechnologyOperation - 工艺工序 (技术树节点)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyOperation {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub tpz_secs: i64,
    pub tj_secs: i64,
    pub time_next_operation_secs: i64,
    #[serde(default = "default_quantity_per_cycle")]
    pub quantity_per_cycle: f64, // 每循环产出
    #[serde(default = "default_staff")]
    pub optimal_staff: i32,
    #[serde(default = "default_staff")]
    pub min_staff: i32,
    #[serde(default)]
    pub tj_decreases_for_enlarged_staff: bool,
    #[serde(default)]
    pub workstation_times: HashMap<String, WorkstationTimeNorm>,
}

fn default_quantity_per_cycle() -> f64 {
    1.0
}

fn default_staff() -> i32 {
    1
}

impl TechnologyOperation {
    pub fn new(id: impl Into<String>, tpz_secs: i64, tj_secs: i64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            parent_id: None,
            tpz_secs,
            tj_secs,
            time_next_operation_secs: 0,
            quantity_per_cycle: 1.0,
            optimal_staff: 1,
            min_staff: 1,
            tj_decreases_for_enlarged_staff: false,
            workstation_times: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_next_operation_gap(mut self, secs: i64) -> Self {
        self.time_next_operation_secs = secs;
        self
    }

    pub fn with_staff(mut self, optimal: i32, min: i32, tj_decreases: bool) -> Self {
        self.optimal_staff = optimal;
        self.min_staff = min;
        self.tj_decreases_for_enlarged_staff = tj_decreases;
        self
    }

    pub fn with_workstation_time(mut self, workstation_id: impl Into<String>, norm: WorkstationTimeNorm) -> Self {
        self.workstation_times.insert(workstation_id.into(), norm);
        self
    }

    /// 工位专属定额优先，否则回落工序默认值
    pub fn time_norm_for(&self, workstation_id: Option<&str>) -> WorkstationTimeNorm {
        workstation_id
            .and_then(|ws| self.workstation_times.get(ws))
            .cloned()
            .unwrap_or(WorkstationTimeNorm {
                tpz_secs: self.tpz_secs,
                tj_secs: self.tj_secs,
                time_next_operation_secs: self.time_next_operation_secs,
            })
    }
}
