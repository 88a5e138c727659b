// ==========================================
// 工位换型排程引擎 - 工序工时计算
// ==========================================
// 机器时间 = [tpz] + tj × 次数 × 人员系数
// 次数 = ceil(计划数量 / 每循环产出)
// 人员系数 = 最佳人数 / 实际人数 (仅 tj 随人数减少时)
// ==========================================

use crate::domain::TechnologyOperation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperationDuration {
    pub machine_secs: i64,       // 占用工位的工作时间
    pub follow_on_gap_secs: i64, // 到下道工序的间隔
    pub runs: f64,
    pub staff_factor: f64,
}

/// 工序执行次数
pub fn operation_runs(planned_quantity: f64, quantity_per_cycle: f64) -> f64 {
    if planned_quantity <= 0.0 {
        return 0.0;
    }
    if quantity_per_cycle <= 0.0 {
        return planned_quantity.ceil();
    }
    (planned_quantity / quantity_per_cycle).ceil().max(1.0)
}

/// 人员系数；实际人数缺省时取最佳人数
pub fn staff_factor(operation: &TechnologyOperation, actual_staff: Option<i32>) -> f64 {
    if !operation.tj_decreases_for_enlarged_staff {
        return 1.0;
    }
    let actual = actual_staff.unwrap_or(operation.optimal_staff);
    if actual <= 0 || operation.optimal_staff <= 0 {
        return 1.0;
    }
    f64::from(operation.optimal_staff) / f64::from(actual)
}

/// 计算工序时长
///
/// # 参数
/// - workstation_id: 工位（工位专属定额优先）
/// - include_tpz: 是否包含准备时间
/// - include_follow_on_gap: 是否附加到下道工序的间隔
pub fn operation_duration(
    operation: &TechnologyOperation,
    workstation_id: Option<&str>,
    planned_quantity: f64,
    actual_staff: Option<i32>,
    include_tpz: bool,
    include_follow_on_gap: bool,
) -> OperationDuration {
    let norm = operation.time_norm_for(workstation_id);
    let runs = operation_runs(planned_quantity, operation.quantity_per_cycle);
    let factor = staff_factor(operation, actual_staff);

    let tj_total = (norm.tj_secs as f64 * runs * factor).round() as i64;
    let tpz = if include_tpz { norm.tpz_secs } else { 0 };

    OperationDuration {
        machine_secs: tpz + tj_total,
        follow_on_gap_secs: if include_follow_on_gap {
            norm.time_next_operation_secs
        } else {
            0
        },
        runs,
        staff_factor: factor,
    }
}
