// ==========================================
// 工位换型排程引擎 - 排程参数
// ==========================================
// 职责: 调用时显式传入的排程开关，替代隐式的插件/参数判断
// ==========================================

use serde::{Deserialize, Serialize};

/// 排程参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub skip_finished_tasks: bool,                // 邻居查找时排除 FINISHED
    pub additional_time_extends_operation: bool,  // 附加时间计入结束时间
    pub include_tpz: bool,                        // 工时包含准备时间
    pub schedule_for_buffer_workstations: bool,   // 缓冲工位从排程开始时刻起排
    pub set_order_dates_based_on_task_dates: bool, // 按任务日期回写订单
    pub include_sub_orders: bool,                 // 结束时间受子订单约束
    pub max_cascade_steps: usize,                 // 单次传播的重算上限
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            skip_finished_tasks: false,
            additional_time_extends_operation: true,
            include_tpz: true,
            schedule_for_buffer_workstations: false,
            set_order_dates_based_on_task_dates: true,
            include_sub_orders: false,
            max_cascade_steps: 1000,
        }
    }
}

impl SchedulerConfig {
    /// 邻居查找需排除的状态
    pub fn excluded_neighbor_states(&self) -> Vec<crate::domain::TaskState> {
        use crate::domain::TaskState;
        if self.skip_finished_tasks {
            vec![TaskState::Rejected, TaskState::Finished]
        } else {
            vec![TaskState::Rejected]
        }
    }
}
