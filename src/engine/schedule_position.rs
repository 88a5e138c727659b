// ==========================================
// 工位换型排程引擎 - 排程位置批量重排
// ==========================================
// 基准时刻:
//   - 缓冲工位且开启 schedule_for_buffer_workstations -> 排程开始时刻
//   - 否则工位上 (排程开始之后结束的) 任务最大结束时刻，无则排程开始时刻
//   - 不早于同工位上一位置结束、子工序位置结束
// 换型: 显式前序位置优先，否则取时间线前序任务
// 开始 = 换型块结束的最近工作时刻
// 结束 = 开始 + 机器工作时间 (+ 附加时间)，不早于子工序位置结束
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::{ChangeoverInstance, Schedule, SchedulePosition, TimeRange};
use crate::engine::catalog::{AttributeCatalog, ChangeoverNormCatalog, ProductionCatalog};
use crate::engine::changeover_builder::{ChangeoverSetBuilder, PreviousLink};
use crate::engine::duration::staff_factor;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::neighbor_finder::TimelineNeighborFinder;
use crate::engine::repositories::TimelineRepositories;
use crate::repository::OrderRepository;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// 单个位置的排布结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionPlan {
    pub position_id: String,
    pub base: Option<NaiveDateTime>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub changeovers: Vec<ChangeoverInstance>,
}

/// 整个排程方案的排布结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLayout {
    pub positions: Vec<SchedulePosition>,
    pub changeovers: Vec<ChangeoverInstance>,
}

pub struct SchedulePositionPlanner {
    deps: TimelineRepositories,
    config: SchedulerConfig,
    finder: TimelineNeighborFinder,
    builder: ChangeoverSetBuilder,
}

impl SchedulePositionPlanner {
    pub fn new(deps: TimelineRepositories, config: SchedulerConfig) -> Self {
        Self {
            finder: TimelineNeighborFinder::new(deps.store.clone(), &config),
            builder: ChangeoverSetBuilder::new(deps.catalog.clone()),
            deps,
            config,
        }
    }

    /// 按给定顺序排布全部位置；同工位上一位置作为显式前序
    #[instrument(skip(self, schedule, positions), fields(schedule_id = %schedule.id))]
    pub fn plan_schedule(&self, schedule: &Schedule, positions: &[SchedulePosition]) -> EngineResult<ScheduleLayout> {
        let mut layout = ScheduleLayout::default();
        let mut last_on_workstation: HashMap<String, usize> = HashMap::new();

        for position in positions {
            let previous = position
                .workstation_id
                .as_ref()
                .and_then(|ws| last_on_workstation.get(ws))
                .map(|&idx| &layout.positions[idx]);

            let plan = self.plan_position(schedule, position, previous, &layout.positions)?;

            let mut placed = position.clone();
            placed.start = plan.start;
            placed.end = plan.end;
            if let Some(ws) = placed.workstation_id.clone() {
                last_on_workstation.insert(ws, layout.positions.len());
            }
            layout.positions.push(placed);
            layout.changeovers.extend(plan.changeovers);
        }

        info!(
            positions = layout.positions.len(),
            changeovers = layout.changeovers.len(),
            "排程位置排布完成"
        );
        Ok(layout)
    }

    /// 排布单个位置
    ///
    /// # 参数
    /// - previous: 同工位的前一位置（显式前序）
    /// - planned: 已排布的位置（用于子工序约束）
    pub fn plan_position(
        &self,
        schedule: &Schedule,
        position: &SchedulePosition,
        previous: Option<&SchedulePosition>,
        planned: &[SchedulePosition],
    ) -> EngineResult<PositionPlan> {
        let workstation_id = match position.workstation_id.as_deref() {
            Some(ws) => ws,
            None => {
                return Ok(PositionPlan {
                    position_id: position.id.clone(),
                    base: None,
                    start: None,
                    end: None,
                    changeovers: Vec::new(),
                })
            }
        };

        let mut base = self.base_time(schedule, workstation_id)?;
        if let Some(prev_end) = previous.and_then(|p| p.end) {
            base = base.max(prev_end);
        }
        let children_end = self.children_max_end(position, planned);
        if let Some(end) = children_end {
            base = base.max(end);
        }

        let changeovers = self.build_changeovers(position, workstation_id, base, previous)?;
        let anchored = ChangeoverSetBuilder::anchor(changeovers, base);

        let start = self
            .deps
            .calendar
            .nearest_working(workstation_id, anchored.block_end)?;

        let (machine_secs, additional_secs) = self.work_times(position, workstation_id);
        let mut end = self
            .deps
            .calendar
            .add_working_duration(workstation_id, start, machine_secs)?;
        if self.config.additional_time_extends_operation {
            end = end + Duration::seconds(additional_secs);
        }
        if let Some(child_end) = children_end {
            end = end.max(child_end);
        }

        debug!(
            position_id = %position.id,
            workstation_id = workstation_id,
            base = %base,
            start = %start,
            end = %end,
            "排程位置排布"
        );

        Ok(PositionPlan {
            position_id: position.id.clone(),
            base: Some(base),
            start: Some(start),
            end: Some(end),
            changeovers: anchored.instances,
        })
    }

    fn base_time(&self, schedule: &Schedule, workstation_id: &str) -> EngineResult<NaiveDateTime> {
        let is_buffer = self
            .deps
            .catalog
            .workstation(workstation_id)
            .map_or(false, |w| w.buffer);
        if is_buffer && self.config.schedule_for_buffer_workstations {
            return Ok(schedule.start_time);
        }

        let range = TimeRange {
            from: Some(schedule.start_time),
            to: None,
        };
        let tasks_max_finish = self
            .finder
            .tasks_on_workstation(workstation_id, range)?
            .into_iter()
            .filter_map(|t| t.finish)
            .filter(|f| *f > schedule.start_time)
            .max();
        Ok(tasks_max_finish.unwrap_or(schedule.start_time))
    }

    /// 同订单子工序位置的最大结束
    fn children_max_end(&self, position: &SchedulePosition, planned: &[SchedulePosition]) -> Option<NaiveDateTime> {
        planned
            .iter()
            .filter(|p| p.order_id == position.order_id)
            .filter(|p| {
                self.deps
                    .catalog
                    .operation(&p.operation_id)
                    .and_then(|op| op.parent_id)
                    .map_or(false, |parent| parent == position.operation_id)
            })
            .filter_map(|p| {
                p.end.map(|end| {
                    if self.config.additional_time_extends_operation {
                        end
                    } else {
                        end + Duration::seconds(p.additional_time_secs)
                    }
                })
            })
            .max()
    }

    /// 机器工作时间 / 附加时间；工位专属定额优先
    fn work_times(&self, position: &SchedulePosition, workstation_id: &str) -> (i64, i64) {
        let operation = match self.deps.catalog.operation(&position.operation_id) {
            Some(op) => op,
            None => return (position.machine_work_time_secs, position.additional_time_secs),
        };
        let norm = match operation.workstation_times.get(workstation_id) {
            Some(norm) => norm.clone(),
            None => return (position.machine_work_time_secs, position.additional_time_secs),
        };

        let factor = staff_factor(&operation, None);
        let tpz = if self.config.include_tpz { norm.tpz_secs } else { 0 };
        let machine = tpz + (norm.tj_secs as f64 * position.operation_runs * factor).round() as i64;
        (machine, norm.time_next_operation_secs)
    }

    fn product_of_order(&self, order_id: &str) -> EngineResult<Option<String>> {
        Ok(self
            .deps
            .store
            .find_order(order_id)?
            .and_then(|o| o.product_id))
    }

    fn build_changeovers(
        &self,
        position: &SchedulePosition,
        workstation_id: &str,
        base: NaiveDateTime,
        previous: Option<&SchedulePosition>,
    ) -> EngineResult<Vec<ChangeoverInstance>> {
        if !self.deps.catalog.has_norms(workstation_id) {
            return Ok(Vec::new());
        }

        let (previous_product, link_id, is_position) = match previous {
            Some(prev) => (self.product_of_order(&prev.order_id)?, prev.id.clone(), true),
            None => match self.finder.find_predecessor(workstation_id, base, &[])? {
                Some(task) => {
                    let product = match task.order_id.as_deref() {
                        Some(order_id) => self.product_of_order(order_id)?,
                        None => None,
                    };
                    (product, task.id, false)
                }
                None => return Ok(Vec::new()),
            },
        };

        let current_product = self.product_of_order(&position.order_id)?.ok_or_else(|| {
            EngineError::missing("product", &position.order_id, "排程位置的订单无产品，无法计算换型")
        })?;
        let current_values = self
            .deps
            .catalog
            .calculated_values(&current_product)
            .ok_or_else(|| EngineError::missing("product", &current_product, "产品不在属性目录中"))?;

        let previous_values = match previous_product.and_then(|pid| self.deps.catalog.calculated_values(&pid)) {
            Some(values) => values,
            None => return Ok(Vec::new()),
        };

        let link = if is_position {
            PreviousLink::Position(&link_id)
        } else {
            PreviousLink::Task(&link_id)
        };
        Ok(self
            .builder
            .build(workstation_id, &position.id, &current_values, &previous_values, link))
    }
}
