// ==========================================
// 工位换型排程引擎 - 时间线服务 (编排器)
// ==========================================
// 用途: 任务保存 / 删除 / 重排的入口，协调排程器与传播协调器
// 流程:
//   1. 变更检测 (工位 / 请求开始 / 结束 / 订单 / 工序 / 人数 / 状态)
//   2. 排程 -> 校验失败则不落库
//   3. 落库任务与当前换型集合 -> 订单日期回写
//   4. 受影响任务入队，逐个在守卫下重算 (迭代，非递归)
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::Task;
use crate::engine::cascade::{CascadeCoordinator, PropagationContext, TaskChange};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{
    OptionalOrderDateAdjuster, OptionalValidationSink, OrderBoundsAdjuster, OrderDateAdjuster,
    ValidationSink,
};
use crate::engine::repositories::TimelineRepositories;
use crate::engine::scheduler::{PredecessorHint, ScheduleOutcome, ScheduleRequest, TaskScheduler};
use crate::repository::{ChangeoverRepository, TaskRepository};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ==========================================
// SaveReport - 单次变更的处理结果
// ==========================================

/// 传播中单个任务的失败（不影响同批其它任务）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeFailure {
    pub task_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveReport {
    pub task_id: String,
    pub outcome: Option<ScheduleOutcome>, // None: 无排程相关变更
    pub cascaded: Vec<ScheduleOutcome>,
    pub failures: Vec<CascadeFailure>,
    pub order_reconciled: bool,
    pub cascade_steps: usize,
}

impl SaveReport {
    fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            outcome: None,
            cascaded: Vec::new(),
            failures: Vec::new(),
            order_reconciled: false,
            cascade_steps: 0,
        }
    }

    /// 本次变更已落库
    pub fn is_committed(&self) -> bool {
        self.outcome.as_ref().map_or(true, ScheduleOutcome::is_committable)
    }

    /// 传播重算过的任务ID（按处理顺序）
    pub fn cascaded_task_ids(&self) -> Vec<&str> {
        self.cascaded.iter().map(|o| o.task_id.as_str()).collect()
    }
}

/// 单个任务的处理结果
struct Step {
    outcome: Option<ScheduleOutcome>,
    updated: Option<Task>,
    affected: Vec<Task>,
    order_reconciled: bool,
}

impl Step {
    fn untouched() -> Self {
        Self {
            outcome: None,
            updated: None,
            affected: Vec::new(),
            order_reconciled: false,
        }
    }
}

/// 排程相关字段是否变化
fn schedule_fields_changed(previous: Option<&Task>, task: &Task) -> bool {
    match previous {
        None => true,
        Some(p) => {
            p.workstation_id != task.workstation_id
                || p.requested_or_start() != task.requested_or_start()
                || p.finish != task.finish
                || p.order_id != task.order_id
                || p.operation_id != task.operation_id
                || p.actual_staff != task.actual_staff
                || p.state != task.state
        }
    }
}

// ==========================================
// TimelineService - 时间线服务
// ==========================================
pub struct TimelineService {
    deps: TimelineRepositories,
    scheduler: TaskScheduler,
    cascade: CascadeCoordinator,
    adjuster: OptionalOrderDateAdjuster,
}

impl TimelineService {
    /// 创建服务；订单回写默认使用 OrderBoundsAdjuster
    ///
    /// # 参数
    /// - deps: 仓储 / 目录 / 日历
    /// - config: 排程参数
    pub fn new(deps: TimelineRepositories, config: SchedulerConfig) -> Self {
        let adjuster: Arc<dyn OrderDateAdjuster> = Arc::new(OrderBoundsAdjuster::new(deps.store.clone()));
        Self {
            scheduler: TaskScheduler::new(deps.clone(), config),
            cascade: CascadeCoordinator::new(deps.store.clone()),
            adjuster: OptionalOrderDateAdjuster::with_adjuster(adjuster),
            deps,
        }
    }

    pub fn with_validation_sink(mut self, sink: Arc<dyn ValidationSink>) -> Self {
        self.scheduler = self
            .scheduler
            .with_validation_sink(OptionalValidationSink::with_sink(sink));
        self
    }

    pub fn with_order_adjuster(mut self, adjuster: OptionalOrderDateAdjuster) -> Self {
        self.adjuster = adjuster;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn repositories(&self) -> &TimelineRepositories {
        &self.deps
    }

    /// 保存任务（创建或更新）并传播
    ///
    /// # 返回
    /// - Ok(report): report.outcome 为 ERROR 时本任务未落库，也不传播
    /// - Err: 本任务缺少引用 / 仓储失败 / 传播超限（调用方回滚事务）
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn save_task(&self, task: Task) -> EngineResult<SaveReport> {
        let mut ctx = PropagationContext::new(self.config().max_cascade_steps);
        let mut report = SaveReport::new(&task.id);
        ctx.mark_visited(&task.id);

        let step = self.process(task, None, &[], &ctx)?;
        self.finish_root(step, &[], &mut ctx, &mut report)?;
        Ok(report)
    }

    /// 强制重排任务（重建换型并传播）
    #[instrument(skip(self))]
    pub fn reschedule_task(&self, task_id: &str) -> EngineResult<SaveReport> {
        let task = self
            .deps
            .store
            .find_task(task_id)?
            .ok_or_else(|| EngineError::missing("task", task_id, "重排的任务不存在"))?;

        let mut ctx = PropagationContext::new(self.config().max_cascade_steps);
        let mut report = SaveReport::new(task_id);
        ctx.mark_visited(task_id);

        ctx.guard(task_id);
        let step = self.process(task, None, &[], &ctx);
        ctx.release(task_id);

        self.finish_root(step?, &[], &mut ctx, &mut report)?;
        Ok(report)
    }

    /// 删除任务并重算原后继
    #[instrument(skip(self))]
    pub fn delete_task(&self, task_id: &str) -> EngineResult<SaveReport> {
        let task = self
            .deps
            .store
            .find_task(task_id)?
            .ok_or_else(|| EngineError::missing("task", task_id, "删除的任务不存在"))?;

        let mut ctx = PropagationContext::new(self.config().max_cascade_steps);
        let mut report = SaveReport::new(task_id);
        ctx.mark_visited(task_id);

        let affected = self.cascade.on_task_deleted(&task, self.scheduler.finder())?;
        self.deps.store.delete_task(task_id)?;

        if self.config().set_order_dates_based_on_task_dates {
            if let Some(order_id) = task.order_id.as_deref() {
                report.order_reconciled = self.adjuster.reconcile(order_id)?;
            }
        }

        let excluded = vec![task_id.to_string()];
        self.propagate(affected, None, &excluded, &mut ctx, &mut report)?;
        report.cascade_steps = ctx.steps();
        info!(task_id = task_id, cascaded = report.cascaded.len(), "任务删除完成");
        Ok(report)
    }

    fn finish_root(
        &self,
        step: Step,
        excluded: &[String],
        ctx: &mut PropagationContext,
        report: &mut SaveReport,
    ) -> EngineResult<()> {
        report.order_reconciled = step.order_reconciled;
        report.outcome = step.outcome;
        self.propagate(step.affected, step.updated.as_ref(), excluded, ctx, report)?;
        report.cascade_steps = ctx.steps();
        info!(
            task_id = %report.task_id,
            committed = report.is_committed(),
            cascaded = report.cascaded.len(),
            failures = report.failures.len(),
            "任务保存完成"
        );
        Ok(())
    }

    /// 单个任务：变更检测 -> 排程 -> 落库 -> 收集受影响任务
    fn process(
        &self,
        task: Task,
        cause: Option<&Task>,
        excluded: &[String],
        ctx: &PropagationContext,
    ) -> EngineResult<Step> {
        let previous = self.deps.store.find_task(&task.id)?;
        let guarded = ctx.is_guarded(&task.id);

        if !guarded && !schedule_fields_changed(previous.as_ref(), &task) {
            debug!(task_id = %task.id, "排程字段未变化，仅保存");
            self.deps.store.save_task(&task)?;
            return Ok(Step::untouched());
        }

        let request = ScheduleRequest::for_task(&task, self.config()).with_predecessor(PredecessorHint::Discover {
            also_consider: cause.cloned(),
            exclude: excluded.to_vec(),
        });
        let outcome = self.scheduler.schedule(&task, &request)?;
        if !outcome.is_committable() {
            warn!(task_id = %task.id, "校验失败，日期不落库");
            return Ok(Step {
                outcome: Some(outcome),
                updated: None,
                affected: Vec::new(),
                order_reconciled: false,
            });
        }

        let mut updated = task;
        let moved = outcome.moves(&updated);
        outcome.apply_to(&mut updated);
        self.persist(&updated, &outcome)?;
        let order_reconciled = self.reconcile_order(&updated, &outcome)?;

        // 传播中的任务只有日期移动时才继续向后传播
        let affected = if !guarded || previous.is_none() || moved {
            let change = TaskChange::from_previous(previous.as_ref());
            self.cascade
                .collect_affected(&updated, &change, self.scheduler.finder())?
        } else {
            Vec::new()
        };

        Ok(Step {
            outcome: Some(outcome),
            updated: Some(updated),
            affected,
            order_reconciled,
        })
    }

    /// 迭代处理受影响任务
    fn propagate(
        &self,
        initial: Vec<Task>,
        cause: Option<&Task>,
        excluded: &[String],
        ctx: &mut PropagationContext,
        report: &mut SaveReport,
    ) -> EngineResult<()> {
        let mut queue: VecDeque<(String, Option<Task>)> =
            initial.into_iter().map(|t| (t.id, cause.cloned())).collect();

        while let Some((task_id, cause)) = queue.pop_front() {
            if !ctx.mark_visited(&task_id) {
                continue;
            }
            let current = match self.deps.store.find_task(&task_id)? {
                Some(t) => t,
                None => continue,
            };
            ctx.record_step()?;

            ctx.guard(&task_id);
            let step = self.process(current, cause.as_ref(), excluded, ctx);
            ctx.release(&task_id);

            match step {
                Ok(step) => {
                    report.order_reconciled |= step.order_reconciled;
                    for next in step.affected {
                        if !ctx.is_visited(&next.id) {
                            queue.push_back((next.id, step.updated.clone()));
                        }
                    }
                    if let Some(outcome) = step.outcome {
                        report.cascaded.push(outcome);
                    }
                }
                Err(e) if e.is_task_local() => {
                    warn!(task_id = %task_id, error = %e, "传播中任务重算失败，继续处理其它任务");
                    report.failures.push(CascadeFailure {
                        task_id: task_id.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn persist(&self, task: &Task, outcome: &ScheduleOutcome) -> EngineResult<()> {
        self.deps.store.save_task(task)?;
        if task.workstation_id.is_none() {
            // 离开时间线：当前换型全部清空
            for inst in self.deps.store.find_current_changeovers(&task.id)? {
                self.deps.store.delete_changeover(&inst.id)?;
            }
        } else {
            self.deps
                .store
                .replace_current_changeovers(&task.id, &outcome.changeovers)?;
        }
        Ok(())
    }

    fn reconcile_order(&self, task: &Task, outcome: &ScheduleOutcome) -> EngineResult<bool> {
        if !self.config().set_order_dates_based_on_task_dates || !outcome.changeovers_valid() {
            return Ok(false);
        }
        match task.order_id.as_deref() {
            Some(order_id) => self.adjuster.reconcile(order_id),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_change_detection() {
        let stored = Task::new("A").with_workstation("R").with_dates(at(8), at(9));
        assert!(schedule_fields_changed(None, &stored));
        assert!(!schedule_fields_changed(Some(&stored), &stored.clone()));

        let mut renamed = stored.clone();
        renamed.number = "A-renamed".to_string();
        assert!(!schedule_fields_changed(Some(&stored), &renamed));

        let moved = stored.clone().with_workstation("R2");
        assert!(schedule_fields_changed(Some(&stored), &moved));

        let rejected = stored.clone().with_state(TaskState::Rejected);
        assert!(schedule_fields_changed(Some(&stored), &rejected));
    }
}
