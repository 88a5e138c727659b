// ==========================================
// 工位换型排程引擎 - 任务排程器
// ==========================================
// 流程:
//   1. 定位前序 -> 构建换型 -> 锚定 -> 吸附最近工作时刻
//   2. 工序工时 (次数 / 人员系数 / tpz / 工序间隔)
//   3. 按工作日历推算结束时间
//   4. 结束时间不早于子任务 (及子订单)
//   5. 层级顺序校验 (违规不抛错，结果码 ERROR)
// 红线: 排程器只计算不落库
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::{
    ChangeoverInstance, DateField, SetDateResult, Task, TaskState, ViolationReason,
};
use crate::engine::changeover_builder::{ChangeoverSetBuilder, PreviousLink};
use crate::engine::catalog::{AttributeCatalog, ChangeoverNormCatalog, ProductionCatalog};
use crate::engine::duration::operation_duration;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{DateViolation, OptionalValidationSink};
use crate::engine::neighbor_finder::{latest_finishing, TimelineNeighborFinder};
use crate::engine::repositories::TimelineRepositories;
use crate::repository::{ChangeoverRepository, OrderRepository, TaskRepository};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

// ==========================================
// 请求 / 结果
// ==========================================

/// 前序来源
#[derive(Debug, Clone, PartialEq)]
pub enum PredecessorHint {
    /// 时间线查找，并纳入已关联的前序与额外候选
    Discover {
        also_consider: Option<Task>,
        exclude: Vec<String>,
    },
    /// 调用方已知前序（批量重排）
    Explicit(Task),
    /// 不取前序
    None,
}

impl Default for PredecessorHint {
    fn default() -> Self {
        PredecessorHint::Discover {
            also_consider: None,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    pub requested_start: Option<NaiveDateTime>,
    pub requested_finish: Option<NaiveDateTime>,
    pub predecessor: PredecessorHint,
    pub include_setup: bool,         // 工时含 tpz
    pub include_follow_on_gap: bool, // 结束时间含工序间隔
}

impl ScheduleRequest {
    /// 按任务当前字段与参数构造请求
    pub fn for_task(task: &Task, config: &SchedulerConfig) -> Self {
        Self {
            requested_start: task.requested_or_start(),
            requested_finish: task.finish,
            predecessor: PredecessorHint::default(),
            include_setup: config.include_tpz,
            include_follow_on_gap: config.additional_time_extends_operation,
        }
    }

    pub fn with_predecessor(mut self, hint: PredecessorHint) -> Self {
        self.predecessor = hint;
        self
    }
}

/// 排程结果（未落库）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub task_id: String,
    pub start: Option<NaiveDateTime>,
    pub finish: Option<NaiveDateTime>,
    pub changeovers: Vec<ChangeoverInstance>,
    pub predecessor_id: Option<String>,
    pub result: SetDateResult,
    pub violations: Vec<DateViolation>,
}

impl ScheduleOutcome {
    fn unchanged(task: &Task, start: Option<NaiveDateTime>, finish: Option<NaiveDateTime>) -> Self {
        Self {
            task_id: task.id.clone(),
            start,
            finish,
            changeovers: Vec::new(),
            predecessor_id: None,
            result: SetDateResult::None,
            violations: Vec::new(),
        }
    }

    /// 校验通过，可落库
    pub fn is_committable(&self) -> bool {
        !self.result.is_error()
    }

    /// 全部换型实例有效
    pub fn changeovers_valid(&self) -> bool {
        self.changeovers.iter().all(ChangeoverInstance::is_valid)
    }

    /// 把计算结果写回任务
    pub fn apply_to(&self, task: &mut Task) {
        task.start = self.start;
        task.finish = self.finish;
    }

    /// 开始/结束是否相对任务当前值发生变化
    pub fn moves(&self, task: &Task) -> bool {
        task.start != self.start || task.finish != self.finish
    }
}

// ==========================================
// TaskScheduler - 任务排程器
// ==========================================
pub struct TaskScheduler {
    deps: TimelineRepositories,
    config: SchedulerConfig,
    finder: TimelineNeighborFinder,
    builder: ChangeoverSetBuilder,
    sink: OptionalValidationSink,
}

impl TaskScheduler {
    pub fn new(deps: TimelineRepositories, config: SchedulerConfig) -> Self {
        Self {
            finder: TimelineNeighborFinder::new(deps.store.clone(), &config),
            builder: ChangeoverSetBuilder::new(deps.catalog.clone()),
            sink: OptionalValidationSink::none(),
            deps,
            config,
        }
    }

    pub fn with_validation_sink(mut self, sink: OptionalValidationSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn finder(&self) -> &TimelineNeighborFinder {
        &self.finder
    }

    /// 计算任务的生效开始/结束时间与换型集合
    ///
    /// # 参数
    /// - task: 任务（工位取自 task.workstation_id）
    /// - request: 请求时间与前序来源
    ///
    /// # 返回
    /// - Ok(outcome): 计算结果；outcome.result == ERROR 时不可落库
    /// - Err(MissingReference): 缺少必需的产品/工序/订单
    #[instrument(skip(self, task, request), fields(task_id = %task.id))]
    pub fn schedule(&self, task: &Task, request: &ScheduleRequest) -> EngineResult<ScheduleOutcome> {
        let workstation_id = match task.workstation_id.as_deref() {
            Some(ws) => ws,
            None => {
                debug!("任务未分配工位，清空结束时间与换型");
                return Ok(ScheduleOutcome::unchanged(task, request.requested_start, None));
            }
        };
        let requested_start = match request.requested_start {
            Some(s) => s,
            None => {
                debug!("任务无请求开始时间，跳过排程");
                return Ok(ScheduleOutcome::unchanged(task, None, request.requested_finish));
            }
        };

        // ===== 步骤1: 前序与换型 =====
        let predecessor = self.resolve_predecessor(task, workstation_id, requested_start, &request.predecessor)?;
        let (changeovers, anchor) = match &predecessor {
            Some(prev) => {
                let instances = self.build_changeovers(task, workstation_id, prev)?;
                if instances.is_empty() {
                    (Vec::new(), requested_start)
                } else {
                    let reference = prev.finish.map_or(requested_start, |f| f.max(requested_start));
                    let anchored = ChangeoverSetBuilder::anchor(instances, reference);
                    (anchored.instances, anchored.block_end)
                }
            }
            None => (Vec::new(), requested_start),
        };

        let effective_start = self.deps.calendar.nearest_working(workstation_id, anchor)?;
        let mut result = if effective_start != anchor {
            SetDateResult::StartDateNearest
        } else {
            SetDateResult::None
        };

        // ===== 步骤2-3: 结束时间 =====
        let finish = self.compute_finish(task, workstation_id, requested_start, effective_start, request, &mut result)?;

        // ===== 步骤4: 子任务约束 =====
        let finish = self.clamp_to_children(task, finish)?;

        // ===== 步骤5: 层级校验 =====
        let violations = self.validate(task, effective_start, finish)?;
        if !violations.is_empty() {
            result = SetDateResult::Error;
            for v in &violations {
                warn!(
                    task_id = %v.task_id,
                    field = %v.field,
                    reason = %v.reason,
                    related = ?v.related_task_id,
                    "日期顺序校验失败"
                );
                self.sink.report(v);
            }
        }

        info!(
            workstation_id = workstation_id,
            start = %effective_start,
            finish = ?finish,
            changeovers = changeovers.len(),
            predecessor = ?predecessor.as_ref().map(|p| p.id.as_str()),
            result = %result,
            "任务排程完成"
        );

        Ok(ScheduleOutcome {
            task_id: task.id.clone(),
            start: Some(effective_start),
            finish,
            changeovers,
            predecessor_id: predecessor.map(|p| p.id),
            result,
            violations,
        })
    }

    /// 前序定位
    fn resolve_predecessor(
        &self,
        task: &Task,
        workstation_id: &str,
        requested_start: NaiveDateTime,
        hint: &PredecessorHint,
    ) -> EngineResult<Option<Task>> {
        match hint {
            PredecessorHint::None => Ok(None),
            PredecessorHint::Explicit(prev) => Ok(Some(prev.clone())),
            PredecessorHint::Discover { also_consider, exclude } => {
                let mut excluded: Vec<&str> = vec![task.id.as_str()];
                excluded.extend(exclude.iter().map(String::as_str));

                // 查找器结果已满足 finish <= 请求开始，无条件保留
                let found = self.finder.find_predecessor(workstation_id, requested_start, &excluded)?;

                // 已关联的前序：结束时间可能已越过请求开始
                let mut extras: Vec<Task> = Vec::new();
                for link in self.deps.store.find_current_changeovers(&task.id)? {
                    if !link.is_based_on_norm() {
                        continue;
                    }
                    if let Some(prev_id) = link.previous_task_id.as_deref() {
                        if found.as_ref().map_or(false, |f| f.id == prev_id)
                            || extras.iter().any(|c| c.id == prev_id)
                        {
                            continue;
                        }
                        if let Some(prev) = self.deps.store.find_task(prev_id)? {
                            extras.push(prev);
                        }
                    }
                }
                if let Some(extra) = also_consider {
                    extras.push(extra.clone());
                }

                let qualified = extras
                    .into_iter()
                    .filter(|c| {
                        !excluded.contains(&c.id.as_str())
                            && c.is_on_workstation(workstation_id)
                            && self.finder.participates(c)
                            && c.finish.is_some()
                            && c.start.map_or(false, |s| s < requested_start)
                    })
                    .chain(found);
                Ok(latest_finishing(qualified))
            }
        }
    }

    /// 任务的产品（经由订单）
    fn product_of(&self, task: &Task) -> EngineResult<Option<String>> {
        match task.order_id.as_deref() {
            Some(order_id) => Ok(self
                .deps
                .store
                .find_order(order_id)?
                .and_then(|o| o.product_id)),
            None => Ok(None),
        }
    }

    fn build_changeovers(
        &self,
        task: &Task,
        workstation_id: &str,
        previous: &Task,
    ) -> EngineResult<Vec<ChangeoverInstance>> {
        if !self.deps.catalog.has_norms(workstation_id) {
            return Ok(Vec::new());
        }

        let current_product = self
            .product_of(task)?
            .ok_or_else(|| EngineError::missing("product", &task.id, "当前任务无产品，无法计算换型"))?;
        let current_values = self
            .deps
            .catalog
            .calculated_values(&current_product)
            .ok_or_else(|| EngineError::missing("product", &current_product, "产品不在属性目录中"))?;

        let previous_values = match self.product_of(previous)? {
            Some(pid) => match self.deps.catalog.calculated_values(&pid) {
                Some(values) => values,
                None => {
                    debug!(previous_task_id = %previous.id, product_id = %pid, "前序产品未知，无换型");
                    return Ok(Vec::new());
                }
            },
            None => {
                debug!(previous_task_id = %previous.id, "前序任务无产品，无换型");
                return Ok(Vec::new());
            }
        };

        Ok(self.builder.build(
            workstation_id,
            &task.id,
            &current_values,
            &previous_values,
            PreviousLink::Task(&previous.id),
        ))
    }

    fn compute_finish(
        &self,
        task: &Task,
        workstation_id: &str,
        requested_start: NaiveDateTime,
        effective_start: NaiveDateTime,
        request: &ScheduleRequest,
        result: &mut SetDateResult,
    ) -> EngineResult<Option<NaiveDateTime>> {
        let operation_id = match task.operation_id.as_deref() {
            Some(id) => id,
            None => {
                // 无工序定额：保持原时长，随换型平移
                let base = task.start.unwrap_or(requested_start);
                return Ok(request
                    .requested_finish
                    .map(|f| effective_start + (f - base).max(Duration::zero())));
            }
        };

        let operation = self
            .deps
            .catalog
            .operation(operation_id)
            .ok_or_else(|| EngineError::missing("operation", operation_id, "工序不在目录中"))?;
        let planned_quantity = match task.order_id.as_deref() {
            Some(order_id) => self
                .deps
                .store
                .find_order(order_id)?
                .ok_or_else(|| EngineError::missing("order", order_id, "任务引用的订单不存在"))?
                .planned_quantity,
            None => 1.0,
        };

        let duration = operation_duration(
            &operation,
            Some(workstation_id),
            planned_quantity,
            task.actual_staff,
            request.include_setup,
            request.include_follow_on_gap,
        );
        debug!(
            machine_secs = duration.machine_secs,
            gap_secs = duration.follow_on_gap_secs,
            runs = duration.runs,
            staff_factor = duration.staff_factor,
            "工序工时"
        );

        let finish = self
            .deps
            .calendar
            .add_working_duration(workstation_id, effective_start, duration.machine_secs)?
            + Duration::seconds(duration.follow_on_gap_secs);

        if request.requested_finish.map_or(false, |f| f != finish) {
            *result = result.with_finish_adjusted();
        }
        Ok(Some(finish))
    }

    /// 结束时间不早于同订单子任务（及启用时的子订单任务）
    fn clamp_to_children(&self, task: &Task, finish: Option<NaiveDateTime>) -> EngineResult<Option<NaiveDateTime>> {
        let mut finish = match finish {
            Some(f) => f,
            None => return Ok(None),
        };

        let children_max = self
            .deps
            .store
            .find_children(&task.id)?
            .into_iter()
            .filter(|c| c.order_id == task.order_id && c.state != TaskState::Rejected)
            .filter_map(|c| c.finish)
            .max();
        if let Some(max) = children_max {
            finish = finish.max(max);
        }

        if self.config.include_sub_orders {
            for order in self.deps.store.find_sub_orders(&task.id)? {
                let sub_max = self
                    .deps
                    .store
                    .find_tasks_by_order(&order.id)?
                    .into_iter()
                    .filter(|t| t.state != TaskState::Rejected)
                    .filter_map(|t| t.finish)
                    .max();
                if let Some(max) = sub_max {
                    finish = finish.max(max);
                }
            }
        }
        Ok(Some(finish))
    }

    /// 父任务 / 子任务顺序校验
    fn validate(
        &self,
        task: &Task,
        start: NaiveDateTime,
        finish: Option<NaiveDateTime>,
    ) -> EngineResult<Vec<DateViolation>> {
        let mut violations = Vec::new();

        if finish.map_or(false, |f| start > f) {
            violations.push(DateViolation::new(&task.id, DateField::FinishDate, ViolationReason::DatesOrder));
        }

        if let Some(parent_id) = task.parent_id.as_deref() {
            if let Some(parent) = self.deps.store.find_task(parent_id)? {
                if parent.workstation_id.is_some() && parent.state != TaskState::Rejected {
                    if parent.start.map_or(false, |ps| start > ps) {
                        violations.push(
                            DateViolation::new(&task.id, DateField::StartDate, ViolationReason::StartAfterParentStart)
                                .against(&parent.id),
                        );
                    }
                    if let (Some(pf), Some(f)) = (parent.finish, finish) {
                        if f > pf {
                            violations.push(
                                DateViolation::new(
                                    &task.id,
                                    DateField::FinishDate,
                                    ViolationReason::FinishAfterParentFinish,
                                )
                                .against(&parent.id),
                            );
                        }
                    }
                }
            }
        }

        for child in self.deps.store.find_children(&task.id)? {
            if child.workstation_id.is_none() || child.state == TaskState::Rejected {
                continue;
            }
            if child.start.map_or(false, |cs| cs > start) {
                violations.push(
                    DateViolation::new(&task.id, DateField::StartDate, ViolationReason::StartBeforeChildStart)
                        .against(&child.id),
                );
            }
            if let (Some(cf), Some(f)) = (child.finish, finish) {
                if cf > f {
                    violations.push(
                        DateViolation::new(&task.id, DateField::FinishDate, ViolationReason::FinishBeforeChildFinish)
                            .against(&child.id),
                    );
                }
            }
        }

        Ok(violations)
    }
}
