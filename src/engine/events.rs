// ==========================================
// 工位换型排程引擎 - 下游协作者
// ==========================================
// 职责: 定义订单日期回写 / 校验结果上报 trait，实现依赖倒置
// 说明: Engine 层定义 trait，外层实现适配器
// ==========================================

use crate::domain::{DateField, TaskState, ViolationReason};
use crate::engine::error::EngineResult;
use crate::repository::{OrderRepository, TaskRepository, TimelineStore};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ==========================================
// 日期校验违规
// ==========================================

/// 单条日期违规（机器可读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateViolation {
    pub task_id: String,
    pub field: DateField,
    pub reason: ViolationReason,
    /// 冲突的父/子任务
    pub related_task_id: Option<String>,
}

impl DateViolation {
    pub fn new(task_id: &str, field: DateField, reason: ViolationReason) -> Self {
        Self {
            task_id: task_id.to_string(),
            field,
            reason,
            related_task_id: None,
        }
    }

    pub fn against(mut self, related_task_id: &str) -> Self {
        self.related_task_id = Some(related_task_id.to_string());
        self
    }
}

/// 校验结果接收者 Trait
pub trait ValidationSink: Send + Sync {
    /// 上报违规
    fn report(&self, violation: &DateViolation);
}

/// 空操作接收者
#[derive(Debug, Clone, Default)]
pub struct NoOpValidationSink;

impl ValidationSink for NoOpValidationSink {
    fn report(&self, violation: &DateViolation) {
        tracing::debug!(
            "NoOpValidationSink: 跳过违规上报 - task_id={}, field={}, reason={}",
            violation.task_id,
            violation.field,
            violation.reason
        );
    }
}

/// 收集型接收者（测试 / 场景回放）
#[derive(Debug, Default)]
pub struct CollectingValidationSink {
    reported: Mutex<Vec<DateViolation>>,
}

impl CollectingValidationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出并清空已上报的违规
    pub fn take(&self) -> Vec<DateViolation> {
        match self.reported.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ValidationSink for CollectingValidationSink {
    fn report(&self, violation: &DateViolation) {
        match self.reported.lock() {
            Ok(mut guard) => guard.push(violation.clone()),
            Err(poisoned) => poisoned.into_inner().push(violation.clone()),
        }
    }
}

/// 可选的接收者包装
///
/// 简化 Option<Arc<dyn ValidationSink>> 的使用
#[derive(Clone, Default)]
pub struct OptionalValidationSink {
    inner: Option<Arc<dyn ValidationSink>>,
}

impl OptionalValidationSink {
    pub fn with_sink(sink: Arc<dyn ValidationSink>) -> Self {
        Self { inner: Some(sink) }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn report(&self, violation: &DateViolation) {
        match &self.inner {
            Some(sink) => sink.report(violation),
            None => NoOpValidationSink.report(violation),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

// ==========================================
// 订单日期回写
// ==========================================

/// 订单日期调整者 Trait
pub trait OrderDateAdjuster: Send + Sync {
    /// 将订单起止收敛到其任务日期并集
    ///
    /// # 返回
    /// - `Ok(true)`: 订单日期有变化
    fn reconcile(&self, order_id: &str) -> EngineResult<bool>;
}

/// 默认实现：[min(task.start), max(task.finish)]
pub struct OrderBoundsAdjuster {
    store: Arc<dyn TimelineStore>,
}

impl OrderBoundsAdjuster {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self { store }
    }
}

impl OrderDateAdjuster for OrderBoundsAdjuster {
    fn reconcile(&self, order_id: &str) -> EngineResult<bool> {
        let mut order = match self.store.find_order(order_id)? {
            Some(o) => o,
            None => {
                tracing::warn!(order_id = order_id, "订单不存在，跳过日期回写");
                return Ok(false);
            }
        };

        // 已拒绝的任务不参与订单日期
        let tasks: Vec<_> = self
            .store
            .find_tasks_by_order(order_id)?
            .into_iter()
            .filter(|t| t.state != TaskState::Rejected)
            .collect();
        let start = tasks.iter().filter_map(|t| t.start).min();
        let finish = tasks.iter().filter_map(|t| t.finish).max();
        if order.start == start && order.finish == finish {
            return Ok(false);
        }

        tracing::info!(
            order_id = order_id,
            start = ?start,
            finish = ?finish,
            "订单日期按任务日期回写"
        );
        order.start = start;
        order.finish = finish;
        self.store.save_order(&order)?;
        Ok(true)
    }
}

/// 可选的订单调整者包装
#[derive(Clone, Default)]
pub struct OptionalOrderDateAdjuster {
    inner: Option<Arc<dyn OrderDateAdjuster>>,
}

impl OptionalOrderDateAdjuster {
    pub fn with_adjuster(adjuster: Arc<dyn OrderDateAdjuster>) -> Self {
        Self { inner: Some(adjuster) }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn reconcile(&self, order_id: &str) -> EngineResult<bool> {
        match &self.inner {
            Some(adjuster) => adjuster.reconcile(order_id),
            None => {
                tracing::debug!(
                    "OptionalOrderDateAdjuster: 未配置调整者，跳过订单 - order_id={}",
                    order_id
                );
                Ok(false)
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}
