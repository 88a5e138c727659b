// ==========================================
// 工位换型排程引擎 - 变更传播
// ==========================================
// 受影响集合 = 以本任务为前序的派生换型所属任务
//            ∪ 本任务在新工位上的后继
//            ∪ 本任务在原工位上的后继 (工位变更 / 取消分配)
// 红线: 本任务不进入自身的受影响集合
// 红线: 传播守卫只存在于 PropagationContext，不落库
// ==========================================

use crate::domain::Task;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::neighbor_finder::TimelineNeighborFinder;
use crate::repository::{ChangeoverRepository, TaskRepository, TimelineStore};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

// ==========================================
// PropagationContext - 单次外层变更的传播上下文
// ==========================================
#[derive(Debug)]
pub struct PropagationContext {
    guarded: HashSet<String>, // 正在重算的任务 (强制重建换型)
    visited: HashSet<String>, // 本次传播中已处理的任务
    steps: usize,
    max_steps: usize,
}

impl PropagationContext {
    pub fn new(max_steps: usize) -> Self {
        Self {
            guarded: HashSet::new(),
            visited: HashSet::new(),
            steps: 0,
            max_steps,
        }
    }

    pub fn guard(&mut self, task_id: &str) {
        self.guarded.insert(task_id.to_string());
    }

    pub fn release(&mut self, task_id: &str) {
        self.guarded.remove(task_id);
    }

    pub fn is_guarded(&self, task_id: &str) -> bool {
        self.guarded.contains(task_id)
    }

    /// 标记已处理；返回是否首次
    pub fn mark_visited(&mut self, task_id: &str) -> bool {
        self.visited.insert(task_id.to_string())
    }

    pub fn is_visited(&self, task_id: &str) -> bool {
        self.visited.contains(task_id)
    }

    /// 计一步重算，超限报错
    pub fn record_step(&mut self) -> EngineResult<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EngineError::CascadeLimitExceeded { limit: self.max_steps });
        }
        Ok(())
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

/// 任务变更前的时间线位置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChange {
    pub old_workstation_id: Option<String>,
    pub old_start: Option<NaiveDateTime>,
    pub old_finish: Option<NaiveDateTime>,
}

impl TaskChange {
    pub fn from_previous(previous: Option<&Task>) -> Self {
        match previous {
            Some(t) => Self {
                old_workstation_id: t.workstation_id.clone(),
                old_start: t.start,
                old_finish: t.finish,
            },
            None => Self::default(),
        }
    }
}

// ==========================================
// CascadeCoordinator - 传播协调器
// ==========================================
pub struct CascadeCoordinator {
    store: Arc<dyn TimelineStore>,
}

impl CascadeCoordinator {
    pub fn new(store: Arc<dyn TimelineStore>) -> Self {
        Self { store }
    }

    /// 以 task 为前序的派生换型所属任务
    pub fn linked_successors(&self, task_id: &str) -> EngineResult<Vec<Task>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut linked = Vec::new();
        for inst in self.store.find_previous_changeovers(task_id)? {
            if !inst.is_based_on_norm() || inst.current_task_id == task_id {
                continue;
            }
            if !seen.insert(inst.current_task_id.clone()) {
                continue;
            }
            if let Some(t) = self.store.find_task(&inst.current_task_id)? {
                linked.push(t);
            }
        }
        Ok(linked)
    }

    /// 任务变更后需要重算的任务（去重，不含 task 自身）
    ///
    /// # 参数
    /// - task: 已落库的新状态
    /// - change: 变更前位置
    /// - finder: 邻居查找
    pub fn collect_affected(
        &self,
        task: &Task,
        change: &TaskChange,
        finder: &TimelineNeighborFinder,
    ) -> EngineResult<Vec<Task>> {
        let mut affected = self.linked_successors(&task.id)?;

        if let (Some(ws), Some(start)) = (task.workstation_id.as_deref(), task.start) {
            if let Some(next) = finder.find_successor(ws, start, &[task.id.as_str()])? {
                affected.push(next);
            }
        }

        if let Some(old_ws) = change.old_workstation_id.as_deref() {
            let left_workstation = task.workstation_id.as_deref() != Some(old_ws);
            if left_workstation {
                if let Some(old_start) = change.old_start {
                    if let Some(next) = finder.find_successor(old_ws, old_start, &[task.id.as_str()])? {
                        affected.push(next);
                    }
                }
            }
        }

        let affected = dedupe_excluding(affected, &task.id);
        debug!(
            task_id = %task.id,
            affected = ?affected.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            "收集受影响任务"
        );
        Ok(affected)
    }

    /// 删除任务前的清理
    ///
    /// - 删除当前换型集合
    /// - 前序换型集合中只删除 OWN 实例，派生实例留待重算
    ///
    /// # 返回
    /// 需要重算的任务
    pub fn on_task_deleted(&self, task: &Task, finder: &TimelineNeighborFinder) -> EngineResult<Vec<Task>> {
        let mut affected = self.linked_successors(&task.id)?;
        if let (Some(ws), Some(start)) = (task.workstation_id.as_deref(), task.start) {
            if let Some(next) = finder.find_successor(ws, start, &[task.id.as_str()])? {
                affected.push(next);
            }
        }

        let mut removed = 0usize;
        for inst in self.store.find_current_changeovers(&task.id)? {
            if self.store.delete_changeover(&inst.id)? {
                removed += 1;
            }
        }
        for inst in self.store.find_previous_changeovers(&task.id)? {
            if inst.is_own() && self.store.delete_changeover(&inst.id)? {
                removed += 1;
            }
        }

        let affected = dedupe_excluding(affected, &task.id);
        info!(
            task_id = %task.id,
            removed_changeovers = removed,
            affected = affected.len(),
            "任务删除，清理换型"
        );
        Ok(affected)
    }
}

fn dedupe_excluding(tasks: Vec<Task>, excluded_id: &str) -> Vec<Task> {
    let mut seen: HashSet<String> = HashSet::new();
    tasks
        .into_iter()
        .filter(|t| t.id != excluded_id && seen.insert(t.id.clone()))
        .collect()
}
