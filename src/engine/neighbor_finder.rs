// ==========================================
// 工位换型排程引擎 - 时间线邻居查找
// ==========================================
// 前序: finish ≤ 参考时刻中 finish 最大者
// 后继: start ≥ 参考时刻中 start 最小者
// 排除: REJECTED 恒排除；skip_finished_tasks 时排除 FINISHED
// 平局: 前序取 finish 晚 > start 晚 > ID 小；后继取 start 早 > finish 早 > ID 小
// ==========================================

use crate::config::SchedulerConfig;
use crate::domain::{Task, TaskState, TimeRange};
use crate::engine::error::EngineResult;
use crate::repository::{TaskRepository, TimelineStore};
use chrono::NaiveDateTime;
use std::cmp::{Ordering, Reverse};
use std::sync::Arc;
use tracing::debug;

pub struct TimelineNeighborFinder {
    store: Arc<dyn TimelineStore>,
    excluded_states: Vec<TaskState>,
}

impl TimelineNeighborFinder {
    pub fn new(store: Arc<dyn TimelineStore>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            excluded_states: config.excluded_neighbor_states(),
        }
    }

    /// 状态是否参与邻居查找
    pub fn participates(&self, task: &Task) -> bool {
        !self.excluded_states.contains(&task.state)
    }

    /// 查找前序任务
    ///
    /// # 参数
    /// - workstation_id: 工位
    /// - reference: 参考时刻
    /// - exclude: 排除的任务ID（含自身）
    pub fn find_predecessor(
        &self,
        workstation_id: &str,
        reference: NaiveDateTime,
        exclude: &[&str],
    ) -> EngineResult<Option<Task>> {
        let range = TimeRange {
            from: None,
            to: Some(reference),
        };
        let candidates = self
            .store
            .find_tasks_on_workstation(workstation_id, range, &self.excluded_states)?;

        let found = latest_finishing(
            candidates
                .into_iter()
                .filter(|t| !exclude.contains(&t.id.as_str()))
                .filter(|t| t.finish.map_or(false, |f| f <= reference)),
        );
        debug!(
            workstation_id = workstation_id,
            reference = %reference,
            predecessor = ?found.as_ref().map(|t| t.id.as_str()),
            "查找前序任务"
        );
        Ok(found)
    }

    /// 查找后继任务
    pub fn find_successor(
        &self,
        workstation_id: &str,
        reference: NaiveDateTime,
        exclude: &[&str],
    ) -> EngineResult<Option<Task>> {
        let range = TimeRange {
            from: Some(reference),
            to: None,
        };
        let candidates = self
            .store
            .find_tasks_on_workstation(workstation_id, range, &self.excluded_states)?;

        let found = candidates
            .into_iter()
            .filter(|t| !exclude.contains(&t.id.as_str()))
            .filter(|t| t.start.map_or(false, |s| s >= reference))
            .min_by(successor_order);
        debug!(
            workstation_id = workstation_id,
            reference = %reference,
            successor = ?found.as_ref().map(|t| t.id.as_str()),
            "查找后继任务"
        );
        Ok(found)
    }

    /// 工位上参与排程的全部任务
    pub fn tasks_on_workstation(&self, workstation_id: &str, range: TimeRange) -> EngineResult<Vec<Task>> {
        Ok(self
            .store
            .find_tasks_on_workstation(workstation_id, range, &self.excluded_states)?)
    }
}

/// 按前序规则挑选 finish 最晚的任务
pub fn latest_finishing<I>(candidates: I) -> Option<Task>
where
    I: IntoIterator<Item = Task>,
{
    candidates.into_iter().max_by(predecessor_order)
}

fn predecessor_order(a: &Task, b: &Task) -> Ordering {
    (a.finish, a.start, Reverse(&a.id)).cmp(&(b.finish, b.start, Reverse(&b.id)))
}

fn successor_order(a: &Task, b: &Task) -> Ordering {
    (a.start, a.finish, &a.id).cmp(&(b.start, b.finish, &b.id))
}
