// ==========================================
// 工位换型排程引擎 - 内存时间线仓储
// ==========================================
// 结构: 实体仓 + ID 索引 (BTreeMap 保证遍历顺序确定)
// 用途: 单元测试、场景回放、无数据库嵌入
// ==========================================

use crate::domain::{ChangeoverInstance, Order, Task, TaskState, TimeRange};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::timeline_repo::{ChangeoverRepository, OrderRepository, TaskRepository};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Arena {
    tasks: BTreeMap<String, Task>,
    changeovers: BTreeMap<String, ChangeoverInstance>,
    orders: BTreeMap<String, Order>,
}

/// 内存仓储
#[derive(Debug, Default)]
pub struct InMemoryTimelineRepository {
    arena: RwLock<Arena>,
}

impl InMemoryTimelineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, Arena>> {
        self.arena
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, Arena>> {
        self.arena
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 全部任务（按ID排序）
    pub fn all_tasks(&self) -> RepositoryResult<Vec<Task>> {
        Ok(self.read()?.tasks.values().cloned().collect())
    }

    /// 全部换型实例（按ID排序）
    pub fn all_changeovers(&self) -> RepositoryResult<Vec<ChangeoverInstance>> {
        Ok(self.read()?.changeovers.values().cloned().collect())
    }
}

impl TaskRepository for InMemoryTimelineRepository {
    fn find_task(&self, id: &str) -> RepositoryResult<Option<Task>> {
        Ok(self.read()?.tasks.get(id).cloned())
    }

    fn find_tasks_on_workstation(
        &self,
        workstation_id: &str,
        range: TimeRange,
        excluded_states: &[TaskState],
    ) -> RepositoryResult<Vec<Task>> {
        let arena = self.read()?;
        Ok(arena
            .tasks
            .values()
            .filter(|t| t.is_on_workstation(workstation_id))
            .filter(|t| !excluded_states.contains(&t.state))
            .filter(|t| range.intersects(t))
            .cloned()
            .collect())
    }

    fn find_children(&self, parent_id: &str) -> RepositoryResult<Vec<Task>> {
        let arena = self.read()?;
        Ok(arena
            .tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    fn find_tasks_by_order(&self, order_id: &str) -> RepositoryResult<Vec<Task>> {
        let arena = self.read()?;
        Ok(arena
            .tasks
            .values()
            .filter(|t| t.order_id.as_deref() == Some(order_id))
            .cloned()
            .collect())
    }

    fn save_task(&self, task: &Task) -> RepositoryResult<()> {
        self.write()?.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn delete_task(&self, id: &str) -> RepositoryResult<bool> {
        Ok(self.write()?.tasks.remove(id).is_some())
    }
}

impl ChangeoverRepository for InMemoryTimelineRepository {
    fn find_current_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>> {
        let arena = self.read()?;
        Ok(arena
            .changeovers
            .values()
            .filter(|c| c.current_task_id == task_id)
            .cloned()
            .collect())
    }

    fn find_previous_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>> {
        let arena = self.read()?;
        Ok(arena
            .changeovers
            .values()
            .filter(|c| c.previous_task_id.as_deref() == Some(task_id))
            .cloned()
            .collect())
    }

    fn save_changeover(&self, instance: &ChangeoverInstance) -> RepositoryResult<()> {
        self.write()?
            .changeovers
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn delete_changeover(&self, id: &str) -> RepositoryResult<bool> {
        Ok(self.write()?.changeovers.remove(id).is_some())
    }
}

impl OrderRepository for InMemoryTimelineRepository {
    fn find_order(&self, id: &str) -> RepositoryResult<Option<Order>> {
        Ok(self.read()?.orders.get(id).cloned())
    }

    fn find_sub_orders(&self, parent_task_id: &str) -> RepositoryResult<Vec<Order>> {
        let arena = self.read()?;
        Ok(arena
            .orders
            .values()
            .filter(|o| o.parent_task_id.as_deref() == Some(parent_task_id))
            .cloned()
            .collect())
    }

    fn save_order(&self, order: &Order) -> RepositoryResult<()> {
        self.write()?.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }
}
