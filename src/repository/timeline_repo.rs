// ==========================================
// 工位换型排程引擎 - 时间线仓储接口
// ==========================================
// 红线: Repository 不含业务逻辑
// 约定: 所有实体以不透明字符串ID寻址，领域结构体不持有引用
// ==========================================

use crate::domain::{ChangeoverInstance, Order, Task, TaskState, TimeRange};
use crate::repository::error::RepositoryResult;

// ==========================================
// TaskRepository - 作业任务仓储
// ==========================================
pub trait TaskRepository: Send + Sync {
    fn find_task(&self, id: &str) -> RepositoryResult<Option<Task>>;

    /// 查询工位上的任务
    ///
    /// # 参数
    /// - workstation_id: 工位
    /// - range: 时段过滤（与任务时段相交）
    /// - excluded_states: 排除的状态
    fn find_tasks_on_workstation(
        &self,
        workstation_id: &str,
        range: TimeRange,
        excluded_states: &[TaskState],
    ) -> RepositoryResult<Vec<Task>>;

    /// 层级子任务（parent_id = 指定任务）
    fn find_children(&self, parent_id: &str) -> RepositoryResult<Vec<Task>>;

    fn find_tasks_by_order(&self, order_id: &str) -> RepositoryResult<Vec<Task>>;

    fn save_task(&self, task: &Task) -> RepositoryResult<()>;

    /// 删除任务，返回是否存在
    fn delete_task(&self, id: &str) -> RepositoryResult<bool>;
}

// ==========================================
// ChangeoverRepository - 换型实例仓储
// ==========================================
pub trait ChangeoverRepository: Send + Sync {
    /// 当前换型集合（current_task_id = 任务）
    fn find_current_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>>;

    /// 前序换型集合（previous_task_id = 任务）
    fn find_previous_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>>;

    fn save_changeover(&self, instance: &ChangeoverInstance) -> RepositoryResult<()>;

    fn delete_changeover(&self, id: &str) -> RepositoryResult<bool>;

    /// 整体替换任务的派生换型（OWN 实例保留）
    fn replace_current_changeovers(
        &self,
        task_id: &str,
        instances: &[ChangeoverInstance],
    ) -> RepositoryResult<()> {
        for existing in self.find_current_changeovers(task_id)? {
            if existing.is_based_on_norm() {
                self.delete_changeover(&existing.id)?;
            }
        }
        for instance in instances {
            self.save_changeover(instance)?;
        }
        Ok(())
    }
}

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub trait OrderRepository: Send + Sync {
    fn find_order(&self, id: &str) -> RepositoryResult<Option<Order>>;

    /// 引用指定任务的子订单
    fn find_sub_orders(&self, parent_task_id: &str) -> RepositoryResult<Vec<Order>>;

    fn save_order(&self, order: &Order) -> RepositoryResult<()>;
}

/// 引擎使用的仓储聚合
pub trait TimelineStore: TaskRepository + ChangeoverRepository + OrderRepository {}

impl<T> TimelineStore for T where T: TaskRepository + ChangeoverRepository + OrderRepository {}
