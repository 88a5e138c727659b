// ==========================================
// 工位换型排程引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod changeover;
pub mod production;
pub mod schedule;
pub mod task;
pub mod types;
pub mod workstation;

// 重导出核心类型
pub use changeover::{ChangeoverInstance, ChangeoverNorm};
pub use production::{Order, TechnologyOperation, WorkstationTimeNorm};
pub use schedule::{Schedule, SchedulePosition};
pub use task::{Task, TimeRange};
pub use types::{
    AttributeDataType, ChangeoverType, DateField, NormChangeoverType, SetDateResult, TaskState,
    ViolationReason,
};
pub use workstation::{AttributeValue, Product, Workstation};
