// ==========================================
// 工位换型排程引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 工位时间线排程 (任务日期 / 换型实例 / 变更传播)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排程规则
pub mod engine;

// 配置层 - 排程参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ChangeoverType, DateField, NormChangeoverType, SetDateResult, TaskState, ViolationReason};

// 领域实体
pub use domain::{
    AttributeValue, ChangeoverInstance, ChangeoverNorm, Order, Product, Schedule, SchedulePosition, Task,
    TechnologyOperation, TimeRange, Workstation, WorkstationTimeNorm,
};

// 引擎
pub use engine::{
    CascadeCoordinator, ChangeoverSetBuilder, EngineError, SchedulePositionPlanner, TaskScheduler,
    TimelineNeighborFinder, TimelineRepositories, TimelineService,
};

// 配置
pub use config::{ConfigManager, SchedulerConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "工位换型排程引擎";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
