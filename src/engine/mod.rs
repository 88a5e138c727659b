// ==========================================
// 工位换型排程引擎 - 引擎层
// ==========================================
// 职责: 时间线排程、换型计算与变更传播，不拼 SQL
// 红线: Engine 只通过仓储 / 目录 / 日历 trait 访问外部数据
// ==========================================

pub mod calendar;
pub mod cascade;
pub mod catalog;
pub mod changeover_builder;
pub mod duration;
pub mod error;
pub mod events;
pub mod neighbor_finder;
pub mod orchestrator;
pub mod repositories;
pub mod schedule_position;
pub mod scheduler;

// 重导出核心引擎
pub use calendar::{AlwaysWorkingCalendar, BlockedPeriod, LineCalendar, Shift, ShiftCalendar, WorkingCalendar};
pub use cascade::{CascadeCoordinator, PropagationContext, TaskChange};
pub use catalog::{AttributeCatalog, Catalog, ChangeoverNormCatalog, InMemoryCatalog, ProductionCatalog};
pub use changeover_builder::{AnchoredChangeovers, ChangeoverSetBuilder, PreviousLink};
pub use duration::{operation_duration, operation_runs, staff_factor, OperationDuration};
pub use error::{EngineError, EngineResult};
pub use events::{
    CollectingValidationSink, DateViolation, NoOpValidationSink, OptionalOrderDateAdjuster,
    OptionalValidationSink, OrderBoundsAdjuster, OrderDateAdjuster, ValidationSink,
};
pub use neighbor_finder::{latest_finishing, TimelineNeighborFinder};
pub use orchestrator::{CascadeFailure, SaveReport, TimelineService};
pub use repositories::TimelineRepositories;
pub use schedule_position::{PositionPlan, SchedulePositionPlanner, ScheduleLayout};
pub use scheduler::{PredecessorHint, ScheduleOutcome, ScheduleRequest, TaskScheduler};
