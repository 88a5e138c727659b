// ==========================================
// 工位换型排程引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽存储细节
// 实现: 内存仓 (测试/嵌入) 与 SQLite 仓
// ==========================================

pub mod error;
pub mod memory_repo;
pub mod sqlite_repo;
pub mod timeline_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use memory_repo::InMemoryTimelineRepository;
pub use sqlite_repo::SqliteTimelineRepository;
pub use timeline_repo::{ChangeoverRepository, OrderRepository, TaskRepository, TimelineStore};
