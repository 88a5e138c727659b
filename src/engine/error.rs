// ==========================================
// 工位换型排程引擎 - 引擎层错误类型
// ==========================================
// 说明: 层级顺序违规不是错误，走 ValidationSink + SetDateResult::Error
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 必需的引用缺失（单个任务失败，不中断同批其它任务）
    #[error("引用缺失: {entity} id={id} ({context})")]
    MissingReference {
        entity: String,
        id: String,
        context: String,
    },

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("工作日历错误: {0}")]
    Calendar(String),

    #[error("传播步数超过上限: {limit}")]
    CascadeLimitExceeded { limit: usize },
}

impl EngineError {
    pub fn missing(entity: &str, id: &str, context: &str) -> Self {
        EngineError::MissingReference {
            entity: entity.to_string(),
            id: id.to_string(),
            context: context.to_string(),
        }
    }

    /// 是否只影响单个任务
    pub fn is_task_local(&self) -> bool {
        matches!(self, EngineError::MissingReference { .. })
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
