// ==========================================
// 工位换型排程引擎 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 任务状态 (Operational Task State)
// ==========================================
// 状态机: PENDING -> IN_PROGRESS -> FINISHED
//         PENDING | IN_PROGRESS -> REJECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,    // 待开始
    InProgress, // 进行中
    Finished,   // 已完成
    Rejected,   // 已拒绝
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Finished => "FINISHED",
            TaskState::Rejected => "REJECTED",
        }
    }

    /// 从字符串解析状态（未知值返回 None）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(TaskState::Pending),
            "IN_PROGRESS" => Some(TaskState::InProgress),
            "FINISHED" => Some(TaskState::Finished),
            "REJECTED" => Some(TaskState::Rejected),
            _ => None,
        }
    }

    /// 状态转换是否合法
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::InProgress)
                | (TaskState::InProgress, TaskState::Finished)
                | (TaskState::Pending, TaskState::Rejected)
                | (TaskState::InProgress, TaskState::Rejected)
        )
    }

    /// 终态（不再参与排程变更）
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Rejected)
    }
}

// ==========================================
// 属性数据类型 (Attribute Data Type)
// ==========================================
// 只有 CALCULATED 参与换型匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeDataType {
    Calculated, // 计算型
    Other,      // 其它(仅展示)
}

impl fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeDataType::Calculated => write!(f, "CALCULATED"),
            AttributeDataType::Other => write!(f, "OTHER"),
        }
    }
}

// ==========================================
// 换型定额类型 (Changeover Norm Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormChangeoverType {
    Generic,       // 属性存在即换型
    BetweenValues, // 指定取值之间换型
}

impl fmt::Display for NormChangeoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormChangeoverType::Generic => write!(f, "GENERIC"),
            NormChangeoverType::BetweenValues => write!(f, "BETWEEN_VALUES"),
        }
    }
}

// ==========================================
// 换型实例类型 (Changeover Instance Type)
// ==========================================
// OWN: 人工维护，重算不删除
// BASED_ON_NORM: 由定额推导，重算整体替换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeoverType {
    Own,
    BasedOnNorm,
}

impl fmt::Display for ChangeoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ChangeoverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeoverType::Own => "OWN",
            ChangeoverType::BasedOnNorm => "BASED_ON_NORM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OWN" => Some(ChangeoverType::Own),
            "BASED_ON_NORM" => Some(ChangeoverType::BasedOnNorm),
            _ => None,
        }
    }
}

// ==========================================
// 排程结果码 (Set Date Result)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetDateResult {
    None,              // 未调整
    Error,             // 校验失败，日期不可落库
    StartDateNearest,  // 开始时间吸附到最近工作时刻
    FinishDateNearest, // 结束时间按工时重算
    Both,              // 开始/结束均调整
}

impl fmt::Display for SetDateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetDateResult::None => write!(f, "NONE"),
            SetDateResult::Error => write!(f, "ERROR"),
            SetDateResult::StartDateNearest => write!(f, "START_DATE_NEAREST"),
            SetDateResult::FinishDateNearest => write!(f, "FINISH_DATE_NEAREST"),
            SetDateResult::Both => write!(f, "BOTH"),
        }
    }
}

impl SetDateResult {
    /// 叠加结束时间调整标记
    pub fn with_finish_adjusted(self) -> Self {
        match self {
            SetDateResult::StartDateNearest | SetDateResult::Both => SetDateResult::Both,
            SetDateResult::Error => SetDateResult::Error,
            _ => SetDateResult::FinishDateNearest,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SetDateResult::Error)
    }
}

// ==========================================
// 校验字段 / 原因码
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateField {
    StartDate,
    FinishDate,
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateField::StartDate => write!(f, "startDate"),
            DateField::FinishDate => write!(f, "finishDate"),
        }
    }
}

/// 层级顺序违规原因（机器可读）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationReason {
    /// 父工序开始早于本任务开始
    StartAfterParentStart,
    /// 子工序开始晚于本任务开始
    StartBeforeChildStart,
    /// 父工序结束早于本任务结束
    FinishAfterParentFinish,
    /// 子工序结束晚于本任务结束
    FinishBeforeChildFinish,
    /// 开始晚于结束
    DatesOrder,
}

impl ViolationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ViolationReason::StartAfterParentStart => "inappropriateStartDateNext",
            ViolationReason::StartBeforeChildStart => "inappropriateStartDatePrevious",
            ViolationReason::FinishAfterParentFinish => "inappropriateFinishDateNext",
            ViolationReason::FinishBeforeChildFinish => "inappropriateFinishDatePrevious",
            ViolationReason::DatesOrder => "datesOrder",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
