// ==========================================
// 工位换型排程引擎 - 引擎层依赖聚合
// ==========================================
// 职责: 聚合排程引擎所需的仓储、目录与日历
// 目标: 减少各组件构造函数参数数量
// ==========================================

use std::sync::Arc;

use crate::engine::calendar::WorkingCalendar;
use crate::engine::catalog::Catalog;
use crate::repository::TimelineStore;

/// 排程引擎依赖集合
///
/// # 包含
/// - `store`: 任务 / 换型实例 / 订单仓储
/// - `catalog`: 属性、换型定额、工位、工序目录
/// - `calendar`: 工作日历
#[derive(Clone)]
pub struct TimelineRepositories {
    pub store: Arc<dyn TimelineStore>,
    pub catalog: Arc<dyn Catalog>,
    pub calendar: Arc<dyn WorkingCalendar>,
}

impl TimelineRepositories {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        catalog: Arc<dyn Catalog>,
        calendar: Arc<dyn WorkingCalendar>,
    ) -> Self {
        Self {
            store,
            catalog,
            calendar,
        }
    }

    pub fn store(&self) -> &Arc<dyn TimelineStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn calendar(&self) -> &Arc<dyn WorkingCalendar> {
        &self.calendar
    }
}
