// ==========================================
// 测试辅助 - 时间线场景夹具
// ==========================================
// 工位 R: 定额 Red -> Blue 600 秒 (串行)
// 产品 P1 = Red, P2 = Blue, P3 = Green
// 订单 O1 -> P1, O2 -> P2, O3 -> P3
// ==========================================

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use workstation_changeover::engine::{
    AlwaysWorkingCalendar, CollectingValidationSink, InMemoryCatalog, WorkingCalendar,
};
use workstation_changeover::repository::{
    InMemoryTimelineRepository, OrderRepository, TaskRepository, TimelineStore,
};
use workstation_changeover::{
    AttributeValue, ChangeoverNorm, Order, Product, SchedulerConfig, Task, TechnologyOperation,
    TimelineRepositories, TimelineService, Workstation,
};

/// 2026-03-02 (周一) 的时刻
pub fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// 指定日期的时刻
pub fn on(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// 标准目录
pub fn standard_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog
        .add_workstation(Workstation::new("R"))
        .add_workstation(Workstation::new("R2"))
        .add_product(Product::new("P1").with_value(AttributeValue::calculated("Color", "Red")))
        .add_product(Product::new("P2").with_value(AttributeValue::calculated("Color", "Blue")))
        .add_product(Product::new("P3").with_value(AttributeValue::calculated("Color", "Green")))
        .add_operation(TechnologyOperation::new("OP-CUT", 0, 1800))
        .add_norm(ChangeoverNorm::between_values("N-RB", "R", "Color", "Red", "Blue", 600));
    catalog
}

/// 标准订单
pub fn seed_orders(store: &dyn OrderRepository) {
    store.save_order(&Order::new("O1", "P1", 1.0)).unwrap();
    store.save_order(&Order::new("O2", "P2", 1.0)).unwrap();
    store.save_order(&Order::new("O3", "P3", 1.0)).unwrap();
}

/// 时间线夹具：内存仓 + 目录 + 校验接收者
pub struct TimelineFixture {
    pub repo: Arc<InMemoryTimelineRepository>,
    pub sink: Arc<CollectingValidationSink>,
    pub service: TimelineService,
}

impl TimelineFixture {
    pub fn new() -> Self {
        Self::with(standard_catalog(), Arc::new(AlwaysWorkingCalendar), SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with(standard_catalog(), Arc::new(AlwaysWorkingCalendar), config)
    }

    pub fn with(catalog: InMemoryCatalog, calendar: Arc<dyn WorkingCalendar>, config: SchedulerConfig) -> Self {
        let repo = Arc::new(InMemoryTimelineRepository::new());
        seed_orders(&*repo);
        let sink = Arc::new(CollectingValidationSink::new());
        let deps = TimelineRepositories::new(repo.clone(), Arc::new(catalog), calendar);
        let service = TimelineService::new(deps, config).with_validation_sink(sink.clone());
        Self { repo, sink, service }
    }

    pub fn store(&self) -> &dyn TimelineStore {
        &*self.repo
    }

    pub fn task(&self, id: &str) -> Task {
        self.repo.find_task(id).unwrap().unwrap()
    }
}

/// 场景 A: R 上 08:00-09:00，产品 Red
pub fn task_a() -> Task {
    Task::new("A")
        .with_workstation("R")
        .with_order("O1")
        .with_dates(at(8, 0), at(9, 0))
}

/// 场景 B: R 上请求 09:00-10:00，产品 Blue
pub fn task_b() -> Task {
    Task::new("B")
        .with_workstation("R")
        .with_order("O2")
        .with_dates(at(9, 0), at(10, 0))
}
