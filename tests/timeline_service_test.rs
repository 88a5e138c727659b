// ==========================================
// 时间线服务集成测试
// ==========================================
// 职责: 验证 保存 -> 排程 -> 落库 -> 传播 的完整链路
// 场景: 换型推迟开始、前序结束后移、前序删除、取消分配、层级校验
// ==========================================

mod helpers;

use helpers::{at, task_a, task_b, TimelineFixture};
use workstation_changeover::engine::EngineError;
use workstation_changeover::repository::{ChangeoverRepository, OrderRepository, TaskRepository};
use workstation_changeover::{
    ChangeoverInstance, Order, SchedulerConfig, SetDateResult, Task, TaskState, ViolationReason,
};

/// 保存 A、B 后的标准时间线
fn fixture_with_a_and_b() -> TimelineFixture {
    let fx = TimelineFixture::new();
    fx.service.save_task(task_a()).unwrap();
    fx.service.save_task(task_b()).unwrap();
    fx
}

// ==========================================
// 换型推迟开始
// ==========================================

#[test]
fn test_changeover_pushes_successor_start() {
    let fx = TimelineFixture::new();
    let report_a = fx.service.save_task(task_a()).unwrap();
    assert!(report_a.is_committed());
    assert_eq!(fx.task("A").start, Some(at(8, 0)));

    let report = fx.service.save_task(task_b()).unwrap();
    assert!(report.is_committed());
    assert!(report.cascaded.is_empty());

    let outcome = report.outcome.unwrap();
    assert_eq!(outcome.predecessor_id.as_deref(), Some("A"));
    assert_eq!(outcome.result, SetDateResult::None);

    let b = fx.task("B");
    assert_eq!(b.requested_start, Some(at(9, 0)));
    assert_eq!(b.start, Some(at(9, 10)));
    assert_eq!(b.finish, Some(at(10, 10)));

    let changeovers = fx.store().find_current_changeovers("B").unwrap();
    assert_eq!(changeovers.len(), 1);
    assert_eq!(changeovers[0].start, Some(at(9, 0)));
    assert_eq!(changeovers[0].finish, Some(at(9, 10)));
    assert_eq!(changeovers[0].previous_task_id.as_deref(), Some("A"));
    assert!(changeovers[0].is_based_on_norm());
}

#[test]
fn test_no_norm_between_products_keeps_requested_start() {
    let fx = TimelineFixture::new();
    fx.service.save_task(task_a()).unwrap();
    let green = Task::new("G")
        .with_workstation("R")
        .with_order("O3")
        .with_dates(at(9, 0), at(10, 0));
    fx.service.save_task(green).unwrap();

    let g = fx.task("G");
    assert_eq!(g.start, Some(at(9, 0)));
    assert_eq!(g.finish, Some(at(10, 0)));
    assert!(fx.store().find_current_changeovers("G").unwrap().is_empty());
}

#[test]
fn test_zero_length_predecessor_still_triggers_changeover() {
    let fx = TimelineFixture::new();
    let z = Task::new("Z")
        .with_workstation("R")
        .with_order("O1")
        .with_dates(at(9, 0), at(9, 0));
    fx.service.save_task(z).unwrap();

    let report = fx.service.save_task(task_b()).unwrap();
    let outcome = report.outcome.unwrap();
    assert_eq!(outcome.predecessor_id.as_deref(), Some("Z"));

    let b = fx.task("B");
    assert_eq!(b.start, Some(at(9, 10)));
    assert_eq!(b.finish, Some(at(10, 10)));
    let changeovers = fx.store().find_current_changeovers("B").unwrap();
    assert_eq!(changeovers.len(), 1);
    assert_eq!(changeovers[0].previous_task_id.as_deref(), Some("Z"));
}

// ==========================================
// 前序结束后移 -> 传播
// ==========================================

#[test]
fn test_predecessor_finish_moves_cascades_exactly_once() {
    let fx = fixture_with_a_and_b();

    let mut a = fx.task("A");
    a.finish = Some(at(9, 30));
    let report = fx.service.save_task(a).unwrap();

    assert!(report.is_committed());
    assert_eq!(report.cascaded_task_ids(), vec!["B"]);
    assert_eq!(report.cascade_steps, 1);
    assert!(report.failures.is_empty());

    let b = fx.task("B");
    assert_eq!(b.start, Some(at(9, 40)));
    assert_eq!(b.finish, Some(at(10, 40)));

    let changeovers = fx.store().find_current_changeovers("B").unwrap();
    assert_eq!(changeovers.len(), 1);
    assert_eq!(changeovers[0].start, Some(at(9, 30)));
    assert_eq!(changeovers[0].finish, Some(at(9, 40)));

    // A 不被回头重算
    assert_eq!(fx.task("A").finish, Some(at(9, 30)));
}

#[test]
fn test_reschedule_is_idempotent() {
    let fx = fixture_with_a_and_b();
    let mut a = fx.task("A");
    a.finish = Some(at(9, 30));
    fx.service.save_task(a).unwrap();

    let before = (fx.task("B"), fx.store().find_current_changeovers("B").unwrap());
    let first = fx.service.reschedule_task("B").unwrap().outcome.unwrap();
    let second = fx.service.reschedule_task("B").unwrap().outcome.unwrap();
    let after = (fx.task("B"), fx.store().find_current_changeovers("B").unwrap());

    assert_eq!(first.start, second.start);
    assert_eq!(first.finish, second.finish);
    assert_eq!(first.changeovers, second.changeovers);
    assert_eq!(before, after);
}

#[test]
fn test_unchanged_save_skips_scheduling() {
    let fx = fixture_with_a_and_b();
    let mut b = fx.task("B");
    b.number = "B-renamed".to_string();

    let report = fx.service.save_task(b).unwrap();
    assert!(report.outcome.is_none());
    assert!(report.cascaded.is_empty());
    assert_eq!(fx.task("B").number, "B-renamed");
    assert_eq!(fx.task("B").start, Some(at(9, 10)));
}

// ==========================================
// 删除前序
// ==========================================

#[test]
fn test_deleting_predecessor_collapses_successor() {
    let fx = fixture_with_a_and_b();
    let mut a = fx.task("A");
    a.finish = Some(at(9, 30));
    fx.service.save_task(a).unwrap();

    // 其它任务上指向 A 的人工换型
    let c = Task::new("C")
        .with_workstation("R2")
        .with_order("O3")
        .with_dates(at(9, 0), at(10, 0));
    fx.service.save_task(c).unwrap();
    let own = ChangeoverInstance::own("manual", "R2", "C", Some("A".to_string()), at(9, 0), 300);
    fx.store().save_changeover(&own).unwrap();

    let report = fx.service.delete_task("A").unwrap();
    assert_eq!(report.cascaded_task_ids(), vec!["B"]);
    assert!(fx.store().find_task("A").unwrap().is_none());

    let b = fx.task("B");
    assert_eq!(b.start, Some(at(9, 0)));
    assert_eq!(b.finish, Some(at(10, 0)));
    assert!(fx.store().find_current_changeovers("B").unwrap().is_empty());

    assert!(fx.store().find_previous_changeovers("A").unwrap().is_empty());
    assert!(fx.store().find_current_changeovers("C").unwrap().is_empty());
}

#[test]
fn test_delete_unknown_task_is_missing_reference() {
    let fx = TimelineFixture::new();
    let err = fx.service.delete_task("NOPE").unwrap_err();
    assert!(matches!(err, EngineError::MissingReference { .. }));
}

// ==========================================
// 取消分配 / 拒绝
// ==========================================

#[test]
fn test_unassigned_task_has_no_finish_and_no_changeovers() {
    let fx = fixture_with_a_and_b();
    let d = Task::new("D")
        .with_workstation("R")
        .with_order("O2")
        .with_dates(at(10, 10), at(11, 0));
    fx.service.save_task(d).unwrap();
    assert_eq!(fx.task("D").start, Some(at(10, 10)));

    let mut b = fx.task("B");
    b.workstation_id = None;
    let report = fx.service.save_task(b).unwrap();

    let b = fx.task("B");
    assert!(b.finish.is_none());
    assert!(fx.store().find_current_changeovers("B").unwrap().is_empty());

    // 原工位后继 D 改以 A 为前序: Red -> Blue
    assert_eq!(report.cascaded_task_ids(), vec!["D"]);
    let d = fx.task("D");
    assert_eq!(d.start, Some(at(10, 20)));
    assert_eq!(d.finish, Some(at(11, 10)));
    let changeovers = fx.store().find_current_changeovers("D").unwrap();
    assert_eq!(changeovers.len(), 1);
    assert_eq!(changeovers[0].previous_task_id.as_deref(), Some("A"));
}

#[test]
fn test_rejected_predecessor_no_longer_counts() {
    let fx = fixture_with_a_and_b();
    let a = fx.task("A").with_state(TaskState::Rejected);
    let report = fx.service.save_task(a).unwrap();

    assert_eq!(report.cascaded_task_ids(), vec!["B"]);
    let b = fx.task("B");
    assert_eq!(b.start, Some(at(9, 0)));
    assert!(fx.store().find_current_changeovers("B").unwrap().is_empty());
}

// ==========================================
// 层级校验
// ==========================================

#[test]
fn test_child_starting_after_parent_is_reported_not_reordered() {
    let fx = TimelineFixture::new();
    let parent = Task::new("P")
        .with_workstation("R2")
        .with_order("O3")
        .with_dates(at(10, 0), at(12, 0));
    fx.service.save_task(parent).unwrap();

    let child = Task::new("C")
        .with_workstation("R")
        .with_order("O3")
        .with_parent("P")
        .with_dates(at(11, 0), at(11, 30));
    let report = fx.service.save_task(child).unwrap();

    assert!(!report.is_committed());
    let outcome = report.outcome.unwrap();
    assert_eq!(outcome.result, SetDateResult::Error);
    // 计算结果保留供检查，不重排
    assert_eq!(outcome.start, Some(at(11, 0)));
    assert_eq!(outcome.violations[0].reason, ViolationReason::StartAfterParentStart);
    assert_eq!(outcome.violations[0].related_task_id.as_deref(), Some("P"));

    assert!(fx.store().find_task("C").unwrap().is_none());
    let reported = fx.sink.take();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].task_id, "C");
}

#[test]
fn test_child_without_workstation_parent_is_not_validated() {
    let fx = TimelineFixture::new();
    let parent = Task::new("P").with_order("O3").with_dates(at(10, 0), at(12, 0));
    fx.service.save_task(parent).unwrap();

    let child = Task::new("C")
        .with_workstation("R")
        .with_order("O3")
        .with_parent("P")
        .with_dates(at(11, 0), at(11, 30));
    let report = fx.service.save_task(child).unwrap();
    assert!(report.is_committed());
    assert!(fx.sink.take().is_empty());
}

// ==========================================
// 错误处理 / 订单回写
// ==========================================

#[test]
fn test_missing_product_in_cascade_does_not_abort_save() {
    let fx = TimelineFixture::new();
    fx.service.save_task(task_a()).unwrap();

    let mut no_product = Order::new("O-NP", "P1", 1.0);
    no_product.product_id = None;
    fx.store().save_order(&no_product).unwrap();
    // 绕过服务直接写入，模拟历史数据
    fx.store()
        .save_task(
            &Task::new("E")
                .with_workstation("R")
                .with_order("O-NP")
                .with_dates(at(9, 0), at(10, 0)),
        )
        .unwrap();

    let mut a = fx.task("A");
    a.finish = Some(at(9, 15));
    let report = fx.service.save_task(a).unwrap();

    assert!(report.is_committed());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].task_id, "E");
    assert_eq!(fx.task("A").finish, Some(at(9, 15)));
}

#[test]
fn test_cascade_limit_aborts_save() {
    let config = SchedulerConfig {
        max_cascade_steps: 0,
        ..SchedulerConfig::default()
    };
    let fx = TimelineFixture::with_config(config);
    fx.service.save_task(task_a()).unwrap();
    fx.service.save_task(task_b()).unwrap();

    let mut a = fx.task("A");
    a.finish = Some(at(9, 30));
    let err = fx.service.save_task(a).unwrap_err();
    assert!(matches!(err, EngineError::CascadeLimitExceeded { limit: 0 }));
}

#[test]
fn test_order_dates_follow_task_dates() {
    let fx = fixture_with_a_and_b();
    let order = fx.store().find_order("O2").unwrap().unwrap();
    assert_eq!(order.start, Some(at(9, 10)));
    assert_eq!(order.finish, Some(at(10, 10)));

    let config = SchedulerConfig {
        set_order_dates_based_on_task_dates: false,
        ..SchedulerConfig::default()
    };
    let fx = TimelineFixture::with_config(config);
    fx.service.save_task(task_a()).unwrap();
    let report = fx.service.save_task(task_b()).unwrap();
    assert!(!report.order_reconciled);
    assert!(fx.store().find_order("O2").unwrap().unwrap().start.is_none());
}
