// ==========================================
// SQLite 时间线仓储集成测试
// ==========================================
// 职责: 验证 SQLite 仓储的读写语义与服务在 SQLite 上的完整链路
// 工具: tempfile 临时数据库
// ==========================================

mod helpers;

use helpers::{at, seed_orders, standard_catalog, task_a, task_b};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use workstation_changeover::config::config_keys;
use workstation_changeover::db::{configure_sqlite_connection, init_timeline_schema, read_schema_version};
use workstation_changeover::engine::{AlwaysWorkingCalendar, EngineError};
use workstation_changeover::repository::{
    ChangeoverRepository, OrderRepository, SqliteTimelineRepository, TaskRepository,
};
use workstation_changeover::{
    ChangeoverInstance, ChangeoverNorm, ConfigManager, Order, SchedulerConfig, Task, TaskState,
    TimeRange, TimelineRepositories, TimelineService,
};

fn temp_repo() -> (NamedTempFile, SqliteTimelineRepository) {
    let file = NamedTempFile::new().unwrap();
    let repo = SqliteTimelineRepository::new(file.path().to_str().unwrap()).unwrap();
    (file, repo)
}

#[test]
fn test_task_round_trip_keeps_all_fields() {
    let (_file, repo) = temp_repo();
    let mut task = Task::new("T-1")
        .with_workstation("R")
        .with_order("O1")
        .with_operation("OP-CUT")
        .with_parent("T-0")
        .with_dates(at(8, 0), at(9, 0))
        .with_state(TaskState::InProgress);
    task.start = Some(at(8, 10));
    task.actual_staff = Some(3);
    repo.save_task(&task).unwrap();

    let loaded = repo.find_task("T-1").unwrap().unwrap();
    assert_eq!(loaded, task);
    assert!(repo.find_task("missing").unwrap().is_none());

    assert_eq!(repo.find_children("T-0").unwrap().len(), 1);
    assert_eq!(repo.find_tasks_by_order("O1").unwrap().len(), 1);

    assert!(repo.delete_task("T-1").unwrap());
    assert!(!repo.delete_task("T-1").unwrap());
}

#[test]
fn test_workstation_query_filters_state_and_range() {
    let (_file, repo) = temp_repo();
    repo.save_task(&Task::new("A").with_workstation("R").with_dates(at(8, 0), at(9, 0)))
        .unwrap();
    repo.save_task(
        &Task::new("B")
            .with_workstation("R")
            .with_dates(at(10, 0), at(11, 0))
            .with_state(TaskState::Rejected),
    )
    .unwrap();
    repo.save_task(&Task::new("C").with_workstation("R2").with_dates(at(8, 0), at(9, 0)))
        .unwrap();

    let all = repo
        .find_tasks_on_workstation("R", TimeRange::unbounded(), &[])
        .unwrap();
    assert_eq!(all.len(), 2);

    let active = repo
        .find_tasks_on_workstation("R", TimeRange::unbounded(), &[TaskState::Rejected])
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "A");

    let late = repo
        .find_tasks_on_workstation("R", TimeRange::between(at(9, 30), at(12, 0)), &[])
        .unwrap();
    assert_eq!(late.len(), 1);
    assert_eq!(late[0].id, "B");
}

#[test]
fn test_replace_current_changeovers_keeps_own_instances() {
    let (_file, repo) = temp_repo();
    let norm = ChangeoverNorm::between_values("N-RB", "R", "Color", "Red", "Blue", 600);
    let mut derived = ChangeoverInstance::from_norm(&norm, "B", Some("A"), None);
    derived.start = Some(at(9, 0));
    derived.finish = Some(at(9, 10));
    let own = ChangeoverInstance::own("manual", "R", "B", None, at(8, 50), 300);

    repo.save_changeover(&derived).unwrap();
    repo.save_changeover(&own).unwrap();
    assert_eq!(repo.find_current_changeovers("B").unwrap().len(), 2);
    assert_eq!(repo.find_previous_changeovers("A").unwrap(), vec![derived.clone()]);

    repo.replace_current_changeovers("B", &[]).unwrap();
    let remaining = repo.find_current_changeovers("B").unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].is_own());
    assert!(repo.find_previous_changeovers("A").unwrap().is_empty());
}

#[test]
fn test_order_round_trip_and_sub_orders() {
    let (_file, repo) = temp_repo();
    let mut order = Order::new("O-SUB", "P1", 12.5).for_parent_task("T-PARENT");
    order.start = Some(at(8, 0));
    repo.save_order(&order).unwrap();

    assert_eq!(repo.find_order("O-SUB").unwrap(), Some(order.clone()));
    assert_eq!(repo.find_sub_orders("T-PARENT").unwrap(), vec![order]);
    assert!(repo.find_sub_orders("T-OTHER").unwrap().is_empty());
}

#[test]
fn test_service_on_sqlite_follows_predecessor_changes() {
    let (_file, repo) = temp_repo();
    seed_orders(&repo);
    let repo = Arc::new(repo);
    let deps = TimelineRepositories::new(repo.clone(), Arc::new(standard_catalog()), Arc::new(AlwaysWorkingCalendar));
    let service = TimelineService::new(deps, Default::default());

    service.save_task(task_a()).unwrap();
    service.save_task(task_b()).unwrap();
    let b = repo.find_task("B").unwrap().unwrap();
    assert_eq!(b.start, Some(at(9, 10)));

    let mut a = repo.find_task("A").unwrap().unwrap();
    a.finish = Some(at(9, 30));
    let report = service.save_task(a).unwrap();
    assert_eq!(report.cascaded_task_ids(), vec!["B"]);
    assert_eq!(repo.find_task("B").unwrap().unwrap().start, Some(at(9, 40)));

    service.delete_task("A").unwrap();
    let b = repo.find_task("B").unwrap().unwrap();
    assert_eq!(b.start, Some(at(9, 0)));
    assert!(repo.find_current_changeovers("B").unwrap().is_empty());
}

#[test]
fn test_config_and_timeline_share_one_connection() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    configure_sqlite_connection(&conn).unwrap();
    init_timeline_schema(&conn).unwrap();
    assert_eq!(read_schema_version(&conn).unwrap(), Some(1));
    let conn = Arc::new(Mutex::new(conn));

    let manager = ConfigManager::from_connection(conn.clone()).unwrap();
    manager
        .set_global_config_value(config_keys::SKIP_FINISHED_TASKS, "true")
        .unwrap();
    let config = manager.load_scheduler_config().unwrap();
    assert!(config.skip_finished_tasks);

    let repo = Arc::new(SqliteTimelineRepository::from_connection(conn));
    seed_orders(&*repo);
    let deps = TimelineRepositories::new(repo.clone(), Arc::new(standard_catalog()), Arc::new(AlwaysWorkingCalendar));
    let service = TimelineService::new(deps, config);

    // 已完成的 A 不再作为前序
    service.save_task(task_a().with_state(TaskState::Finished)).unwrap();
    service.save_task(task_b()).unwrap();
    let b = repo.find_task("B").unwrap().unwrap();
    assert_eq!(b.start, Some(at(9, 0)));
    assert!(repo.find_current_changeovers("B").unwrap().is_empty());
}

#[test]
fn test_sub_second_instants_survive_round_trip() {
    let (_file, repo) = temp_repo();
    let start = at(8, 0) + chrono::Duration::milliseconds(250);
    let finish = at(9, 0) + chrono::Duration::milliseconds(750);
    repo.save_task(&Task::new("T-MS").with_workstation("R").with_dates(start, finish))
        .unwrap();

    let loaded = repo.find_task("T-MS").unwrap().unwrap();
    assert_eq!(loaded.start, Some(start));
    assert_eq!(loaded.finish, Some(finish));
}

/// 共享连接上的仓储与两个服务：默认配置 / 传播上限为 0
fn shared_connection_services() -> (
    NamedTempFile,
    Arc<Mutex<Connection>>,
    Arc<SqliteTimelineRepository>,
    TimelineService,
    TimelineService,
) {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    configure_sqlite_connection(&conn).unwrap();
    init_timeline_schema(&conn).unwrap();
    let conn = Arc::new(Mutex::new(conn));

    let repo = Arc::new(SqliteTimelineRepository::from_connection(conn.clone()));
    seed_orders(&*repo);
    let catalog = Arc::new(standard_catalog());
    let service = TimelineService::new(
        TimelineRepositories::new(repo.clone(), catalog.clone(), Arc::new(AlwaysWorkingCalendar)),
        SchedulerConfig::default(),
    );
    let limited = TimelineService::new(
        TimelineRepositories::new(repo.clone(), catalog, Arc::new(AlwaysWorkingCalendar)),
        SchedulerConfig {
            max_cascade_steps: 0,
            ..SchedulerConfig::default()
        },
    );
    (file, conn, repo, service, limited)
}

#[test]
fn test_service_runs_inside_caller_transaction() {
    let (_file, conn, repo, service, _) = shared_connection_services();
    service.save_task(task_a()).unwrap();

    conn.lock().unwrap().execute_batch("BEGIN").unwrap();
    let report = service.save_task(task_b()).unwrap();
    assert!(report.is_committed());
    conn.lock().unwrap().execute_batch("COMMIT").unwrap();

    assert_eq!(repo.find_task("B").unwrap().unwrap().start, Some(at(9, 10)));
    assert_eq!(repo.find_current_changeovers("B").unwrap().len(), 1);
}

#[test]
fn test_caller_rollback_restores_timeline_after_failed_cascade() {
    let (_file, conn, repo, service, limited) = shared_connection_services();
    service.save_task(task_a()).unwrap();
    service.save_task(task_b()).unwrap();
    let before_changeovers = repo.find_current_changeovers("B").unwrap();

    conn.lock().unwrap().execute_batch("BEGIN").unwrap();
    let mut a = repo.find_task("A").unwrap().unwrap();
    a.finish = Some(at(9, 30));
    let err = limited.save_task(a).unwrap_err();
    assert!(matches!(err, EngineError::CascadeLimitExceeded { limit: 0 }));
    conn.lock().unwrap().execute_batch("ROLLBACK").unwrap();

    assert_eq!(repo.find_task("A").unwrap().unwrap().finish, Some(at(9, 0)));
    let b = repo.find_task("B").unwrap().unwrap();
    assert_eq!(b.start, Some(at(9, 10)));
    assert_eq!(b.finish, Some(at(10, 10)));
    assert_eq!(repo.find_current_changeovers("B").unwrap(), before_changeovers);
}

#[test]
fn test_in_transaction_rolls_back_failed_mutation() {
    let (_file, _conn, repo, service, limited) = shared_connection_services();
    service.save_task(task_a()).unwrap();
    service.save_task(task_b()).unwrap();

    let mut a = repo.find_task("A").unwrap().unwrap();
    a.finish = Some(at(9, 30));
    let failed: Result<_, EngineError> = repo.in_transaction(|| limited.save_task(a.clone()));
    assert!(failed.is_err());
    assert_eq!(repo.find_task("A").unwrap().unwrap().finish, Some(at(9, 0)));
    assert_eq!(repo.find_task("B").unwrap().unwrap().start, Some(at(9, 10)));

    let report = repo.in_transaction(|| service.save_task(a)).unwrap();
    assert_eq!(report.cascaded_task_ids(), vec!["B"]);
    assert_eq!(repo.find_task("B").unwrap().unwrap().start, Some(at(9, 40)));
}
