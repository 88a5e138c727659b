// ==========================================
// 工位换型排程引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供时间线表结构 (任务 / 换型实例 / 订单 / 配置)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时刻的存储格式
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）
pub fn init_timeline_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS production_order (
            order_id TEXT PRIMARY KEY,
            number TEXT NOT NULL,
            product_id TEXT,
            planned_quantity REAL NOT NULL DEFAULT 0,
            start_date TEXT,
            finish_date TEXT,
            parent_task_id TEXT
        );

        CREATE TABLE IF NOT EXISTS operational_task (
            task_id TEXT PRIMARY KEY,
            number TEXT NOT NULL,
            workstation_id TEXT,
            requested_start TEXT,
            start_date TEXT,
            finish_date TEXT,
            order_id TEXT,
            operation_id TEXT,
            parent_id TEXT,
            actual_staff INTEGER,
            state TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_task_workstation
            ON operational_task (workstation_id, finish_date);

        CREATE TABLE IF NOT EXISTS workstation_changeover (
            changeover_id TEXT PRIMARY KEY,
            norm_id TEXT,
            name TEXT NOT NULL,
            description TEXT,
            workstation_id TEXT NOT NULL,
            attribute_id TEXT,
            from_value_id TEXT,
            to_value_id TEXT,
            current_task_id TEXT NOT NULL,
            previous_task_id TEXT,
            previous_position_id TEXT,
            duration_secs INTEGER NOT NULL,
            is_parallel INTEGER NOT NULL DEFAULT 0,
            start_date TEXT,
            finish_date TEXT,
            changeover_type TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_changeover_current
            ON workstation_changeover (current_task_id);
        CREATE INDEX IF NOT EXISTS idx_changeover_previous
            ON workstation_changeover (previous_task_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
