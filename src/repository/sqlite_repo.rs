// ==========================================
// 工位换型排程引擎 - SQLite 时间线仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 约束: 所有查询使用参数化,防止 SQL 注入
// 存储: operational_task / workstation_changeover / production_order
// ==========================================

use crate::db::{configure_sqlite_connection, init_timeline_schema, DATETIME_FORMAT};
use crate::domain::{ChangeoverInstance, ChangeoverType, Order, Task, TaskState, TimeRange};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::timeline_repo::{ChangeoverRepository, OrderRepository, TaskRepository};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const TASK_COLUMNS: &str = r#"
    task_id, number, workstation_id, requested_start, start_date, finish_date,
    order_id, operation_id, parent_id, actual_staff, state
"#;

const CHANGEOVER_COLUMNS: &str = r#"
    changeover_id, norm_id, name, description, workstation_id, attribute_id,
    from_value_id, to_value_id, current_task_id, previous_task_id,
    previous_position_id, duration_secs, is_parallel, start_date, finish_date,
    changeover_type
"#;

// ==========================================
// SqliteTimelineRepository - 时间线仓储
// ==========================================
pub struct SqliteTimelineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTimelineRepository {
    /// 打开数据库并建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = Connection::open(db_path)?;
        configure_sqlite_connection(&conn)?;
        init_timeline_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例（不建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 在一个事务中执行整次变更，失败时回滚到变更前
    ///
    /// 连接上不能已有未结束的事务；调用方自管事务时直接调用服务即可
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.get_conn()?
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(RepositoryError::from)?;

        match f() {
            Ok(value) => {
                self.get_conn()?
                    .execute_batch("COMMIT")
                    .map_err(RepositoryError::from)?;
                Ok(value)
            }
            Err(e) => {
                let rolled_back = self
                    .get_conn()
                    .and_then(|conn| conn.execute_batch("ROLLBACK").map_err(RepositoryError::from));
                if let Err(rollback) = rolled_back {
                    tracing::warn!(error = %rollback, "事务回滚失败");
                }
                Err(e)
            }
        }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn query_tasks(&self, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> RepositoryResult<Vec<Task>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM operational_task WHERE {} ORDER BY task_id",
            TASK_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, map_task_row)?
            .collect::<SqliteResult<Vec<Task>>>()?;
        Ok(rows)
    }

    fn query_changeovers(
        &self,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<ChangeoverInstance>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM workstation_changeover WHERE {} ORDER BY changeover_id",
            CHANGEOVER_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, map_changeover_row)?
            .collect::<SqliteResult<Vec<ChangeoverInstance>>>()?;
        Ok(rows)
    }
}

// ==========================================
// 行映射
// ==========================================

fn format_dt(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|v| v.format(DATETIME_FORMAT).to_string())
}

fn parse_dt(row: &Row<'_>, idx: usize) -> SqliteResult<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            }),
        None => Ok(None),
    }
}

fn map_task_row(row: &Row<'_>) -> SqliteResult<Task> {
    let state_raw: String = row.get(10)?;
    // 未知状态按 PENDING 读入，避免单条脏数据阻断整条时间线
    let state = TaskState::parse(&state_raw).unwrap_or(TaskState::Pending);

    Ok(Task {
        id: row.get(0)?,
        number: row.get(1)?,
        workstation_id: row.get(2)?,
        requested_start: parse_dt(row, 3)?,
        start: parse_dt(row, 4)?,
        finish: parse_dt(row, 5)?,
        order_id: row.get(6)?,
        operation_id: row.get(7)?,
        parent_id: row.get(8)?,
        actual_staff: row.get(9)?,
        state,
    })
}

fn map_changeover_row(row: &Row<'_>) -> SqliteResult<ChangeoverInstance> {
    let type_raw: String = row.get(15)?;
    let changeover_type = ChangeoverType::parse(&type_raw).unwrap_or(ChangeoverType::BasedOnNorm);

    Ok(ChangeoverInstance {
        id: row.get(0)?,
        norm_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        workstation_id: row.get(4)?,
        attribute_id: row.get(5)?,
        from_value_id: row.get(6)?,
        to_value_id: row.get(7)?,
        current_task_id: row.get(8)?,
        previous_task_id: row.get(9)?,
        previous_position_id: row.get(10)?,
        duration_secs: row.get(11)?,
        parallel: row.get::<_, i64>(12)? != 0,
        start: parse_dt(row, 13)?,
        finish: parse_dt(row, 14)?,
        changeover_type,
    })
}

fn map_order_row(row: &Row<'_>) -> SqliteResult<Order> {
    Ok(Order {
        id: row.get(0)?,
        number: row.get(1)?,
        product_id: row.get(2)?,
        planned_quantity: row.get(3)?,
        start: parse_dt(row, 4)?,
        finish: parse_dt(row, 5)?,
        parent_task_id: row.get(6)?,
    })
}

fn insert_changeover(conn: &Connection, instance: &ChangeoverInstance) -> SqliteResult<usize> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO workstation_changeover (
            changeover_id, norm_id, name, description, workstation_id, attribute_id,
            from_value_id, to_value_id, current_task_id, previous_task_id,
            previous_position_id, duration_secs, is_parallel, start_date, finish_date,
            changeover_type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            instance.id,
            instance.norm_id,
            instance.name,
            instance.description,
            instance.workstation_id,
            instance.attribute_id,
            instance.from_value_id,
            instance.to_value_id,
            instance.current_task_id,
            instance.previous_task_id,
            instance.previous_position_id,
            instance.duration_secs,
            instance.parallel as i64,
            format_dt(instance.start),
            format_dt(instance.finish),
            instance.changeover_type.as_str(),
        ],
    )
}

// ==========================================
// TaskRepository
// ==========================================

impl TaskRepository for SqliteTimelineRepository {
    fn find_task(&self, id: &str) -> RepositoryResult<Option<Task>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM operational_task WHERE task_id = ?1", TASK_COLUMNS);
        let task = conn.query_row(&sql, params![id], map_task_row).optional()?;
        Ok(task)
    }

    fn find_tasks_on_workstation(
        &self,
        workstation_id: &str,
        range: TimeRange,
        excluded_states: &[TaskState],
    ) -> RepositoryResult<Vec<Task>> {
        // 状态集合很小，在内存中过滤
        let tasks = self.query_tasks("workstation_id = ?1", &[&workstation_id])?;
        Ok(tasks
            .into_iter()
            .filter(|t| !excluded_states.contains(&t.state))
            .filter(|t| range.intersects(t))
            .collect())
    }

    fn find_children(&self, parent_id: &str) -> RepositoryResult<Vec<Task>> {
        self.query_tasks("parent_id = ?1", &[&parent_id])
    }

    fn find_tasks_by_order(&self, order_id: &str) -> RepositoryResult<Vec<Task>> {
        self.query_tasks("order_id = ?1", &[&order_id])
    }

    fn save_task(&self, task: &Task) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO operational_task (
                task_id, number, workstation_id, requested_start, start_date, finish_date,
                order_id, operation_id, parent_id, actual_staff, state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                task.id,
                task.number,
                task.workstation_id,
                format_dt(task.requested_start),
                format_dt(task.start),
                format_dt(task.finish),
                task.order_id,
                task.operation_id,
                task.parent_id,
                task.actual_staff,
                task.state.as_str(),
            ],
        )?;
        Ok(())
    }

    fn delete_task(&self, id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM operational_task WHERE task_id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

// ==========================================
// ChangeoverRepository
// ==========================================

impl ChangeoverRepository for SqliteTimelineRepository {
    fn find_current_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>> {
        self.query_changeovers("current_task_id = ?1", &[&task_id])
    }

    fn find_previous_changeovers(&self, task_id: &str) -> RepositoryResult<Vec<ChangeoverInstance>> {
        self.query_changeovers("previous_task_id = ?1", &[&task_id])
    }

    fn save_changeover(&self, instance: &ChangeoverInstance) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_changeover(&conn, instance)?;
        Ok(())
    }

    fn delete_changeover(&self, id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM workstation_changeover WHERE changeover_id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }

    /// 在保存点内替换派生实例
    ///
    /// 保存点可嵌套在调用方已开启的事务中；失败时只回滚本次替换
    fn replace_current_changeovers(
        &self,
        task_id: &str,
        instances: &[ChangeoverInstance],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let sp = conn.savepoint()?;
        sp.execute(
            "DELETE FROM workstation_changeover WHERE current_task_id = ?1 AND changeover_type = ?2",
            params![task_id, ChangeoverType::BasedOnNorm.as_str()],
        )?;
        for instance in instances {
            insert_changeover(&sp, instance)?;
        }
        sp.commit()?;
        Ok(())
    }
}

// ==========================================
// OrderRepository
// ==========================================

impl OrderRepository for SqliteTimelineRepository {
    fn find_order(&self, id: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                r#"
                SELECT order_id, number, product_id, planned_quantity,
                       start_date, finish_date, parent_task_id
                FROM production_order
                WHERE order_id = ?1
                "#,
                params![id],
                map_order_row,
            )
            .optional()?;
        Ok(order)
    }

    fn find_sub_orders(&self, parent_task_id: &str) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, number, product_id, planned_quantity,
                   start_date, finish_date, parent_task_id
            FROM production_order
            WHERE parent_task_id = ?1
            ORDER BY order_id
            "#,
        )?;
        let orders = stmt
            .query_map(params![parent_task_id], map_order_row)?
            .collect::<SqliteResult<Vec<Order>>>()?;
        Ok(orders)
    }

    fn save_order(&self, order: &Order) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO production_order (
                order_id, number, product_id, planned_quantity,
                start_date, finish_date, parent_task_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                order.id,
                order.number,
                order.product_id,
                order.planned_quantity,
                format_dt(order.start),
                format_dt(order.finish),
                order.parent_task_id,
            ],
        )?;
        Ok(())
    }
}
