// ==========================================
// 工位换型排程引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_timeline_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 解析配置值；格式错误时告警并返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr,
    {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    warn!(key = key, value = %raw, "配置值格式错误，使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 加载排程参数（缺省键回落 SchedulerConfig::default）
    pub fn load_scheduler_config(&self) -> Result<SchedulerConfig, Box<dyn Error>> {
        let d = SchedulerConfig::default();
        Ok(SchedulerConfig {
            skip_finished_tasks: self
                .get_parsed_or_default(config_keys::SKIP_FINISHED_TASKS, d.skip_finished_tasks)?,
            additional_time_extends_operation: self.get_parsed_or_default(
                config_keys::ADDITIONAL_TIME_EXTENDS_OPERATION,
                d.additional_time_extends_operation,
            )?,
            include_tpz: self.get_parsed_or_default(config_keys::INCLUDE_TPZ, d.include_tpz)?,
            schedule_for_buffer_workstations: self.get_parsed_or_default(
                config_keys::SCHEDULE_FOR_BUFFER_WORKSTATIONS,
                d.schedule_for_buffer_workstations,
            )?,
            set_order_dates_based_on_task_dates: self.get_parsed_or_default(
                config_keys::SET_ORDER_DATES_BASED_ON_TASK_DATES,
                d.set_order_dates_based_on_task_dates,
            )?,
            include_sub_orders: self
                .get_parsed_or_default(config_keys::INCLUDE_SUB_ORDERS, d.include_sub_orders)?,
            max_cascade_steps: self
                .get_parsed_or_default(config_keys::MAX_CASCADE_STEPS, d.max_cascade_steps)?,
        })
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    ///
    /// # 注意
    /// - 此方法会覆盖现有的global配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute("BEGIN TRANSACTION", [])?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            let affected = conn.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            );
            match affected {
                Ok(n) => count += n,
                Err(e) => {
                    conn.execute("ROLLBACK", [])?;
                    return Err(Box::new(e));
                }
            }
        }

        conn.execute("COMMIT", [])?;
        Ok(count)
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 邻居查找
    pub const SKIP_FINISHED_TASKS: &str = "skip_finished_tasks";

    // 工时
    pub const ADDITIONAL_TIME_EXTENDS_OPERATION: &str = "additional_time_extends_operation";
    pub const INCLUDE_TPZ: &str = "include_tpz";

    // 批量重排
    pub const SCHEDULE_FOR_BUFFER_WORKSTATIONS: &str = "schedule_for_buffer_workstations";

    // 订单
    pub const SET_ORDER_DATES_BASED_ON_TASK_DATES: &str = "set_order_dates_based_on_task_dates";
    pub const INCLUDE_SUB_ORDERS: &str = "include_sub_orders";

    // 传播
    pub const MAX_CASCADE_STEPS: &str = "max_cascade_steps";
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(file.path().to_str().unwrap()).unwrap();
        (file, manager)
    }

    #[test]
    fn test_load_defaults_from_empty_table() {
        let (_file, manager) = manager();
        assert_eq!(manager.load_scheduler_config().unwrap(), SchedulerConfig::default());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::SKIP_FINISHED_TASKS, "true").unwrap();
        manager.set_global_config_value(config_keys::MAX_CASCADE_STEPS, "abc").unwrap();

        let config = manager.load_scheduler_config().unwrap();
        assert!(config.skip_finished_tasks);
        assert_eq!(config.max_cascade_steps, 1000);
    }

    #[test]
    fn test_snapshot_restore() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::INCLUDE_TPZ, "false").unwrap();
        let snapshot = manager.get_config_snapshot().unwrap();

        manager.set_global_config_value(config_keys::INCLUDE_TPZ, "true").unwrap();
        assert_eq!(manager.restore_config_from_snapshot(&snapshot).unwrap(), 1);
        assert!(!manager.load_scheduler_config().unwrap().include_tpz);
    }
}
