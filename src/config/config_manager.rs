// ==========================================
// 小批量生产排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::planner_config::{LoggingConfig, PlannerConfig, MAX_QUANTITY_EPSILON};
use crate::db::open_sqlite_connection;
use crate::domain::types::AllocationPolicy;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

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
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at)
               VALUES ('global', ?1, ?2, datetime('now'))
               ON CONFLICT(scope_id, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at"#,
            params![key, value],
        )?;
        debug!(key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON）
    pub fn get_config_snapshot(&self) -> RepositoryResult<serde_json::Value> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(json!(entries))
    }

    /// 加载计划引擎参数（缺省项取默认值，非法值报错）
    pub fn load_planner_config(&self) -> RepositoryResult<PlannerConfig> {
        let defaults = PlannerConfig::default();

        let allocation_policy = match self.get_global_config_value(config_keys::ALLOCATION_POLICY)? {
            Some(raw) => AllocationPolicy::parse(&raw).ok_or_else(|| RepositoryError::FieldValueError {
                field: config_keys::ALLOCATION_POLICY.to_string(),
                message: format!("未知的分配策略: {}", raw),
            })?,
            None => defaults.allocation_policy,
        };

        let waste_warning_pct =
            self.get_f64_or(config_keys::WASTE_WARNING_PCT, defaults.waste_warning_pct)?;
        let quantity_epsilon =
            self.get_f64_or(config_keys::QUANTITY_EPSILON, defaults.quantity_epsilon)?;

        if !(0.0..=MAX_QUANTITY_EPSILON).contains(&quantity_epsilon) {
            return Err(RepositoryError::FieldValueError {
                field: config_keys::QUANTITY_EPSILON.to_string(),
                message: format!(
                    "容差必须在 0 到 {} 之间: {}",
                    MAX_QUANTITY_EPSILON, quantity_epsilon
                ),
            });
        }

        Ok(PlannerConfig {
            allocation_policy,
            waste_warning_pct,
            quantity_epsilon,
        })
    }

    /// 加载日志参数
    pub fn load_logging_config(&self) -> RepositoryResult<LoggingConfig> {
        let defaults = LoggingConfig::default();
        let level = self
            .get_global_config_value(config_keys::LOGGING_LEVEL)?
            .unwrap_or(defaults.level);
        let json = match self.get_global_config_value(config_keys::LOGGING_JSON)? {
            Some(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            None => defaults.json,
        };
        Ok(LoggingConfig { level, json })
    }

    fn get_f64_or(&self, key: &str, default: f64) -> RepositoryResult<f64> {
        match self.get_global_config_value(key)? {
            Some(raw) => raw.trim().parse::<f64>().map_err(|e| RepositoryError::FieldValueError {
                field: key.to_string(),
                message: format!("无法解析为数值: {} ({})", raw, e),
            }),
            None => Ok(default),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 计划引擎
    pub const ALLOCATION_POLICY: &str = "planner.allocation_policy";
    pub const WASTE_WARNING_PCT: &str = "planner.waste_warning_pct";
    pub const QUANTITY_EPSILON: &str = "planner.quantity_epsilon";

    // 日志
    pub const LOGGING_LEVEL: &str = "logging.level";
    pub const LOGGING_JSON: &str = "logging.json";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::batch_calculator::plan_batches;

    fn memory_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let manager = memory_manager();
        assert_eq!(manager.load_planner_config().unwrap(), PlannerConfig::default());
        assert_eq!(manager.load_logging_config().unwrap(), LoggingConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let manager = memory_manager();
        manager
            .set_global_config_value(config_keys::ALLOCATION_POLICY, "independent")
            .unwrap();
        manager
            .set_global_config_value(config_keys::WASTE_WARNING_PCT, "10.5")
            .unwrap();
        manager.set_global_config_value(config_keys::LOGGING_JSON, "true").unwrap();

        let cfg = manager.load_planner_config().unwrap();
        assert_eq!(cfg.allocation_policy, AllocationPolicy::Independent);
        assert!((cfg.waste_warning_pct - 10.5).abs() < 1e-12);
        assert!(manager.load_logging_config().unwrap().json);

        let snapshot = manager.get_config_snapshot().unwrap();
        assert_eq!(snapshot[config_keys::WASTE_WARNING_PCT], "10.5");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let manager = memory_manager();
        manager
            .set_global_config_value(config_keys::ALLOCATION_POLICY, "RANDOM")
            .unwrap();
        assert!(matches!(
            manager.load_planner_config(),
            Err(RepositoryError::FieldValueError { .. })
        ));

        manager
            .set_global_config_value(config_keys::ALLOCATION_POLICY, "SEQUENTIAL")
            .unwrap();
        manager
            .set_global_config_value(config_keys::QUANTITY_EPSILON, "abc")
            .unwrap();
        assert!(manager.load_planner_config().is_err());
    }

    #[test]
    fn test_quantity_epsilon_is_bounded() {
        let manager = memory_manager();
        manager
            .set_global_config_value(config_keys::QUANTITY_EPSILON, "0.05")
            .unwrap();
        assert!(matches!(
            manager.load_planner_config(),
            Err(RepositoryError::FieldValueError { ref field, .. }) if field == config_keys::QUANTITY_EPSILON
        ));

        manager
            .set_global_config_value(config_keys::QUANTITY_EPSILON, "-1e-9")
            .unwrap();
        assert!(manager.load_planner_config().is_err());

        manager
            .set_global_config_value(config_keys::QUANTITY_EPSILON, "1e-7")
            .unwrap();
        let cfg = manager.load_planner_config().unwrap();
        assert_eq!(cfg.quantity_epsilon, 1e-7);
        assert_eq!(plan_batches(49.0, 48.0, cfg.quantity_epsilon).unwrap().batches, 2);
    }
}
