// ==========================================
// 小批量生产排产系统 - 应用状态
// ==========================================
// 职责: 打开数据库、建表、加载配置并装配 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{ApiError, ApiResult, PlanningApi};
use crate::config::{ConfigManager, LoggingConfig, PlannerConfig};
use crate::db::{init_schema, open_shared_connection};
use crate::engine::{FactorTableConverter, UnitConverter};

/// 应用状态
///
/// 包含共享连接、已加载配置和 API 实例
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享数据库连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 计划引擎参数（启动时加载）
    pub planner_config: PlannerConfig,

    /// 日志参数（启动时加载）
    pub logging_config: LoggingConfig,

    /// 排产计划API
    pub planning_api: Arc<PlanningApi>,
}

impl AppState {
    /// 创建新的AppState实例（使用标准单位换算表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: String) -> ApiResult<Self> {
        Self::with_converter(db_path, Arc::new(FactorTableConverter::standard()))
    }

    /// 创建AppState，并注入自定义单位换算服务
    pub fn with_converter(db_path: String, converter: Arc<dyn UnitConverter>) -> ApiResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared_connection(&db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;

        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", e)))?;
            init_schema(&guard)
                .map_err(|e| ApiError::DatabaseError(format!("建表失败: {}", e)))?;
        }

        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let planner_config = config_manager.load_planner_config()?;
        let logging_config = config_manager.load_logging_config()?;
        tracing::debug!(?planner_config, "计划参数已加载");

        let planning_api = Arc::new(PlanningApi::new(conn.clone(), converter, planner_config.clone()));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            conn,
            config_manager,
            planner_config,
            logging_config,
            planning_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 BATCH_APS_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("BATCH_APS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./batch_production_aps.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("batch-production-aps-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("batch-production-aps");
        }

        std::fs::create_dir_all(&path).ok();
        path = path.join("batch_production_aps.db");
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_bootstraps_empty_database() {
        let file = NamedTempFile::new().unwrap();
        let db_path = file.path().to_str().unwrap().to_string();

        let state = AppState::new(db_path.clone()).unwrap();
        assert_eq!(state.db_path, db_path);
        assert_eq!(state.planner_config, PlannerConfig::default());

        // 空库无生产记录，补齐快照应为空操作
        let report = state.planning_api.backfill_snapshots("test").unwrap();
        assert!(report.created.is_empty());
    }
}
