// ==========================================
// 小批量生产排产系统 - 配置层
// ==========================================
// 职责: 计划引擎参数与日志参数的加载
// 存储: config_kv 表（scope_id='global'）
// ==========================================

pub mod config_manager;
pub mod planner_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use planner_config::{LoggingConfig, PlannerConfig};
