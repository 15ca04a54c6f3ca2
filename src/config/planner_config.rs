// ==========================================
// 小批量生产排产系统 - 计划引擎配置对象
// ==========================================

use crate::domain::types::AllocationPolicy;
use serde::{Deserialize, Serialize};

/// 默认浪费告警阈值（%）
pub const DEFAULT_WASTE_WARNING_PCT: f64 = 25.0;

/// 默认数量容差（浮点比较）
pub const DEFAULT_QUANTITY_EPSILON: f64 = 1e-9;

/// 数量容差上限（超过即视为配置错误）
pub const MAX_QUANTITY_EPSILON: f64 = 1e-6;

/// 取整贴近时允许的相对误差（固定值，不受配置影响）
pub const ROUNDING_RELATIVE_TOLERANCE: f64 = 1e-12;

// ==========================================
// PlannerConfig - 引擎运行参数
// ==========================================
// 引擎只接收值对象，不读取任何全局状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// 多目标竞争库存时的分配策略
    pub allocation_policy: AllocationPolicy,
    /// 批次浪费率超过此值时标记告警
    pub waste_warning_pct: f64,
    /// 数量比较容差
    pub quantity_epsilon: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            allocation_policy: AllocationPolicy::Sequential,
            waste_warning_pct: DEFAULT_WASTE_WARNING_PCT,
            quantity_epsilon: DEFAULT_QUANTITY_EPSILON,
        }
    }
}

// ==========================================
// LoggingConfig - 日志参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter 指令（如 "info" / "batch_production_aps=debug"）
    pub level: String,
    /// 是否输出 JSON 行格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
