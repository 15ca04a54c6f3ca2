// ==========================================
// 小批量生产排产系统 - 引擎层错误类型
// ==========================================
// 红线: 短缺类错误必须携带具体物料、需求量、可用量
// 检查/试算接口返回结构化结果，提交类接口遇违规即报错
// ==========================================

use crate::engine::unit_conversion::UnitConversionError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 单项短缺明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortfall {
    pub item_id: String,
    pub item_name: String,
    pub needed: f64,
    pub available: f64,
    pub unit: String,
}

impl Shortfall {
    pub fn missing(&self) -> f64 {
        (self.needed - self.available).max(0.0)
    }
}

impl fmt::Display for Shortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) 需求={} {} 可用={} {} 缺口={} {}",
            self.item_name,
            self.item_id,
            self.needed,
            self.unit,
            self.available,
            self.unit,
            self.missing(),
            self.unit
        )
    }
}

fn join_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum PlanningError {
    /// 非法输入（如批次数非正、产量非正）
    #[error("输入校验失败: {0}")]
    Validation(String),

    /// FIFO 库存不足
    #[error("库存不足: {}", join_shortfalls(.shortfalls))]
    InsufficientInventory { shortfalls: Vec<Shortfall> },

    /// 单位不兼容
    #[error("单位换算失败: {quantity} {from} -> {to}")]
    UnitConversion { from: String, to: String, quantity: f64 },

    /// 配方 / 成品 / 物料不存在
    #[error("{entity}(id={id})不存在")]
    NotFound { entity: String, id: String },

    /// 组合结构错误（循环引用）
    #[error("结构错误: {message} (路径: {})", .path.join(" -> "))]
    Structural { message: String, path: Vec<String> },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PlanningError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        PlanningError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PlanningError {
    fn from(err: rusqlite::Error) -> Self {
        PlanningError::Repository(RepositoryError::from(err))
    }
}

impl From<UnitConversionError> for PlanningError {
    fn from(err: UnitConversionError) -> Self {
        PlanningError::UnitConversion {
            from: err.from,
            to: err.to,
            quantity: err.quantity,
        }
    }
}

/// Result 类型别名
pub type PlanningResult<T> = Result<T, PlanningError>;
