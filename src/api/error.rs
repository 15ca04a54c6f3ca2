// ==========================================
// 小批量生产排产系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把引擎/仓储错误转换为用户可读的错误
// 红线: 短缺类错误必须保留物料、需求量、可用量明细
// ==========================================

use crate::engine::error::{PlanningError, Shortfall};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("库存不足: {message}")]
    InsufficientInventory {
        message: String,
        shortfalls: Vec<Shortfall>,
    },

    #[error("单位无法换算: {0}")]
    UnitConversion(String),

    #[error("组合结构错误: {0}")]
    StructuralError(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("检查约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 PlanningError 转换
// ==========================================
impl From<PlanningError> for ApiError {
    fn from(err: PlanningError) -> Self {
        match err {
            PlanningError::Validation(msg) => ApiError::InvalidInput(msg),
            PlanningError::InsufficientInventory { shortfalls } => {
                let message = shortfalls
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                ApiError::InsufficientInventory { message, shortfalls }
            }
            e @ PlanningError::UnitConversion { .. } => ApiError::UnitConversion(e.to_string()),
            PlanningError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            e @ PlanningError::Structural { .. } => ApiError::StructuralError(e.to_string()),
            PlanningError::Repository(repo) => ApiError::from(repo),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortfall_details_survive_mapping() {
        let err = PlanningError::InsufficientInventory {
            shortfalls: vec![Shortfall {
                item_id: "flour".to_string(),
                item_name: "Flour".to_string(),
                needed: 500.0,
                available: 320.0,
                unit: "g".to_string(),
            }],
        };
        match ApiError::from(err) {
            ApiError::InsufficientInventory { message, shortfalls } => {
                assert!(message.contains("Flour"));
                assert!(message.contains("500"));
                assert!(message.contains("320"));
                assert_eq!(shortfalls.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_not_found_mapping() {
        let err = PlanningError::not_found("Recipe", "r-1");
        assert!(matches!(ApiError::from(err), ApiError::NotFound(msg) if msg.contains("r-1")));
    }
}
