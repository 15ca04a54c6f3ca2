// ==========================================
// 小批量生产排产系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 CLI / 界面层调用
// ==========================================

pub mod error;
pub mod planning_api;
pub mod selection_context;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use planning_api::{BundlePlan, PlanningApi, ProduceAndAssembleOutcome, ProduceAndAssembleRequest};
pub use selection_context::SelectionContext;
