// ==========================================
// 小批量生产排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 事务: 带锁方法供独立调用；*_tx / *_in 关联函数供事务作用域内调用
// ==========================================

pub mod action_log_repo;
pub mod assembly_repo;
pub mod error;
pub mod finished_repo;
pub mod inventory_repo;
pub mod production_repo;
pub mod recipe_repo;
pub mod row_utils;
pub mod snapshot_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use assembly_repo::AssemblyRunRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use finished_repo::FinishedGoodsRepository;
pub use inventory_repo::InventoryRepository;
pub use production_repo::ProductionRunRepository;
pub use recipe_repo::RecipeRepository;
pub use snapshot_repo::RecipeSnapshotRepository;
