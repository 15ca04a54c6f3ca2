// ==========================================
// 小批量生产排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、结果对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod assembly;
pub mod finished;
pub mod inventory;
pub mod production;
pub mod recipe;
pub mod snapshot;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use assembly::{AssemblyPackagingConsumption, AssemblyRun, AssemblyUnitConsumption};
pub use finished::{Composition, FinishedGood, FinishedUnit};
pub use inventory::{ConsumptionResult, InventoryLot, LotDraw};
pub use production::{ConsumptionRecord, ProductionRun};
pub use recipe::{InventoryItem, Recipe, RecipeComponent, RecipeIngredient};
pub use snapshot::{
    BackfillReport, BackfilledRun, RecipeSnapshot, SnapshotComponent, SnapshotIngredient,
    SnapshotPayload, SnapshotRecipe, SnapshotStaleness,
};
pub use types::{AllocationPolicy, AssemblyStatus, ComponentKind, RecorderPhase};
