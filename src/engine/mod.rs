// ==========================================
// 小批量生产排产系统 - 引擎层
// ==========================================
// 职责: 批次计算、组合分解、FIFO 扣减、生产/组装记录、快照、可行性评估
// 红线: 检查类接口返回结构化结果，提交类接口遇违规即报错
// 红线: 带 tx 参数的操作在调用方事务内执行且不自行提交
// ==========================================

pub mod assembly_recorder;
pub mod batch_calculator;
pub mod bundle_decomposer;
pub mod error;
pub mod feasibility;
pub mod fifo_ledger;
pub mod production_recorder;
pub mod snapshot_store;
pub mod unit_conversion;

// 重导出核心引擎
pub use assembly_recorder::{
    AssemblyCheck, AssemblyOutcome, AssemblyRecorder, AssemblyRequest, PackagingRequirement,
    UnitRequirement,
};
pub use batch_calculator::{calculate_batches, calculate_waste, plan_batches, BatchPlan, WasteMetrics};
pub use bundle_decomposer::{
    BomReader, BundleDecomposer, ExplodedBundle, IngredientRequirement, RecipeBatchResult,
    SqliteBomReader, UnassignedPackaging,
};
pub use error::{PlanningError, PlanningResult, Shortfall};
pub use feasibility::{
    AssemblyFeasibility, AssemblyTarget, AssignmentBlocker, BlockerSubject, CostBlocker,
    FeasibilityService, InventoryBlocker, ProductionFeasibility, ProductionTarget,
};
pub use fifo_ledger::{plan_fifo_draws, FifoLedger};
pub use production_recorder::{
    IngredientCheck, ProductionCheck, ProductionOutcome, ProductionRecorder, ProductionRequest,
    RunWithConsumption,
};
pub use snapshot_store::{RestoredRecipe, SnapshotStore};
pub use unit_conversion::{FactorTableConverter, UnitConversionError, UnitConverter};
