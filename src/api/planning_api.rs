// ==========================================
// 小批量生产排产系统 - 排产计划 API
// ==========================================
// 职责: 供 CLI / 界面层调用的统一入口
// 红线: 多步工作流在同一事务内执行，任一步失败整体回滚
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::PlannerConfig;
use crate::db::with_transaction;
use crate::domain::action_log::ActionLog;
use crate::domain::inventory::ConsumptionResult;
use crate::domain::production::ProductionRun;
use crate::domain::snapshot::{BackfillReport, SnapshotStaleness};
use crate::domain::types::RecorderPhase;
use crate::engine::{
    plan_batches, AssemblyCheck, AssemblyFeasibility, AssemblyOutcome, AssemblyRecorder,
    AssemblyRequest, AssemblyTarget, BatchPlan, BundleDecomposer, ExplodedBundle,
    FeasibilityService, FifoLedger, PlanningError, ProductionCheck, ProductionFeasibility,
    ProductionOutcome, ProductionRecorder, ProductionRequest, ProductionTarget, RecipeBatchResult,
    RestoredRecipe, RunWithConsumption, SnapshotStore, SqliteBomReader, UnitConverter,
};
use crate::repository::ActionLogRepository;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// 生产 + 组装 组合工作流请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceAndAssembleRequest {
    pub productions: Vec<ProductionRequest>,
    pub assembly: AssemblyRequest,
}

/// 组合工作流结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceAndAssembleOutcome {
    pub productions: Vec<ProductionOutcome>,
    pub assembly: AssemblyOutcome,
}

/// 组合商品的生产计划（分解 + 按配方批次）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlePlan {
    pub good_id: String,
    pub quantity: f64,
    pub exploded: ExplodedBundle,
    pub recipes: Vec<RecipeBatchResult>,
}

// ==========================================
// PlanningApi - 排产计划 API
// ==========================================
pub struct PlanningApi {
    conn: Arc<Mutex<Connection>>,
    config: PlannerConfig,
    ledger: FifoLedger,
    production: ProductionRecorder,
    assembly: AssemblyRecorder,
    feasibility: FeasibilityService,
    snapshots: SnapshotStore,
    action_log_repo: ActionLogRepository,
}

impl PlanningApi {
    /// 创建 PlanningApi
    ///
    /// # 参数
    /// - conn: 共享数据库连接
    /// - converter: 单位换算服务
    /// - config: 引擎参数
    pub fn new(conn: Arc<Mutex<Connection>>, converter: Arc<dyn UnitConverter>, config: PlannerConfig) -> Self {
        Self {
            ledger: FifoLedger::new(conn.clone(), converter.clone(), config.clone()),
            production: ProductionRecorder::new(conn.clone(), converter.clone(), config.clone()),
            assembly: AssemblyRecorder::new(conn.clone(), converter.clone(), config.clone()),
            feasibility: FeasibilityService::new(conn.clone(), converter, config.clone()),
            snapshots: SnapshotStore::new(conn.clone()),
            action_log_repo: ActionLogRepository::new(conn.clone()),
            conn,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // ==========================================
    // 计划计算
    // ==========================================

    pub fn plan_batches(&self, units_needed: f64, yield_per_batch: f64) -> ApiResult<BatchPlan> {
        Ok(plan_batches(units_needed, yield_per_batch, self.config.quantity_epsilon)?)
    }

    /// 组合商品 -> 成品单元需求 -> 按配方批次
    pub fn plan_bundle(&self, good_id: &str, quantity: f64) -> ApiResult<BundlePlan> {
        let config = self.config.clone();
        let plan = with_transaction(&self.conn, None, |tx| {
            let reader = SqliteBomReader::new(tx);
            let decomposer = BundleDecomposer::new(&reader, config);
            let exploded = decomposer.explode_full(good_id, quantity)?;
            let recipes = decomposer.aggregate_by_recipe(&exploded.units)?;
            Ok::<_, PlanningError>(BundlePlan {
                good_id: good_id.to_string(),
                quantity,
                exploded,
                recipes,
            })
        })?;
        Ok(plan)
    }

    pub fn consume_inventory(
        &self,
        item_id: &str,
        quantity: f64,
        unit: &str,
        dry_run: bool,
    ) -> ApiResult<ConsumptionResult> {
        Ok(self.ledger.consume(item_id, quantity, unit, dry_run, None)?)
    }

    // ==========================================
    // 生产 / 组装
    // ==========================================

    pub fn check_can_produce(&self, recipe_id: &str, batches: u32) -> ApiResult<ProductionCheck> {
        Ok(self.production.check_can_produce(recipe_id, batches, None)?)
    }

    pub fn record_production(&self, request: &ProductionRequest) -> ApiResult<ProductionOutcome> {
        if request.actor.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(self.production.record_production(request, None)?)
    }

    pub fn check_can_assemble(&self, good_id: &str, quantity: i64) -> ApiResult<AssemblyCheck> {
        Ok(self.assembly.check_can_assemble(good_id, quantity, None)?)
    }

    pub fn record_assembly(&self, request: &AssemblyRequest) -> ApiResult<AssemblyOutcome> {
        if request.actor.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(self.assembly.record_assembly(request, None)?)
    }

    /// 先完成若干生产，再组装（同一事务）
    #[instrument(skip_all, fields(productions = request.productions.len(), good_id = %request.assembly.good_id))]
    pub fn produce_and_assemble(&self, request: &ProduceAndAssembleRequest) -> ApiResult<ProduceAndAssembleOutcome> {
        let outcome = with_transaction(&self.conn, None, |tx| {
            let mut productions = Vec::with_capacity(request.productions.len());
            for step in &request.productions {
                productions.push(self.production.record_production(step, Some(tx))?);
            }
            let assembly = self.assembly.record_assembly(&request.assembly, Some(tx))?;
            Ok::<_, PlanningError>(ProduceAndAssembleOutcome { productions, assembly })
        })
        .map_err(|e| {
            warn!(phase = %RecorderPhase::RolledBack, error = %e, "组合工作流失败，已整体回滚");
            e
        })?;

        info!(
            productions = outcome.productions.len(),
            assembly_run = %outcome.assembly.run.run_id,
            "组合工作流提交完成"
        );
        Ok(outcome)
    }

    // ==========================================
    // 可行性
    // ==========================================

    pub fn assess_assembly_targets(&self, targets: &[AssemblyTarget]) -> ApiResult<Vec<AssemblyFeasibility>> {
        Ok(self.feasibility.assess_assembly_targets(targets, None)?)
    }

    pub fn assess_production_targets(&self, targets: &[ProductionTarget]) -> ApiResult<Vec<ProductionFeasibility>> {
        Ok(self.feasibility.assess_production_targets(targets, None)?)
    }

    // ==========================================
    // 快照
    // ==========================================

    pub fn check_snapshot_staleness(&self, snapshot_id: &str) -> ApiResult<SnapshotStaleness> {
        Ok(self.snapshots.check_staleness(snapshot_id, None)?)
    }

    pub fn backfill_snapshots(&self, actor: &str) -> ApiResult<BackfillReport> {
        Ok(self.snapshots.backfill_missing_snapshots(actor, None)?)
    }

    pub fn restore_recipe_from_snapshot(
        &self,
        snapshot_id: &str,
        new_name: &str,
        actor: &str,
    ) -> ApiResult<RestoredRecipe> {
        Ok(self.snapshots.restore_as_new_recipe(snapshot_id, new_name, actor, None)?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn list_runs_for_recipe(&self, recipe_id: &str) -> ApiResult<Vec<ProductionRun>> {
        Ok(self.production.list_runs_for_recipe(recipe_id)?)
    }

    pub fn get_run_with_consumption(&self, run_id: &str) -> ApiResult<RunWithConsumption> {
        Ok(self.production.get_run_with_consumption(run_id)?)
    }

    pub fn recent_actions(&self, limit: i32) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.find_recent(limit)?)
    }
}
