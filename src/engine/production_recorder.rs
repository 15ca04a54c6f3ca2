// ==========================================
// 小批量生产排产系统 - 生产记录器
// ==========================================
// 红线: 检查与扣减在同一事务内完成；任一步失败整体回滚
// 红线: 每次生产每种原料只写一行消耗记录（跨库存批次汇总）
// ==========================================
// 流程: Requested -> Checked -> Consuming -> Committed
//       任一阶段失败 -> RolledBack（调用方事务内为 Failed）
// ==========================================

use crate::config::PlannerConfig;
use crate::db::with_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::inventory::ConsumptionResult;
use crate::domain::production::{ConsumptionRecord, ProductionRun};
use crate::domain::types::RecorderPhase;
use crate::engine::bundle_decomposer::{BundleDecomposer, SqliteBomReader};
use crate::engine::error::{PlanningError, PlanningResult, Shortfall};
use crate::engine::fifo_ledger::FifoLedger;
use crate::engine::snapshot_store::SnapshotStore;
use crate::engine::unit_conversion::UnitConverter;
use crate::repository::row_utils::now_ts;
use crate::repository::{
    ActionLogRepository, FinishedGoodsRepository, ProductionRunRepository, RecipeRepository,
};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

// ==========================================
// 请求 / 结果结构
// ==========================================

/// 生产请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub recipe_id: String,
    pub finished_unit_id: String,
    pub batches: u32,
    pub actual_yield: i64,
    pub notes: Option<String>,
    pub actor: String,
}

/// 单项原料检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientCheck {
    pub item_id: String,
    pub item_name: String,
    pub needed: f64,
    pub available: f64,
    pub unit: String,
    pub shortfall: f64,
    pub estimated_cost: f64,
    pub missing_cost: bool,
}

/// 生产可行性检查（不修改任何状态）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCheck {
    pub recipe_id: String,
    pub batches: u32,
    pub ingredients: Vec<IngredientCheck>,
    pub shortfalls: Vec<Shortfall>,
    pub can_produce: bool,
    pub estimated_total_cost: f64,
    pub missing_cost: bool,
}

/// 生产记录结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionOutcome {
    pub run: ProductionRun,
    pub consumption: Vec<ConsumptionRecord>,
    pub lot_draws: Vec<ConsumptionResult>,
    pub phase: RecorderPhase,
}

/// 生产记录 + 消耗明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWithConsumption {
    pub run: ProductionRun,
    pub consumption: Vec<ConsumptionRecord>,
}

// ==========================================
// ProductionRecorder - 生产记录器
// ==========================================
pub struct ProductionRecorder {
    conn: Arc<Mutex<Connection>>,
    converter: Arc<dyn UnitConverter>,
    config: PlannerConfig,
}

impl ProductionRecorder {
    pub fn new(conn: Arc<Mutex<Connection>>, converter: Arc<dyn UnitConverter>, config: PlannerConfig) -> Self {
        Self { conn, converter, config }
    }

    /// 生产可行性检查（试算）
    pub fn check_can_produce(
        &self,
        recipe_id: &str,
        batches: u32,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<ProductionCheck> {
        with_transaction(&self.conn, tx, |tx| {
            Self::check_can_produce_tx(tx, self.converter.as_ref(), &self.config, recipe_id, batches)
        })
    }

    #[instrument(skip(tx, converter, config))]
    pub fn check_can_produce_tx(
        tx: &Transaction<'_>,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        recipe_id: &str,
        batches: u32,
    ) -> PlanningResult<ProductionCheck> {
        if batches == 0 {
            return Err(PlanningError::Validation("批次数必须大于 0".to_string()));
        }

        let reader = SqliteBomReader::new(tx);
        let decomposer = BundleDecomposer::new(&reader, config.clone());
        let requirements = decomposer.aggregate_recipe_ingredients(recipe_id, batches, converter)?;

        let mut ingredients = Vec::with_capacity(requirements.len());
        let mut shortfalls = Vec::new();
        let mut estimated_total_cost = 0.0;
        let mut missing_cost = false;

        for req in requirements {
            let dry = FifoLedger::consume_tx(tx, converter, config, &req.item_id, req.quantity, &req.unit, true)?;
            let available = FifoLedger::available_quantity_in(tx, converter, &req.item_id, &req.unit)?;

            if !dry.satisfied {
                shortfalls.push(Shortfall {
                    item_id: req.item_id.clone(),
                    item_name: req.item_name.clone(),
                    needed: req.quantity,
                    available,
                    unit: req.unit.clone(),
                });
            }
            estimated_total_cost += dry.total_cost;
            missing_cost |= dry.missing_cost;

            ingredients.push(IngredientCheck {
                item_id: req.item_id,
                item_name: req.item_name,
                needed: req.quantity,
                available,
                unit: req.unit,
                shortfall: dry.shortfall,
                estimated_cost: dry.total_cost,
                missing_cost: dry.missing_cost,
            });
        }

        Ok(ProductionCheck {
            recipe_id: recipe_id.to_string(),
            batches,
            ingredients,
            can_produce: shortfalls.is_empty(),
            shortfalls,
            estimated_total_cost,
            missing_cost,
        })
    }

    /// 记录一次生产（原子操作）
    pub fn record_production(
        &self,
        request: &ProductionRequest,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<ProductionOutcome> {
        let result = with_transaction(&self.conn, tx, |tx| {
            Self::record_production_tx(tx, self.converter.as_ref(), &self.config, request)
        });
        if let Err(e) = &result {
            let phase = RecorderPhase::after_failure(tx.is_none());
            if phase == RecorderPhase::RolledBack {
                warn!(phase = %phase, recipe_id = %request.recipe_id, error = %e, "生产记录失败，已回滚");
            } else {
                warn!(phase = %phase, recipe_id = %request.recipe_id, error = %e, "生产记录在调用方事务内失败");
            }
        }
        result
    }

    #[instrument(skip_all, fields(recipe_id = %request.recipe_id, batches = request.batches))]
    pub fn record_production_tx(
        tx: &Transaction<'_>,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        request: &ProductionRequest,
    ) -> PlanningResult<ProductionOutcome> {
        debug!(phase = %RecorderPhase::Requested, "生产请求");

        // ===== 输入校验 =====
        if request.batches == 0 {
            return Err(PlanningError::Validation("批次数必须大于 0".to_string()));
        }
        if request.actual_yield <= 0 {
            return Err(PlanningError::Validation(format!(
                "实际产量必须大于 0: {}",
                request.actual_yield
            )));
        }

        let recipe = RecipeRepository::find_by_id_in(tx, &request.recipe_id)?
            .ok_or_else(|| PlanningError::not_found("Recipe", &request.recipe_id))?;
        let unit = FinishedGoodsRepository::find_unit_in(tx, &request.finished_unit_id)?
            .ok_or_else(|| PlanningError::not_found("FinishedUnit", &request.finished_unit_id))?;
        if unit.recipe_id.as_deref() != Some(recipe.recipe_id.as_str()) {
            return Err(PlanningError::Validation(format!(
                "成品单元 {} 不由配方 {} 产出",
                unit.unit_id, recipe.recipe_id
            )));
        }

        // ===== Checked: 同一事务内复核库存 =====
        let check = Self::check_can_produce_tx(tx, converter, config, &request.recipe_id, request.batches)?;
        if !check.can_produce {
            return Err(PlanningError::InsufficientInventory {
                shortfalls: check.shortfalls,
            });
        }
        debug!(phase = %RecorderPhase::Checked, ingredients = check.ingredients.len(), "库存复核通过");

        // ===== Consuming =====
        debug!(phase = %RecorderPhase::Consuming, "开始扣减原料");
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut lot_draws = Vec::with_capacity(check.ingredients.len());
        let mut consumption = Vec::with_capacity(check.ingredients.len());
        let mut total_cost = 0.0;

        for ing in &check.ingredients {
            let result = FifoLedger::consume_tx(tx, converter, config, &ing.item_id, ing.needed, &ing.unit, false)?;
            if !result.satisfied {
                return Err(PlanningError::InsufficientInventory {
                    shortfalls: vec![Shortfall {
                        item_id: ing.item_id.clone(),
                        item_name: ing.item_name.clone(),
                        needed: ing.needed,
                        available: result.consumed,
                        unit: ing.unit.clone(),
                    }],
                });
            }
            total_cost += result.total_cost;
            consumption.push(ConsumptionRecord {
                record_id: uuid::Uuid::new_v4().to_string(),
                run_id: run_id.clone(),
                item_id: ing.item_id.clone(),
                quantity: result.consumed,
                unit: ing.unit.clone(),
                total_cost: result.total_cost,
            });
            lot_draws.push(result);
        }

        FinishedGoodsRepository::increment_unit_count_tx(tx, &unit.unit_id, request.actual_yield)?;

        let snapshot = SnapshotStore::create_snapshot_tx(tx, &recipe.recipe_id, false, None)?;

        let run = ProductionRun {
            run_id: run_id.clone(),
            recipe_id: recipe.recipe_id.clone(),
            finished_unit_id: unit.unit_id.clone(),
            snapshot_id: Some(snapshot.snapshot_id.clone()),
            batches: request.batches,
            expected_yield: request.batches as f64 * recipe.yield_quantity,
            actual_yield: request.actual_yield,
            total_cost,
            per_unit_cost: total_cost / request.actual_yield as f64,
            produced_at: now_ts(),
            notes: request.notes.clone(),
        };
        ProductionRunRepository::insert_run_tx(tx, &run)?;
        for record in &consumption {
            ProductionRunRepository::insert_consumption_tx(tx, record)?;
        }

        let log = ActionLog::now(
            ActionType::RecordProduction,
            &request.actor,
            Some(json!({
                "run_id": run.run_id,
                "recipe_id": run.recipe_id,
                "finished_unit_id": run.finished_unit_id,
                "batches": run.batches,
                "actual_yield": run.actual_yield,
                "total_cost": run.total_cost,
                "snapshot_id": snapshot.snapshot_id,
            })),
            request.notes.clone(),
        );
        ActionLogRepository::insert_tx(tx, &log)?;

        info!(
            phase = %RecorderPhase::Committed,
            run_id = %run.run_id,
            total_cost = run.total_cost,
            per_unit_cost = run.per_unit_cost,
            "生产记录完成"
        );

        Ok(ProductionOutcome {
            run,
            consumption,
            lot_draws,
            phase: RecorderPhase::Committed,
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 配方的生产记录（最新在前）
    pub fn list_runs_for_recipe(&self, recipe_id: &str) -> PlanningResult<Vec<ProductionRun>> {
        Ok(ProductionRunRepository::new(self.conn.clone()).list_for_recipe(recipe_id)?)
    }

    /// 生产记录 + 原料消耗
    pub fn get_run_with_consumption(&self, run_id: &str) -> PlanningResult<RunWithConsumption> {
        let repo = ProductionRunRepository::new(self.conn.clone());
        let run = repo
            .find_by_id(run_id)?
            .ok_or_else(|| PlanningError::not_found("ProductionRun", run_id))?;
        let consumption = repo.list_consumption(run_id)?;
        Ok(RunWithConsumption { run, consumption })
    }
}
