// ==========================================
// 小批量生产排产系统 - 组装记录器
// ==========================================
// 红线: 嵌套组合先经分解引擎展开，再扣减叶子成品与包装
// 红线: 成品单元消耗与包装消耗分表记录
// ==========================================
// 流程: Requested -> Checked -> Consuming -> Committed
//       任一阶段失败 -> RolledBack（调用方事务内为 Failed）
// ==========================================

use crate::config::planner_config::ROUNDING_RELATIVE_TOLERANCE;
use crate::config::PlannerConfig;
use crate::db::with_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::assembly::{AssemblyPackagingConsumption, AssemblyRun, AssemblyUnitConsumption};
use crate::domain::types::RecorderPhase;
use crate::engine::bundle_decomposer::{BundleDecomposer, SqliteBomReader, UnassignedPackaging};
use crate::engine::error::{PlanningError, PlanningResult, Shortfall};
use crate::engine::fifo_ledger::FifoLedger;
use crate::engine::unit_conversion::UnitConverter;
use crate::repository::row_utils::now_ts;
use crate::repository::{
    ActionLogRepository, AssemblyRunRepository, FinishedGoodsRepository, InventoryRepository,
    ProductionRunRepository,
};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

// ==========================================
// 请求 / 结果结构
// ==========================================

/// 组装请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRequest {
    pub good_id: String,
    pub quantity: i64,
    pub notes: Option<String>,
    pub actor: String,
}

/// 成品单元需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRequirement {
    pub unit_id: String,
    pub unit_name: String,
    pub needed: i64,
    pub available: i64,
    pub unit_cost: Option<f64>, // 最近一次生产的单位成本
}

/// 包装需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingRequirement {
    pub item_id: String,
    pub item_name: String,
    pub needed: f64,
    pub available: f64,
    pub unit: String,
    pub estimated_cost: f64,
    pub missing_cost: bool,
}

/// 组装可行性检查（不修改任何状态）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyCheck {
    pub good_id: String,
    pub quantity: i64,
    pub units: Vec<UnitRequirement>,
    pub packaging: Vec<PackagingRequirement>,
    pub unassigned_packaging: Vec<UnassignedPackaging>,
    pub shortfalls: Vec<Shortfall>,
    pub can_assemble: bool,
}

impl AssemblyCheck {
    pub fn has_missing_cost(&self) -> bool {
        self.units.iter().any(|u| u.unit_cost.is_none()) || self.packaging.iter().any(|p| p.missing_cost)
    }
}

/// 组装记录结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyOutcome {
    pub run: AssemblyRun,
    pub unit_consumption: Vec<AssemblyUnitConsumption>,
    pub packaging_consumption: Vec<AssemblyPackagingConsumption>,
    pub phase: RecorderPhase,
}

/// 成品单元需求取整（容差内贴近且不少于需求时取该整数，否则向上取整）
pub(crate) fn whole_units(quantity: f64, epsilon: f64) -> i64 {
    let nearest = quantity.round();
    let covers = nearest >= quantity * (1.0 - ROUNDING_RELATIVE_TOLERANCE);
    if (quantity - nearest).abs() <= epsilon && covers {
        nearest as i64
    } else {
        quantity.ceil() as i64
    }
}

// ==========================================
// AssemblyRecorder - 组装记录器
// ==========================================
pub struct AssemblyRecorder {
    conn: Arc<Mutex<Connection>>,
    converter: Arc<dyn UnitConverter>,
    config: PlannerConfig,
}

impl AssemblyRecorder {
    pub fn new(conn: Arc<Mutex<Connection>>, converter: Arc<dyn UnitConverter>, config: PlannerConfig) -> Self {
        Self { conn, converter, config }
    }

    /// 组装可行性检查（试算）
    pub fn check_can_assemble(
        &self,
        good_id: &str,
        quantity: i64,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<AssemblyCheck> {
        with_transaction(&self.conn, tx, |tx| {
            Self::check_can_assemble_tx(tx, self.converter.as_ref(), &self.config, good_id, quantity)
        })
    }

    #[instrument(skip(tx, converter, config))]
    pub fn check_can_assemble_tx(
        tx: &Transaction<'_>,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        good_id: &str,
        quantity: i64,
    ) -> PlanningResult<AssemblyCheck> {
        if quantity <= 0 {
            return Err(PlanningError::Validation(format!(
                "组装数量必须大于 0: {}",
                quantity
            )));
        }

        let reader = SqliteBomReader::new(tx);
        let decomposer = BundleDecomposer::new(&reader, config.clone());
        let exploded = decomposer.explode_full(good_id, quantity as f64)?;

        let mut shortfalls = Vec::new();

        let mut units = Vec::with_capacity(exploded.units.len());
        for (unit_id, qty) in &exploded.units {
            let unit = FinishedGoodsRepository::find_unit_in(tx, unit_id)?
                .ok_or_else(|| PlanningError::not_found("FinishedUnit", unit_id))?;
            let needed = whole_units(*qty, config.quantity_epsilon);
            if unit.inventory_count < needed {
                shortfalls.push(Shortfall {
                    item_id: unit.unit_id.clone(),
                    item_name: unit.name.clone(),
                    needed: needed as f64,
                    available: unit.inventory_count as f64,
                    unit: "each".to_string(),
                });
            }
            units.push(UnitRequirement {
                unit_id: unit.unit_id,
                unit_name: unit.name,
                needed,
                available: unit.inventory_count,
                unit_cost: ProductionRunRepository::latest_unit_cost_in(tx, unit_id)?,
            });
        }

        let mut packaging = Vec::with_capacity(exploded.packaging.len());
        for (item_id, qty) in &exploded.packaging {
            let item = InventoryRepository::find_item_in(tx, item_id)?
                .ok_or_else(|| PlanningError::not_found("InventoryItem", item_id))?;
            let dry = FifoLedger::consume_tx(tx, converter, config, item_id, *qty, &item.base_unit, true)?;
            let available = FifoLedger::available_quantity_in(tx, converter, item_id, &item.base_unit)?;
            if !dry.satisfied {
                shortfalls.push(Shortfall {
                    item_id: item.item_id.clone(),
                    item_name: item.name.clone(),
                    needed: *qty,
                    available,
                    unit: item.base_unit.clone(),
                });
            }
            packaging.push(PackagingRequirement {
                item_id: item.item_id,
                item_name: item.name,
                needed: *qty,
                available,
                unit: item.base_unit,
                estimated_cost: dry.total_cost,
                missing_cost: dry.missing_cost,
            });
        }

        let can_assemble = shortfalls.is_empty() && exploded.unassigned_packaging.is_empty();
        Ok(AssemblyCheck {
            good_id: good_id.to_string(),
            quantity,
            units,
            packaging,
            unassigned_packaging: exploded.unassigned_packaging,
            shortfalls,
            can_assemble,
        })
    }

    /// 记录一次组装（原子操作）
    pub fn record_assembly(
        &self,
        request: &AssemblyRequest,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<AssemblyOutcome> {
        let result = with_transaction(&self.conn, tx, |tx| {
            Self::record_assembly_tx(tx, self.converter.as_ref(), &self.config, request)
        });
        if let Err(e) = &result {
            let phase = RecorderPhase::after_failure(tx.is_none());
            if phase == RecorderPhase::RolledBack {
                warn!(phase = %phase, good_id = %request.good_id, error = %e, "组装记录失败，已回滚");
            } else {
                warn!(phase = %phase, good_id = %request.good_id, error = %e, "组装记录在调用方事务内失败");
            }
        }
        result
    }

    #[instrument(skip_all, fields(good_id = %request.good_id, quantity = request.quantity))]
    pub fn record_assembly_tx(
        tx: &Transaction<'_>,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        request: &AssemblyRequest,
    ) -> PlanningResult<AssemblyOutcome> {
        debug!(phase = %RecorderPhase::Requested, "组装请求");

        let good = FinishedGoodsRepository::find_good_in(tx, &request.good_id)?
            .ok_or_else(|| PlanningError::not_found("FinishedGood", &request.good_id))?;

        // ===== Checked =====
        let check = Self::check_can_assemble_tx(tx, converter, config, &good.good_id, request.quantity)?;
        if let Some(slot) = check.unassigned_packaging.first() {
            return Err(PlanningError::Validation(format!(
                "组合 {} 存在未指派的包装位 {}（共 {} 处）",
                slot.good_id,
                slot.composition_id,
                check.unassigned_packaging.len()
            )));
        }
        if !check.shortfalls.is_empty() {
            return Err(PlanningError::InsufficientInventory {
                shortfalls: check.shortfalls,
            });
        }
        debug!(phase = %RecorderPhase::Checked, "库存复核通过");

        // ===== Consuming =====
        debug!(phase = %RecorderPhase::Consuming, "开始扣减成品单元与包装");
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut total_cost = 0.0;

        let mut unit_consumption = Vec::with_capacity(check.units.len());
        for req in &check.units {
            if !FinishedGoodsRepository::decrement_unit_count_tx(tx, &req.unit_id, req.needed)? {
                return Err(PlanningError::InsufficientInventory {
                    shortfalls: vec![Shortfall {
                        item_id: req.unit_id.clone(),
                        item_name: req.unit_name.clone(),
                        needed: req.needed as f64,
                        available: req.available as f64,
                        unit: "each".to_string(),
                    }],
                });
            }
            let unit_cost = match req.unit_cost {
                Some(c) => c,
                None => {
                    warn!(unit_id = %req.unit_id, "成品单元缺少生产成本，按 0 计");
                    0.0
                }
            };
            let line_cost = unit_cost * req.needed as f64;
            total_cost += line_cost;
            unit_consumption.push(AssemblyUnitConsumption {
                record_id: uuid::Uuid::new_v4().to_string(),
                run_id: run_id.clone(),
                finished_unit_id: req.unit_id.clone(),
                quantity: req.needed,
                unit_cost,
                total_cost: line_cost,
            });
        }

        let mut packaging_consumption = Vec::with_capacity(check.packaging.len());
        for req in &check.packaging {
            let result = FifoLedger::consume_tx(tx, converter, config, &req.item_id, req.needed, &req.unit, false)?;
            if !result.satisfied {
                return Err(PlanningError::InsufficientInventory {
                    shortfalls: vec![Shortfall {
                        item_id: req.item_id.clone(),
                        item_name: req.item_name.clone(),
                        needed: req.needed,
                        available: result.consumed,
                        unit: req.unit.clone(),
                    }],
                });
            }
            total_cost += result.total_cost;
            packaging_consumption.push(AssemblyPackagingConsumption {
                record_id: uuid::Uuid::new_v4().to_string(),
                run_id: run_id.clone(),
                item_id: req.item_id.clone(),
                quantity: result.consumed,
                unit: req.unit.clone(),
                total_cost: result.total_cost,
            });
        }

        FinishedGoodsRepository::increment_good_count_tx(tx, &good.good_id, request.quantity)?;

        let run = AssemblyRun {
            run_id: run_id.clone(),
            good_id: good.good_id.clone(),
            quantity: request.quantity,
            total_cost,
            per_unit_cost: total_cost / request.quantity as f64,
            assembled_at: now_ts(),
            notes: request.notes.clone(),
        };
        AssemblyRunRepository::insert_run_tx(tx, &run)?;
        for record in &unit_consumption {
            AssemblyRunRepository::insert_unit_consumption_tx(tx, record)?;
        }
        for record in &packaging_consumption {
            AssemblyRunRepository::insert_packaging_consumption_tx(tx, record)?;
        }

        let log = ActionLog::now(
            ActionType::RecordAssembly,
            &request.actor,
            Some(json!({
                "run_id": run.run_id,
                "good_id": run.good_id,
                "quantity": run.quantity,
                "total_cost": run.total_cost,
                "unit_lines": unit_consumption.len(),
                "packaging_lines": packaging_consumption.len(),
            })),
            request.notes.clone(),
        );
        ActionLogRepository::insert_tx(tx, &log)?;

        info!(
            phase = %RecorderPhase::Committed,
            run_id = %run.run_id,
            total_cost = run.total_cost,
            "组装记录完成"
        );

        Ok(AssemblyOutcome {
            run,
            unit_consumption,
            packaging_consumption,
            phase: RecorderPhase::Committed,
        })
    }
}
