// ==========================================
// 小批量生产排产系统 - 可行性评估服务
// ==========================================
// 红线: 阻塞原因分三类（库存 / 成本 / 指派），不得合并为一个列表
// 红线: 只读评估，不修改任何状态
// ==========================================
// 多目标竞争同一库存: 按目标列表顺序（固定优先级）处理
// - Sequential: 前序目标按 min(目标数, 可组装数) 预留组件，后序目标只看剩余
// - Independent: 每个目标独立面对全部库存
// ==========================================

use crate::config::planner_config::ROUNDING_RELATIVE_TOLERANCE;
use crate::config::PlannerConfig;
use crate::db::with_transaction;
use crate::domain::types::{AllocationPolicy, AssemblyStatus};
use crate::engine::bundle_decomposer::{BundleDecomposer, SqliteBomReader};
use crate::engine::error::{PlanningError, PlanningResult};
use crate::engine::fifo_ledger::FifoLedger;
use crate::engine::unit_conversion::UnitConverter;
use crate::repository::{
    FinishedGoodsRepository, InventoryRepository, ProductionRunRepository, RecipeRepository,
};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

// ==========================================
// 输入 / 输出结构
// ==========================================

/// 组装目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyTarget {
    pub good_id: String,
    pub target_quantity: i64,
    /// 上游生产是否已全部完成（决定 0 可组装时的状态）
    pub upstream_production_complete: bool,
}

/// 生产目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionTarget {
    pub recipe_id: String,
    pub batches: u32,
}

/// 阻塞对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerSubject {
    FinishedUnit,
    InventoryItem,
}

/// 库存阻塞
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryBlocker {
    pub subject: BlockerSubject,
    pub subject_id: String,
    pub subject_name: String,
    pub per_target: f64, // 每个组合 / 每批次用量
    pub needed: f64,
    pub available: f64,
    pub unit: String,
}

/// 成本阻塞（缺少成本数据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBlocker {
    pub subject: BlockerSubject,
    pub subject_id: String,
    pub subject_name: String,
    pub reason: String,
}

/// 指派阻塞（未指派包装位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentBlocker {
    pub good_id: String,
    pub composition_id: String,
    pub quantity: f64,
    pub reason: String,
}

/// 组装目标评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyFeasibility {
    pub good_id: String,
    pub good_name: String,
    pub target_quantity: i64,
    pub can_assemble: i64,
    pub status: AssemblyStatus,
    pub limiting_component: Option<String>,
    pub inventory_blockers: Vec<InventoryBlocker>,
    pub cost_blockers: Vec<CostBlocker>,
    pub assignment_blockers: Vec<AssignmentBlocker>,
}

/// 生产目标评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionFeasibility {
    pub recipe_id: String,
    pub recipe_name: String,
    pub batches: u32,
    pub max_batches: u32,
    pub can_produce: bool,
    pub inventory_blockers: Vec<InventoryBlocker>,
    pub cost_blockers: Vec<CostBlocker>,
}

/// 预留池键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Unit(String),
    Item(String, String), // (item_id, 基础单位)
}

/// floor(available / per)，容差内贴近整数且不超出库存时取该整数
fn whole_ratio(available: f64, per: f64, epsilon: f64) -> i64 {
    if per <= 0.0 || available <= 0.0 {
        return 0;
    }
    let ratio = available / per;
    let nearest = ratio.round();
    let within_stock = nearest * per <= available * (1.0 + ROUNDING_RELATIVE_TOLERANCE);
    if (ratio - nearest).abs() <= epsilon && within_stock {
        nearest as i64
    } else {
        ratio.floor() as i64
    }
}

// ==========================================
// FeasibilityService - 可行性评估服务
// ==========================================
pub struct FeasibilityService {
    conn: Arc<Mutex<Connection>>,
    converter: Arc<dyn UnitConverter>,
    config: PlannerConfig,
}

impl FeasibilityService {
    pub fn new(conn: Arc<Mutex<Connection>>, converter: Arc<dyn UnitConverter>, config: PlannerConfig) -> Self {
        Self { conn, converter, config }
    }

    /// 组装目标评估
    pub fn assess_assembly_targets(
        &self,
        targets: &[AssemblyTarget],
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<Vec<AssemblyFeasibility>> {
        with_transaction(&self.conn, tx, |tx| {
            Self::assess_assembly_targets_in(tx, self.converter.as_ref(), &self.config, targets)
        })
    }

    #[instrument(skip_all, fields(targets = targets.len(), policy = %config.allocation_policy))]
    pub fn assess_assembly_targets_in(
        conn: &Connection,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        targets: &[AssemblyTarget],
    ) -> PlanningResult<Vec<AssemblyFeasibility>> {
        let eps = config.quantity_epsilon;
        let reader = SqliteBomReader::new(conn);
        let decomposer = BundleDecomposer::new(&reader, config.clone());
        let mut reserved: HashMap<PoolKey, f64> = HashMap::new();
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            if target.target_quantity < 0 {
                return Err(PlanningError::Validation(format!(
                    "目标数量不能为负: {}",
                    target.target_quantity
                )));
            }
            let good = FinishedGoodsRepository::find_good_in(conn, &target.good_id)?
                .ok_or_else(|| PlanningError::not_found("FinishedGood", &target.good_id))?;
            let per_bundle = decomposer.explode_full(&target.good_id, 1.0)?;

            let mut inventory_blockers = Vec::new();
            let mut cost_blockers = Vec::new();
            // (键, 每组合用量, 剩余可用, 名称)
            let mut components: Vec<(PoolKey, f64, f64, String)> = Vec::new();

            for (unit_id, per) in &per_bundle.units {
                let unit = FinishedGoodsRepository::find_unit_in(conn, unit_id)?
                    .ok_or_else(|| PlanningError::not_found("FinishedUnit", unit_id))?;
                let key = PoolKey::Unit(unit_id.clone());
                let available = unit.inventory_count as f64 - reserved.get(&key).copied().unwrap_or(0.0);
                let needed = per * target.target_quantity as f64;
                if available + eps < needed {
                    inventory_blockers.push(InventoryBlocker {
                        subject: BlockerSubject::FinishedUnit,
                        subject_id: unit.unit_id.clone(),
                        subject_name: unit.name.clone(),
                        per_target: *per,
                        needed,
                        available: available.max(0.0),
                        unit: "each".to_string(),
                    });
                }
                if ProductionRunRepository::latest_unit_cost_in(conn, unit_id)?.is_none() {
                    cost_blockers.push(CostBlocker {
                        subject: BlockerSubject::FinishedUnit,
                        subject_id: unit.unit_id.clone(),
                        subject_name: unit.name.clone(),
                        reason: "没有可用的生产成本记录".to_string(),
                    });
                }
                components.push((key, *per, available, unit.name));
            }

            for (item_id, per) in &per_bundle.packaging {
                let item = InventoryRepository::find_item_in(conn, item_id)?
                    .ok_or_else(|| PlanningError::not_found("InventoryItem", item_id))?;
                let key = PoolKey::Item(item_id.clone(), item.base_unit.clone());
                let on_hand = FifoLedger::available_quantity_in(conn, converter, item_id, &item.base_unit)?;
                let available = on_hand - reserved.get(&key).copied().unwrap_or(0.0);
                let needed = per * target.target_quantity as f64;
                if available + eps < needed {
                    inventory_blockers.push(InventoryBlocker {
                        subject: BlockerSubject::InventoryItem,
                        subject_id: item.item_id.clone(),
                        subject_name: item.name.clone(),
                        per_target: *per,
                        needed,
                        available: available.max(0.0),
                        unit: item.base_unit.clone(),
                    });
                }
                if Self::lots_missing_cost(conn, item_id)? {
                    cost_blockers.push(CostBlocker {
                        subject: BlockerSubject::InventoryItem,
                        subject_id: item.item_id.clone(),
                        subject_name: item.name.clone(),
                        reason: "存在缺少单价的库存批次".to_string(),
                    });
                }
                components.push((key, *per, available, item.name));
            }

            let assignment_blockers: Vec<AssignmentBlocker> = per_bundle
                .unassigned_packaging
                .iter()
                .map(|slot| AssignmentBlocker {
                    good_id: slot.good_id.clone(),
                    composition_id: slot.composition_id.clone(),
                    quantity: slot.quantity,
                    reason: "包装位尚未指派物料".to_string(),
                })
                .collect();

            // can_assemble = min(floor(可用 / 每组合用量))
            let mut can_assemble = target.target_quantity;
            let mut limiting_component = None;
            let mut bounded = false;
            for (_, per, available, name) in &components {
                let n = whole_ratio(*available, *per, eps);
                if !bounded || n < can_assemble {
                    can_assemble = n;
                    limiting_component = Some(name.clone());
                    bounded = true;
                }
            }

            let status = AssemblyStatus::derive(can_assemble, target.target_quantity, target.upstream_production_complete);
            debug!(
                good_id = %target.good_id,
                can_assemble,
                target = target.target_quantity,
                status = %status,
                "组装目标评估"
            );

            if config.allocation_policy == AllocationPolicy::Sequential {
                let take = can_assemble.min(target.target_quantity).max(0) as f64;
                for (key, per, _, _) in &components {
                    *reserved.entry(key.clone()).or_insert(0.0) += per * take;
                }
            }

            results.push(AssemblyFeasibility {
                good_id: good.good_id,
                good_name: good.name,
                target_quantity: target.target_quantity,
                can_assemble,
                status,
                limiting_component,
                inventory_blockers,
                cost_blockers,
                assignment_blockers,
            });
        }

        Ok(results)
    }

    /// 生产目标评估
    pub fn assess_production_targets(
        &self,
        targets: &[ProductionTarget],
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<Vec<ProductionFeasibility>> {
        with_transaction(&self.conn, tx, |tx| {
            Self::assess_production_targets_in(tx, self.converter.as_ref(), &self.config, targets)
        })
    }

    #[instrument(skip_all, fields(targets = targets.len(), policy = %config.allocation_policy))]
    pub fn assess_production_targets_in(
        conn: &Connection,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        targets: &[ProductionTarget],
    ) -> PlanningResult<Vec<ProductionFeasibility>> {
        let eps = config.quantity_epsilon;
        let reader = SqliteBomReader::new(conn);
        let decomposer = BundleDecomposer::new(&reader, config.clone());
        let mut reserved: HashMap<PoolKey, f64> = HashMap::new();
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            if target.batches == 0 {
                return Err(PlanningError::Validation("批次数必须大于 0".to_string()));
            }
            let recipe = RecipeRepository::find_by_id_in(conn, &target.recipe_id)?
                .ok_or_else(|| PlanningError::not_found("Recipe", &target.recipe_id))?;
            let per_batch = decomposer.aggregate_recipe_ingredients(&target.recipe_id, 1, converter)?;

            let mut inventory_blockers = Vec::new();
            let mut cost_blockers = Vec::new();
            let mut max_batches = u32::MAX as i64;
            let mut lines = Vec::with_capacity(per_batch.len());

            for req in &per_batch {
                let key = PoolKey::Item(req.item_id.clone(), req.unit.clone());
                let on_hand = FifoLedger::available_quantity_in(conn, converter, &req.item_id, &req.unit)?;
                let available = on_hand - reserved.get(&key).copied().unwrap_or(0.0);
                let needed = req.quantity * target.batches as f64;

                if available + eps < needed {
                    inventory_blockers.push(InventoryBlocker {
                        subject: BlockerSubject::InventoryItem,
                        subject_id: req.item_id.clone(),
                        subject_name: req.item_name.clone(),
                        per_target: req.quantity,
                        needed,
                        available: available.max(0.0),
                        unit: req.unit.clone(),
                    });
                }
                if Self::lots_missing_cost(conn, &req.item_id)? {
                    cost_blockers.push(CostBlocker {
                        subject: BlockerSubject::InventoryItem,
                        subject_id: req.item_id.clone(),
                        subject_name: req.item_name.clone(),
                        reason: "存在缺少单价的库存批次".to_string(),
                    });
                }
                if req.quantity > 0.0 {
                    max_batches = max_batches.min(whole_ratio(available, req.quantity, eps));
                }
                lines.push((key, req.quantity));
            }

            let max_batches = max_batches.clamp(0, u32::MAX as i64) as u32;
            let can_produce = max_batches >= target.batches;

            if config.allocation_policy == AllocationPolicy::Sequential {
                let take = max_batches.min(target.batches) as f64;
                for (key, per) in lines {
                    *reserved.entry(key).or_insert(0.0) += per * take;
                }
            }

            results.push(ProductionFeasibility {
                recipe_id: recipe.recipe_id,
                recipe_name: recipe.name,
                batches: target.batches,
                max_batches,
                can_produce,
                inventory_blockers,
                cost_blockers,
            });
        }

        Ok(results)
    }

    /// 物料是否存在缺少单价的未用尽批次
    fn lots_missing_cost(conn: &Connection, item_id: &str) -> PlanningResult<bool> {
        Ok(InventoryRepository::list_open_lots_fifo_in(conn, item_id)?
            .iter()
            .any(|lot| lot.unit_cost.is_none()))
    }
}
