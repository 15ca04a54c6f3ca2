// ==========================================
// 小批量生产排产系统 - 组合分解引擎
// ==========================================
// 红线: 组合图必须无环，出现环时报结构错误而不是无限递归
// ==========================================
// 职责:
// 1) 组合商品 -> 原子成品单元需求（沿路径累乘、跨路径累加）
// 2) 成品单元需求 -> 按配方聚合 + 批次计算
// 3) 配方 × 批次 -> 原料需求（含嵌套配方）
// ==========================================

use crate::config::PlannerConfig;
use crate::domain::finished::{Composition, FinishedGood, FinishedUnit};
use crate::domain::recipe::{InventoryItem, Recipe, RecipeComponent, RecipeIngredient};
use crate::domain::types::ComponentKind;
use crate::engine::batch_calculator::plan_batches;
use crate::engine::error::{PlanningError, PlanningResult};
use crate::engine::unit_conversion::UnitConverter;
use crate::repository::{FinishedGoodsRepository, InventoryRepository, RecipeRepository};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

// ==========================================
// BomReader - 物料清单读取接口
// ==========================================
pub trait BomReader {
    fn finished_good(&self, good_id: &str) -> PlanningResult<Option<FinishedGood>>;
    fn compositions(&self, good_id: &str) -> PlanningResult<Vec<Composition>>;
    fn finished_unit(&self, unit_id: &str) -> PlanningResult<Option<FinishedUnit>>;
    fn recipe(&self, recipe_id: &str) -> PlanningResult<Option<Recipe>>;
    fn recipe_ingredients(&self, recipe_id: &str) -> PlanningResult<Vec<RecipeIngredient>>;
    fn recipe_components(&self, recipe_id: &str) -> PlanningResult<Vec<RecipeComponent>>;
    fn inventory_item(&self, item_id: &str) -> PlanningResult<Option<InventoryItem>>;
}

/// 基于 SQLite 连接/事务的读取实现
pub struct SqliteBomReader<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBomReader<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl BomReader for SqliteBomReader<'_> {
    fn finished_good(&self, good_id: &str) -> PlanningResult<Option<FinishedGood>> {
        Ok(FinishedGoodsRepository::find_good_in(self.conn, good_id)?)
    }

    fn compositions(&self, good_id: &str) -> PlanningResult<Vec<Composition>> {
        Ok(FinishedGoodsRepository::list_compositions_in(self.conn, good_id)?)
    }

    fn finished_unit(&self, unit_id: &str) -> PlanningResult<Option<FinishedUnit>> {
        Ok(FinishedGoodsRepository::find_unit_in(self.conn, unit_id)?)
    }

    fn recipe(&self, recipe_id: &str) -> PlanningResult<Option<Recipe>> {
        Ok(RecipeRepository::find_by_id_in(self.conn, recipe_id)?)
    }

    fn recipe_ingredients(&self, recipe_id: &str) -> PlanningResult<Vec<RecipeIngredient>> {
        Ok(RecipeRepository::list_ingredients_in(self.conn, recipe_id)?)
    }

    fn recipe_components(&self, recipe_id: &str) -> PlanningResult<Vec<RecipeComponent>> {
        Ok(RecipeRepository::list_components_in(self.conn, recipe_id)?)
    }

    fn inventory_item(&self, item_id: &str) -> PlanningResult<Option<InventoryItem>> {
        Ok(InventoryRepository::find_item_in(self.conn, item_id)?)
    }
}

// ==========================================
// 输出结构
// ==========================================

/// 未指派包装位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedPackaging {
    pub good_id: String,
    pub composition_id: String,
    pub quantity: f64, // 已乘上路径倍数
}

/// 完整分解结果（成品单元 + 包装 + 未指派包装位）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplodedBundle {
    pub units: BTreeMap<String, f64>,
    pub packaging: BTreeMap<String, f64>, // item_id -> 数量（物料基础单位）
    pub unassigned_packaging: Vec<UnassignedPackaging>,
}

/// 按配方聚合的批次结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeBatchResult {
    pub recipe_id: String,
    pub recipe_name: String,
    pub finished_unit_ids: Vec<String>,
    pub units_needed: f64,
    pub batches: u32,
    pub yield_per_batch: f64,
    pub total_yield: f64,
    pub waste_units: f64,
    pub waste_percent: f64,
    pub exceeds_waste_threshold: bool,
}

/// 原料需求（按物料汇总，单位为物料基础单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRequirement {
    pub item_id: String,
    pub item_name: String,
    pub quantity: f64,
    pub unit: String,
}

// ==========================================
// BundleDecomposer - 组合分解引擎
// ==========================================
pub struct BundleDecomposer<'a> {
    reader: &'a dyn BomReader,
    config: PlannerConfig,
}

impl<'a> BundleDecomposer<'a> {
    pub fn new(reader: &'a dyn BomReader, config: PlannerConfig) -> Self {
        Self { reader, config }
    }

    /// 组合商品 -> 原子成品单元需求
    pub fn explode(&self, bundle_id: &str, quantity: f64) -> PlanningResult<BTreeMap<String, f64>> {
        Ok(self.explode_full(bundle_id, quantity)?.units)
    }

    /// 完整分解（成品单元 + 包装）
    #[instrument(skip_all, fields(bundle_id = %bundle_id, quantity = quantity))]
    pub fn explode_full(&self, bundle_id: &str, quantity: f64) -> PlanningResult<ExplodedBundle> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(PlanningError::Validation(format!(
                "组合数量不能为负: {}",
                quantity
            )));
        }

        let mut result = ExplodedBundle::default();
        let mut path = Vec::new();
        self.walk(bundle_id, quantity, &mut path, &mut result)?;

        debug!(
            units = result.units.len(),
            packaging = result.packaging.len(),
            unassigned = result.unassigned_packaging.len(),
            "组合分解完成"
        );
        Ok(result)
    }

    fn walk(
        &self,
        good_id: &str,
        multiplier: f64,
        path: &mut Vec<String>,
        result: &mut ExplodedBundle,
    ) -> PlanningResult<()> {
        if path.iter().any(|p| p == good_id) {
            let mut cycle = path.clone();
            cycle.push(good_id.to_string());
            return Err(PlanningError::Structural {
                message: format!("组合 {} 直接或间接包含自身", good_id),
                path: cycle,
            });
        }

        if self.reader.finished_good(good_id)?.is_none() {
            return Err(PlanningError::not_found("FinishedGood", good_id));
        }

        path.push(good_id.to_string());
        for comp in self.reader.compositions(good_id)? {
            let qty = comp.quantity * multiplier;
            match comp.component_kind {
                ComponentKind::FinishedUnit => {
                    let unit_id = comp.finished_unit_id.as_deref().ok_or_else(|| {
                        PlanningError::Validation(format!(
                            "组合行 {} 缺少成品单元",
                            comp.composition_id
                        ))
                    })?;
                    *result.units.entry(unit_id.to_string()).or_insert(0.0) += qty;
                }
                ComponentKind::FinishedGood => {
                    let nested_id = comp.finished_good_id.as_deref().ok_or_else(|| {
                        PlanningError::Validation(format!(
                            "组合行 {} 缺少嵌套组合",
                            comp.composition_id
                        ))
                    })?;
                    self.walk(nested_id, qty, path, result)?;
                }
                ComponentKind::Packaging => match comp.item_id.as_deref() {
                    Some(item_id) => {
                        *result.packaging.entry(item_id.to_string()).or_insert(0.0) += qty;
                    }
                    None => result.unassigned_packaging.push(UnassignedPackaging {
                        good_id: good_id.to_string(),
                        composition_id: comp.composition_id.clone(),
                        quantity: qty,
                    }),
                },
            }
        }
        path.pop();
        Ok(())
    }

    /// 成品单元需求 -> 按配方聚合并计算批次
    #[instrument(skip_all, fields(units = atomic_quantities.len()))]
    pub fn aggregate_by_recipe(
        &self,
        atomic_quantities: &BTreeMap<String, f64>,
    ) -> PlanningResult<Vec<RecipeBatchResult>> {
        let mut grouped: BTreeMap<String, (f64, Vec<String>)> = BTreeMap::new();
        for (unit_id, qty) in atomic_quantities {
            let unit = self
                .reader
                .finished_unit(unit_id)?
                .ok_or_else(|| PlanningError::not_found("FinishedUnit", unit_id))?;
            let recipe_id = unit.recipe_id.ok_or_else(|| {
                PlanningError::Validation(format!("成品单元 {} 未关联配方", unit_id))
            })?;
            let entry = grouped.entry(recipe_id).or_insert((0.0, Vec::new()));
            entry.0 += qty;
            entry.1.push(unit_id.clone());
        }

        let mut results = Vec::with_capacity(grouped.len());
        for (recipe_id, (units_needed, unit_ids)) in grouped {
            let recipe = self
                .reader
                .recipe(&recipe_id)?
                .ok_or_else(|| PlanningError::not_found("Recipe", &recipe_id))?;
            let plan = plan_batches(units_needed, recipe.yield_quantity, self.config.quantity_epsilon)?;
            let exceeds = plan.waste_percent > self.config.waste_warning_pct;
            if exceeds {
                warn!(
                    recipe_id = %recipe_id,
                    waste_percent = plan.waste_percent,
                    threshold = self.config.waste_warning_pct,
                    "批次浪费率超过阈值"
                );
            }
            results.push(RecipeBatchResult {
                recipe_id,
                recipe_name: recipe.name,
                finished_unit_ids: unit_ids,
                units_needed,
                batches: plan.batches,
                yield_per_batch: plan.yield_per_batch,
                total_yield: plan.total_yield,
                waste_units: plan.waste_units,
                waste_percent: plan.waste_percent,
                exceeds_waste_threshold: exceeds,
            });
        }
        Ok(results)
    }

    /// 配方 × 批次 -> 原料需求（递归展开嵌套配方）
    ///
    /// 同一物料只产出一行，数量统一换算到物料基础单位。
    #[instrument(skip_all, fields(recipe_id = %recipe_id, batches = batches))]
    pub fn aggregate_recipe_ingredients(
        &self,
        recipe_id: &str,
        batches: u32,
        converter: &dyn UnitConverter,
    ) -> PlanningResult<Vec<IngredientRequirement>> {
        let mut totals: BTreeMap<String, IngredientRequirement> = BTreeMap::new();
        let mut path = Vec::new();
        self.collect_ingredients(recipe_id, batches as f64, converter, &mut path, &mut totals)?;
        Ok(totals.into_values().collect())
    }

    fn collect_ingredients(
        &self,
        recipe_id: &str,
        scale: f64,
        converter: &dyn UnitConverter,
        path: &mut Vec<String>,
        totals: &mut BTreeMap<String, IngredientRequirement>,
    ) -> PlanningResult<()> {
        if path.iter().any(|p| p == recipe_id) {
            let mut cycle = path.clone();
            cycle.push(recipe_id.to_string());
            return Err(PlanningError::Structural {
                message: format!("配方 {} 直接或间接引用自身", recipe_id),
                path: cycle,
            });
        }
        if self.reader.recipe(recipe_id)?.is_none() {
            return Err(PlanningError::not_found("Recipe", recipe_id));
        }

        path.push(recipe_id.to_string());
        for ing in self.reader.recipe_ingredients(recipe_id)? {
            if !totals.contains_key(&ing.item_id) {
                let item = self
                    .reader
                    .inventory_item(&ing.item_id)?
                    .ok_or_else(|| PlanningError::not_found("InventoryItem", &ing.item_id))?;
                totals.insert(
                    ing.item_id.clone(),
                    IngredientRequirement {
                        item_id: item.item_id,
                        item_name: item.name,
                        quantity: 0.0,
                        unit: item.base_unit,
                    },
                );
            }
            if let Some(entry) = totals.get_mut(&ing.item_id) {
                entry.quantity += converter.convert(ing.quantity * scale, &ing.unit, &entry.unit)?;
            }
        }
        for comp in self.reader.recipe_components(recipe_id)? {
            self.collect_ingredients(
                &comp.component_recipe_id,
                comp.batch_multiplier * scale,
                converter,
                path,
                totals,
            )?;
        }
        path.pop();
        Ok(())
    }
}
