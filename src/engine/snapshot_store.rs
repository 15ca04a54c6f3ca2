// ==========================================
// 小批量生产排产系统 - 配方快照服务
// ==========================================
// 红线: 快照一经写入不可修改
// 红线: 回填快照必须标记 is_backfilled = true（近似历史）
// ==========================================
// 职责:
// 1) 生产时冻结配方 + 原料状态
// 2) 快照新鲜度检测（时间戳 + 成员变化）
// 3) 历史生产记录快照回填
// 4) 从快照恢复为新配方
// ==========================================

use crate::db::with_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::recipe::{InventoryItem, Recipe, RecipeComponent, RecipeIngredient};
use crate::domain::snapshot::{
    BackfillReport, BackfilledRun, RecipeSnapshot, SnapshotComponent, SnapshotIngredient,
    SnapshotPayload, SnapshotRecipe, SnapshotStaleness,
};
use crate::engine::error::{PlanningError, PlanningResult};
use crate::repository::row_utils::now_ts;
use crate::repository::{
    ActionLogRepository, InventoryRepository, ProductionRunRepository, RecipeRepository,
    RecipeSnapshotRepository,
};
use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// 从快照恢复配方的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredRecipe {
    pub recipe_id: String,
    pub source_snapshot_id: String,
    pub ingredient_count: usize,
    pub recreated_items: Vec<String>,      // 已删除后按快照重建的物料
    pub skipped_components: Vec<String>,   // 已不存在的嵌套配方
}

// ==========================================
// SnapshotStore - 配方快照服务
// ==========================================
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ==========================================
    // 快照创建
    // ==========================================

    /// 创建快照（独立调用或参与调用方事务）
    pub fn create_snapshot(
        &self,
        recipe_id: &str,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<RecipeSnapshot> {
        with_transaction(&self.conn, tx, |tx| {
            Self::create_snapshot_tx(tx, recipe_id, false, None)
        })
    }

    /// 事务内创建快照
    ///
    /// # 参数
    /// - is_backfilled: 是否为按当前状态近似的回填快照
    /// - source_produced_at: 回填时对应的生产时间
    pub fn create_snapshot_tx(
        tx: &Transaction<'_>,
        recipe_id: &str,
        is_backfilled: bool,
        source_produced_at: Option<NaiveDateTime>,
    ) -> PlanningResult<RecipeSnapshot> {
        let mut payload = Self::capture_payload(tx, recipe_id)?;
        payload.source_produced_at = source_produced_at;

        let snapshot = RecipeSnapshot {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            recipe_id: recipe_id.to_string(),
            payload,
            captured_at: now_ts(),
            is_backfilled,
        };
        RecipeSnapshotRepository::insert_tx(tx, &snapshot)?;
        Ok(snapshot)
    }

    /// 读取配方 + 原料 + 嵌套配方的当前状态
    fn capture_payload(conn: &Connection, recipe_id: &str) -> PlanningResult<SnapshotPayload> {
        let recipe = RecipeRepository::find_by_id_in(conn, recipe_id)?
            .ok_or_else(|| PlanningError::not_found("Recipe", recipe_id))?;

        let mut ingredients = Vec::new();
        for ing in RecipeRepository::list_ingredients_in(conn, recipe_id)? {
            let item = InventoryRepository::find_item_in(conn, &ing.item_id)?
                .ok_or_else(|| PlanningError::not_found("InventoryItem", &ing.item_id))?;
            ingredients.push(SnapshotIngredient {
                item_id: item.item_id,
                item_name: item.name,
                base_unit: item.base_unit,
                is_packaging: item.is_packaging,
                quantity: ing.quantity,
                unit: ing.unit,
                item_updated_at: item.updated_at,
            });
        }

        let mut components = Vec::new();
        for comp in RecipeRepository::list_components_in(conn, recipe_id)? {
            let sub = RecipeRepository::find_by_id_in(conn, &comp.component_recipe_id)?
                .ok_or_else(|| PlanningError::not_found("Recipe", &comp.component_recipe_id))?;
            components.push(SnapshotComponent {
                component_recipe_id: sub.recipe_id,
                component_name: sub.name,
                batch_multiplier: comp.batch_multiplier,
                component_updated_at: sub.updated_at,
            });
        }

        Ok(SnapshotPayload {
            recipe: SnapshotRecipe {
                recipe_id: recipe.recipe_id,
                name: recipe.name,
                category: recipe.category,
                yield_quantity: recipe.yield_quantity,
                yield_unit: recipe.yield_unit,
                notes: recipe.notes,
                updated_at: recipe.updated_at,
            },
            ingredients,
            components,
            source_produced_at: None,
        })
    }

    // ==========================================
    // 新鲜度检测
    // ==========================================

    pub fn check_staleness(
        &self,
        snapshot_id: &str,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<SnapshotStaleness> {
        with_transaction(&self.conn, tx, |tx| Self::check_staleness_in(tx, snapshot_id))
    }

    /// 比较快照捕获的时间戳/成员与当前实体
    pub fn check_staleness_in(conn: &Connection, snapshot_id: &str) -> PlanningResult<SnapshotStaleness> {
        let snapshot = RecipeSnapshotRepository::find_by_id_in(conn, snapshot_id)?
            .ok_or_else(|| PlanningError::not_found("RecipeSnapshot", snapshot_id))?;
        let payload = &snapshot.payload;
        let mut reasons = Vec::new();

        let live = match RecipeRepository::find_by_id_in(conn, &snapshot.recipe_id)? {
            Some(r) => r,
            None => {
                reasons.push(format!("配方 {} 已删除", payload.recipe.name));
                return Ok(SnapshotStaleness {
                    snapshot_id: snapshot.snapshot_id,
                    is_stale: true,
                    reasons,
                });
            }
        };
        // 时间戳只精确到秒，同一秒内的修改靠字段比对发现
        if live.updated_at > payload.recipe.updated_at {
            reasons.push(format!(
                "配方 {} 于 {} 修改（快照记录 {}）",
                live.name, live.updated_at, payload.recipe.updated_at
            ));
        } else if live.yield_quantity != payload.recipe.yield_quantity
            || live.yield_unit != payload.recipe.yield_unit
            || live.category != payload.recipe.category
        {
            reasons.push(format!(
                "配方 {} 产出/分类已修改: {} {} [{}] -> {} {} [{}]",
                live.name,
                payload.recipe.yield_quantity,
                payload.recipe.yield_unit,
                payload.recipe.category,
                live.yield_quantity,
                live.yield_unit,
                live.category
            ));
        }

        // 原料: 物料定义时间戳 + 配方成员
        let live_ingredients: BTreeMap<String, RecipeIngredient> =
            RecipeRepository::list_ingredients_in(conn, &snapshot.recipe_id)?
                .into_iter()
                .map(|ing| (ing.item_id.clone(), ing))
                .collect();
        for snap_ing in &payload.ingredients {
            match InventoryRepository::find_item_in(conn, &snap_ing.item_id)? {
                None => reasons.push(format!("原料 {} 已删除", snap_ing.item_name)),
                Some(item) if item.updated_at > snap_ing.item_updated_at => {
                    reasons.push(format!("原料 {} 定义已修改", item.name))
                }
                Some(_) => {}
            }
            match live_ingredients.get(&snap_ing.item_id) {
                None => reasons.push(format!("原料 {} 已从配方移除", snap_ing.item_name)),
                Some(live_ing)
                    if live_ing.unit != snap_ing.unit || live_ing.quantity != snap_ing.quantity =>
                {
                    reasons.push(format!(
                        "原料 {} 用量 {} {} -> {} {}",
                        snap_ing.item_name, snap_ing.quantity, snap_ing.unit, live_ing.quantity, live_ing.unit
                    ))
                }
                Some(_) => {}
            }
        }
        for item_id in live_ingredients.keys() {
            if !payload.ingredients.iter().any(|i| &i.item_id == item_id) {
                reasons.push(format!("配方新增原料 {}", item_id));
            }
        }

        // 嵌套配方
        let live_components: BTreeMap<String, RecipeComponent> =
            RecipeRepository::list_components_in(conn, &snapshot.recipe_id)?
                .into_iter()
                .map(|c| (c.component_recipe_id.clone(), c))
                .collect();
        for snap_comp in &payload.components {
            match RecipeRepository::find_by_id_in(conn, &snap_comp.component_recipe_id)? {
                None => reasons.push(format!("子配方 {} 已删除", snap_comp.component_name)),
                Some(sub) if sub.updated_at > snap_comp.component_updated_at => {
                    reasons.push(format!("子配方 {} 已修改", sub.name))
                }
                Some(_) => {}
            }
            if !live_components.contains_key(&snap_comp.component_recipe_id) {
                reasons.push(format!("子配方 {} 已从配方移除", snap_comp.component_name));
            }
        }
        for comp_id in live_components.keys() {
            if !payload.components.iter().any(|c| &c.component_recipe_id == comp_id) {
                reasons.push(format!("配方新增子配方 {}", comp_id));
            }
        }

        Ok(SnapshotStaleness {
            snapshot_id: snapshot.snapshot_id,
            is_stale: !reasons.is_empty(),
            reasons,
        })
    }

    // ==========================================
    // 历史回填
    // ==========================================

    /// 为缺少快照的历史生产记录回填快照
    #[instrument(skip(self, tx))]
    pub fn backfill_missing_snapshots(
        &self,
        actor: &str,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<BackfillReport> {
        with_transaction(&self.conn, tx, |tx| Self::backfill_missing_snapshots_tx(tx, actor))
    }

    pub fn backfill_missing_snapshots_tx(tx: &Transaction<'_>, actor: &str) -> PlanningResult<BackfillReport> {
        let mut report = BackfillReport::default();

        for run in ProductionRunRepository::list_missing_snapshot_in(tx)? {
            if RecipeRepository::find_by_id_in(tx, &run.recipe_id)?.is_none() {
                warn!(run_id = %run.run_id, recipe_id = %run.recipe_id, "配方已不存在，跳过回填");
                report
                    .skipped
                    .push((run.run_id.clone(), format!("配方 {} 不存在", run.recipe_id)));
                continue;
            }

            let snapshot = Self::create_snapshot_tx(tx, &run.recipe_id, true, Some(run.produced_at))?;
            ProductionRunRepository::attach_snapshot_tx(tx, &run.run_id, &snapshot.snapshot_id)?;
            report.created.push(BackfilledRun {
                run_id: run.run_id,
                snapshot_id: snapshot.snapshot_id,
            });
        }

        let log = ActionLog::now(
            ActionType::BackfillSnapshots,
            actor,
            Some(json!({
                "created": report.created.len(),
                "skipped": report.skipped.len(),
            })),
            None,
        );
        ActionLogRepository::insert_tx(tx, &log)?;

        info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            "快照回填完成"
        );
        Ok(report)
    }

    // ==========================================
    // 从快照恢复
    // ==========================================

    /// 仅凭快照内容重建一个新配方
    ///
    /// - 已删除的物料按快照信息重建
    /// - 已删除的子配方跳过（记录在结果中）
    #[instrument(skip(self, tx))]
    pub fn restore_as_new_recipe(
        &self,
        snapshot_id: &str,
        new_name: &str,
        actor: &str,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<RestoredRecipe> {
        with_transaction(&self.conn, tx, |tx| {
            Self::restore_as_new_recipe_tx(tx, snapshot_id, new_name, actor)
        })
    }

    pub fn restore_as_new_recipe_tx(
        tx: &Transaction<'_>,
        snapshot_id: &str,
        new_name: &str,
        actor: &str,
    ) -> PlanningResult<RestoredRecipe> {
        if new_name.trim().is_empty() {
            return Err(PlanningError::Validation("新配方名称不能为空".to_string()));
        }
        let snapshot = RecipeSnapshotRepository::find_by_id_in(tx, snapshot_id)?
            .ok_or_else(|| PlanningError::not_found("RecipeSnapshot", snapshot_id))?;
        let payload = &snapshot.payload;
        let now = now_ts();

        let recipe = Recipe {
            recipe_id: uuid::Uuid::new_v4().to_string(),
            name: new_name.trim().to_string(),
            category: payload.recipe.category.clone(),
            yield_quantity: payload.recipe.yield_quantity,
            yield_unit: payload.recipe.yield_unit.clone(),
            notes: payload.recipe.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        RecipeRepository::insert_tx(tx, &recipe)?;

        let mut recreated_items = Vec::new();
        for snap_ing in &payload.ingredients {
            if InventoryRepository::find_item_in(tx, &snap_ing.item_id)?.is_none() {
                InventoryRepository::insert_item_on(
                    tx,
                    &InventoryItem {
                        item_id: snap_ing.item_id.clone(),
                        name: snap_ing.item_name.clone(),
                        base_unit: snap_ing.base_unit.clone(),
                        is_packaging: snap_ing.is_packaging,
                        updated_at: now,
                    },
                )?;
                recreated_items.push(snap_ing.item_id.clone());
            }
            RecipeRepository::add_ingredient_on(
                tx,
                &RecipeIngredient {
                    recipe_id: recipe.recipe_id.clone(),
                    item_id: snap_ing.item_id.clone(),
                    quantity: snap_ing.quantity,
                    unit: snap_ing.unit.clone(),
                },
            )?;
        }

        let mut skipped_components = Vec::new();
        for snap_comp in &payload.components {
            if RecipeRepository::find_by_id_in(tx, &snap_comp.component_recipe_id)?.is_none() {
                warn!(component = %snap_comp.component_recipe_id, "子配方已不存在，跳过");
                skipped_components.push(snap_comp.component_recipe_id.clone());
                continue;
            }
            RecipeRepository::add_component_on(
                tx,
                &RecipeComponent {
                    recipe_id: recipe.recipe_id.clone(),
                    component_recipe_id: snap_comp.component_recipe_id.clone(),
                    batch_multiplier: snap_comp.batch_multiplier,
                },
            )?;
        }

        let restored = RestoredRecipe {
            recipe_id: recipe.recipe_id,
            source_snapshot_id: snapshot.snapshot_id.clone(),
            ingredient_count: payload.ingredients.len(),
            recreated_items,
            skipped_components,
        };

        let log = ActionLog::now(
            ActionType::RestoreRecipe,
            actor,
            Some(serde_json::to_value(&restored).map_err(crate::repository::RepositoryError::from)?),
            Some(format!("从快照 {} 恢复", snapshot.snapshot_id)),
        );
        ActionLogRepository::insert_tx(tx, &log)?;

        info!(recipe_id = %restored.recipe_id, snapshot_id = %snapshot_id, "配方已从快照恢复");
        Ok(restored)
    }
}
