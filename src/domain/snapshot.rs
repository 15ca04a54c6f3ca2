// ==========================================
// 小批量生产排产系统 - 配方快照领域模型
// ==========================================
// 红线: 快照一经创建不可修改
// 用途: 审计追溯 + “从历史恢复为新配方”
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// RecipeSnapshot - 配方快照（存储行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSnapshot {
    pub snapshot_id: String,
    pub recipe_id: String,
    pub payload: SnapshotPayload,
    pub captured_at: NaiveDateTime,
    pub is_backfilled: bool, // true = 按当前配方近似回填的历史
}

// ==========================================
// SnapshotPayload - 快照内容（JSON）
// ==========================================
// 须包含足以重建一个新配方的全部数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub recipe: SnapshotRecipe,
    pub ingredients: Vec<SnapshotIngredient>,
    #[serde(default)]
    pub components: Vec<SnapshotComponent>,
    /// 回填快照对应的生产时间（非回填为 None）
    #[serde(default)]
    pub source_produced_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecipe {
    pub recipe_id: String,
    pub name: String,
    pub category: String,
    pub yield_quantity: f64,
    pub yield_unit: String,
    pub notes: Option<String>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIngredient {
    pub item_id: String,
    pub item_name: String,
    pub base_unit: String,
    pub is_packaging: bool,
    pub quantity: f64,
    pub unit: String,
    pub item_updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotComponent {
    pub component_recipe_id: String,
    pub component_name: String,
    pub batch_multiplier: f64,
    pub component_updated_at: NaiveDateTime,
}

// ==========================================
// SnapshotStaleness - 快照新鲜度
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStaleness {
    pub snapshot_id: String,
    pub is_stale: bool,
    pub reasons: Vec<String>,
}

impl SnapshotStaleness {
    /// 可读原因（多条以分号连接）
    pub fn reason(&self) -> Option<String> {
        if self.reasons.is_empty() {
            None
        } else {
            Some(self.reasons.join("; "))
        }
    }
}

// ==========================================
// BackfillReport - 快照回填报告
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub created: Vec<BackfilledRun>,
    pub skipped: Vec<(String, String)>, // (run_id, 原因)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfilledRun {
    pub run_id: String,
    pub snapshot_id: String,
}
