// ==========================================
// 小批量生产排产系统 - 配方领域模型
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Recipe - 配方
// ==========================================
// 每个配方只有一种产出规格（每批次产量 + 单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: String,
    pub name: String,
    pub category: String,

    // ===== 单批次产量 =====
    pub yield_quantity: f64, // 每批次产量
    pub yield_unit: String,  // 产量单位（如 "each"）

    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// InventoryItem - 库存物料（原料 / 包装）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: String,
    pub name: String,
    pub base_unit: String,
    pub is_packaging: bool,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// RecipeIngredient - 配方原料（每批次用量）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub recipe_id: String,
    pub item_id: String,
    pub quantity: f64,
    pub unit: String,
}

// ==========================================
// RecipeComponent - 嵌套配方边
// ==========================================
// batch_multiplier: 父配方每批次需要的子配方批次数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeComponent {
    pub recipe_id: String,
    pub component_recipe_id: String,
    pub batch_multiplier: f64,
}
