// ==========================================
// 小批量生产排产系统 - 生产记录领域模型
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ProductionRun - 生产记录（不可变）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub run_id: String,
    pub recipe_id: String,
    pub finished_unit_id: String,
    pub snapshot_id: Option<String>, // 仅历史遗留记录为 None（待回填）
    pub batches: u32,
    pub expected_yield: f64,
    pub actual_yield: i64,
    pub total_cost: f64,
    pub per_unit_cost: f64,
    pub produced_at: NaiveDateTime,
    pub notes: Option<String>,
}

// ==========================================
// ConsumptionRecord - 原料消耗记录
// ==========================================
// 粒度: 每次生产每种原料一行（跨批次汇总，不按库存批次拆分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub record_id: String,
    pub run_id: String,
    pub item_id: String,
    pub quantity: f64,
    pub unit: String,
    pub total_cost: f64,
}
