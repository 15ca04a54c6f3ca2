// ==========================================
// 小批量生产排产系统 - 库存批次领域模型
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// InventoryLot - 库存批次
// ==========================================
// 红线: quantity_remaining 永不为负
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub lot_id: String,
    pub item_id: String,
    pub quantity_purchased: f64,
    pub quantity_remaining: f64,
    pub unit: String,
    pub unit_cost: Option<f64>, // 批次单价（按批次单位计）；None = 缺少成本数据
    pub acquired_at: NaiveDateTime,
}

// ==========================================
// LotDraw - 单个批次的扣减明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: String,
    pub acquired_at: NaiveDateTime,
    pub lot_unit: String,
    pub quantity_from_lot: f64,      // 按批次单位扣减量
    pub quantity_in_request: f64,    // 折算为请求单位的扣减量
    pub unit_cost: Option<f64>,
    pub cost: f64,                   // 缺成本时按 0 计
    pub remaining_after: f64,        // 扣减后批次余量（批次单位）
}

// ==========================================
// ConsumptionResult - FIFO 扣减结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionResult {
    pub item_id: String,
    pub requested: f64,
    pub unit: String,
    pub consumed: f64,
    pub breakdown: Vec<LotDraw>,
    pub shortfall: f64,
    pub satisfied: bool,
    pub total_cost: f64,
    pub missing_cost: bool, // 任一被扣减批次缺少单价
    pub dry_run: bool,
}
