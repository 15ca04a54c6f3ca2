// ==========================================
// 小批量生产排产系统 - 组装记录领域模型
// ==========================================
// 两套独立消耗台账：成品单元消耗 / 包装消耗
// 分表存储以保留外键约束，不合并为多态表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// AssemblyRun - 组装记录（不可变）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRun {
    pub run_id: String,
    pub good_id: String,
    pub quantity: i64,
    pub total_cost: f64,
    pub per_unit_cost: f64,
    pub assembled_at: NaiveDateTime,
    pub notes: Option<String>,
}

// ==========================================
// AssemblyUnitConsumption - 成品单元消耗
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyUnitConsumption {
    pub record_id: String,
    pub run_id: String,
    pub finished_unit_id: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub total_cost: f64,
}

// ==========================================
// AssemblyPackagingConsumption - 包装消耗
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyPackagingConsumption {
    pub record_id: String,
    pub run_id: String,
    pub item_id: String,
    pub quantity: f64,
    pub unit: String,
    pub total_cost: f64,
}
