// ==========================================
// 小批量生产排产系统 - 界面选择上下文
// ==========================================
// 红线: 由界面层持有与传递，引擎层不读取、不保存
// 职责: 记住上一次的配方/成品/组合选择，用于表单预填
// ==========================================

use crate::engine::{AssemblyRequest, ProductionRequest};
use serde::{Deserialize, Serialize};

/// 界面会话内的最近选择（临时状态，不落库）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub last_recipe_id: Option<String>,
    pub last_finished_unit_id: Option<String>,
    pub last_batches: Option<u32>,
    pub last_good_id: Option<String>,
    pub last_assembly_quantity: Option<i64>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次生产选择
    pub fn remember_production(&mut self, request: &ProductionRequest) {
        self.last_recipe_id = Some(request.recipe_id.clone());
        self.last_finished_unit_id = Some(request.finished_unit_id.clone());
        self.last_batches = Some(request.batches);
    }

    /// 记录一次组装选择
    pub fn remember_assembly(&mut self, request: &AssemblyRequest) {
        self.last_good_id = Some(request.good_id.clone());
        self.last_assembly_quantity = Some(request.quantity);
    }

    /// 按上次选择预填生产请求（产量需由用户确认）
    pub fn prefill_production(&self, actor: &str) -> Option<ProductionRequest> {
        Some(ProductionRequest {
            recipe_id: self.last_recipe_id.clone()?,
            finished_unit_id: self.last_finished_unit_id.clone()?,
            batches: self.last_batches.unwrap_or(1),
            actual_yield: 0,
            notes: None,
            actor: actor.to_string(),
        })
    }

    /// 按上次选择预填组装请求
    pub fn prefill_assembly(&self, actor: &str) -> Option<AssemblyRequest> {
        Some(AssemblyRequest {
            good_id: self.last_good_id.clone()?,
            quantity: self.last_assembly_quantity.unwrap_or(1),
            notes: None,
            actor: actor.to_string(),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
