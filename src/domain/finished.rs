// ==========================================
// 小批量生产排产系统 - 成品领域模型
// ==========================================

use crate::domain::types::ComponentKind;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// FinishedUnit - 成品单元
// ==========================================
// 红线: inventory_count 仅由生产/组装记录器修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedUnit {
    pub unit_id: String,
    pub name: String,
    pub recipe_id: Option<String>, // 产出配方（缺失时无法计算批次）
    pub inventory_count: i64,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// FinishedGood - 成品组合（礼盒 / 套装）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedGood {
    pub good_id: String,
    pub name: String,
    pub inventory_count: i64,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// Composition - 组合物料清单边
// ==========================================
// 指向 FinishedUnit / 嵌套 FinishedGood / 包装物料之一
// Packaging 且 item_id 为空 => 未指派包装（待分配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub composition_id: String,
    pub good_id: String,
    pub component_kind: ComponentKind,
    pub finished_unit_id: Option<String>,
    pub finished_good_id: Option<String>,
    pub item_id: Option<String>,
    pub quantity: f64, // 每个组合所需数量
}

impl Composition {
    /// 组件目标ID（未指派包装返回 None）
    pub fn target_id(&self) -> Option<&str> {
        match self.component_kind {
            ComponentKind::FinishedUnit => self.finished_unit_id.as_deref(),
            ComponentKind::FinishedGood => self.finished_good_id.as_deref(),
            ComponentKind::Packaging => self.item_id.as_deref(),
        }
    }

    pub fn is_unassigned_packaging(&self) -> bool {
        self.component_kind == ComponentKind::Packaging && self.item_id.is_none()
    }
}
