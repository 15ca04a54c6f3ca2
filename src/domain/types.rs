// ==========================================
// 小批量生产排产系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 组件类型 (Composition Component Kind)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    FinishedUnit, // 成品单元（配方产出）
    FinishedGood, // 嵌套成品组合
    Packaging,    // 包装/物料（走 FIFO 批次）
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::FinishedUnit => "FINISHED_UNIT",
            ComponentKind::FinishedGood => "FINISHED_GOOD",
            ComponentKind::Packaging => "PACKAGING",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "FINISHED_UNIT" => Some(ComponentKind::FinishedUnit),
            "FINISHED_GOOD" => Some(ComponentKind::FinishedGood),
            "PACKAGING" => Some(ComponentKind::Packaging),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 组装可行性状态 (Assembly Feasibility Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblyStatus {
    CanAssemble,        // 可完全满足目标数量
    Partial,            // 可部分满足
    AwaitingProduction, // 为零，但上游生产未完成
    CannotAssemble,     // 为零，且上游生产已完成（结构性短缺）
}

impl AssemblyStatus {
    /// 由可组装数量、目标数量与上游生产进度推导状态
    pub fn derive(can_assemble: i64, target_quantity: i64, upstream_production_complete: bool) -> Self {
        if can_assemble >= target_quantity {
            AssemblyStatus::CanAssemble
        } else if can_assemble > 0 {
            AssemblyStatus::Partial
        } else if upstream_production_complete {
            AssemblyStatus::CannotAssemble
        } else {
            AssemblyStatus::AwaitingProduction
        }
    }
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyStatus::CanAssemble => write!(f, "CAN_ASSEMBLE"),
            AssemblyStatus::Partial => write!(f, "PARTIAL"),
            AssemblyStatus::AwaitingProduction => write!(f, "AWAITING_PRODUCTION"),
            AssemblyStatus::CannotAssemble => write!(f, "CANNOT_ASSEMBLE"),
        }
    }
}

// ==========================================
// 记录流程阶段 (Recorder Phase)
// ==========================================
// Requested -> Checked -> Consuming -> Committed
// 任意阶段失败 -> RolledBack（自持事务）/ Failed（调用方事务，由调用方决定回滚）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecorderPhase {
    Requested,
    Checked,
    Consuming,
    Committed,
    RolledBack,
    Failed,
}

impl RecorderPhase {
    /// 失败后的阶段：只有自持事务时才已经回滚
    pub fn after_failure(owns_transaction: bool) -> Self {
        if owns_transaction {
            RecorderPhase::RolledBack
        } else {
            RecorderPhase::Failed
        }
    }
}

impl fmt::Display for RecorderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderPhase::Requested => write!(f, "REQUESTED"),
            RecorderPhase::Checked => write!(f, "CHECKED"),
            RecorderPhase::Consuming => write!(f, "CONSUMING"),
            RecorderPhase::Committed => write!(f, "COMMITTED"),
            RecorderPhase::RolledBack => write!(f, "ROLLED_BACK"),
            RecorderPhase::Failed => write!(f, "FAILED"),
        }
    }
}

// ==========================================
// 竞争目标分配策略 (Allocation Policy)
// ==========================================
// 多个目标竞争同一库存时，按目标列表顺序（固定优先级）处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationPolicy {
    /// 按列表顺序逐个预留（前序目标占用的库存对后序目标不可见）
    #[default]
    Sequential,
    /// 每个目标独立面对全部库存
    Independent,
}

impl AllocationPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SEQUENTIAL" => Some(AllocationPolicy::Sequential),
            "INDEPENDENT" => Some(AllocationPolicy::Independent),
            _ => None,
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationPolicy::Sequential => write!(f, "SEQUENTIAL"),
            AllocationPolicy::Independent => write!(f, "INDEPENDENT"),
        }
    }
}
