// ==========================================
// 小批量生产排产系统 - 操作日志领域模型
// ==========================================
// 红线: 所有记录类写入必须在同一事务内留痕
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub action_type: ActionType,
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub payload_json: Option<JsonValue>, // 操作参数与结果摘要
    pub detail: Option<String>,
}

impl ActionLog {
    /// 创建一条当前时间的日志
    pub fn now(action_type: ActionType, actor: &str, payload: Option<JsonValue>, detail: Option<String>) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type,
            action_ts: chrono::SubsecRound::trunc_subsecs(chrono::Local::now().naive_local(), 0),
            actor: actor.to_string(),
            payload_json: payload,
            detail,
        }
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    RecordProduction,  // 生产入库
    RecordAssembly,    // 组装入库
    BackfillSnapshots, // 历史快照回填
    RestoreRecipe,     // 从快照恢复配方
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::RecordProduction => "RecordProduction",
            ActionType::RecordAssembly => "RecordAssembly",
            ActionType::BackfillSnapshots => "BackfillSnapshots",
            ActionType::RestoreRecipe => "RestoreRecipe",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "RecordProduction" => Some(ActionType::RecordProduction),
            "RecordAssembly" => Some(ActionType::RecordAssembly),
            "BackfillSnapshots" => Some(ActionType::BackfillSnapshots),
            "RestoreRecipe" => Some(ActionType::RestoreRecipe),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
