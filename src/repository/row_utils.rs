// ==========================================
// 小批量生产排产系统 - 行映射工具
// ==========================================
// 职责: 时间戳 TEXT <-> NaiveDateTime 转换，布尔列读取
// ==========================================

use crate::db::DATETIME_FMT;
use chrono::{NaiveDateTime, SubsecRound};
use rusqlite::Row;

/// 当前本地时间（截断到秒，与存储精度一致）
pub fn now_ts() -> NaiveDateTime {
    chrono::Local::now().naive_local().trunc_subsecs(0)
}

/// 格式化时间戳为存储文本
pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(DATETIME_FMT).to_string()
}

/// 从指定列解析时间戳
pub fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// 从指定列解析可空时间戳
pub fn parse_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) => NaiveDateTime::parse_from_str(&s, DATETIME_FMT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
            }),
    }
}

/// 读取 INTEGER 布尔列
pub fn get_bool(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    let v: i64 = row.get(idx)?;
    Ok(v != 0)
}
