// ==========================================
// 小批量生产排产系统 - 配方快照仓储
// ==========================================
// 红线: 只提供插入与查询，不提供更新（库内触发器同样拦截 UPDATE）
// ==========================================

use crate::domain::snapshot::{RecipeSnapshot, SnapshotPayload};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, get_bool, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

// ==========================================
// RecipeSnapshotRepository - 配方快照仓储
// ==========================================
pub struct RecipeSnapshotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RecipeSnapshotRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, snapshot_id: &str) -> RepositoryResult<Option<RecipeSnapshot>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, snapshot_id)
    }

    /// 查询配方的全部快照（按捕获时间升序）
    pub fn list_for_recipe(&self, recipe_id: &str) -> RepositoryResult<Vec<RecipeSnapshot>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT snapshot_id, recipe_id, snapshot_json, captured_at, is_backfilled
               FROM recipe_snapshot
               WHERE recipe_id = ?
               ORDER BY captured_at ASC, snapshot_id ASC"#,
        )?;
        let raw = stmt
            .query_map(params![recipe_id], Self::map_raw)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(Self::decode).collect()
    }

    pub fn insert_tx(tx: &Transaction, snapshot: &RecipeSnapshot) -> RepositoryResult<()> {
        let json = serde_json::to_string(&snapshot.payload)?;
        tx.execute(
            r#"INSERT INTO recipe_snapshot (
                snapshot_id, recipe_id, snapshot_json, captured_at, is_backfilled
            ) VALUES (?, ?, ?, ?, ?)"#,
            params![
                &snapshot.snapshot_id,
                &snapshot.recipe_id,
                json,
                format_ts(&snapshot.captured_at),
                snapshot.is_backfilled as i64,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_in(conn: &Connection, snapshot_id: &str) -> RepositoryResult<Option<RecipeSnapshot>> {
        let raw = conn
            .query_row(
                r#"SELECT snapshot_id, recipe_id, snapshot_json, captured_at, is_backfilled
                   FROM recipe_snapshot WHERE snapshot_id = ?"#,
                params![snapshot_id],
                Self::map_raw,
            )
            .optional()?;
        raw.map(Self::decode).transpose()
    }

    fn map_raw(row: &rusqlite::Row) -> rusqlite::Result<RawSnapshotRow> {
        Ok(RawSnapshotRow {
            snapshot_id: row.get(0)?,
            recipe_id: row.get(1)?,
            snapshot_json: row.get(2)?,
            captured_at: parse_ts(row, 3)?,
            is_backfilled: get_bool(row, 4)?,
        })
    }

    fn decode(raw: RawSnapshotRow) -> RepositoryResult<RecipeSnapshot> {
        let payload: SnapshotPayload = serde_json::from_str(&raw.snapshot_json)?;
        Ok(RecipeSnapshot {
            snapshot_id: raw.snapshot_id,
            recipe_id: raw.recipe_id,
            payload,
            captured_at: raw.captured_at,
            is_backfilled: raw.is_backfilled,
        })
    }
}

struct RawSnapshotRow {
    snapshot_id: String,
    recipe_id: String,
    snapshot_json: String,
    captured_at: chrono::NaiveDateTime,
    is_backfilled: bool,
}
