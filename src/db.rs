// ==========================================
// 小批量生产排产系统 - SQLite 连接与事务作用域
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建库 DDL（幂等）
// - 统一“可选外部事务，否则自建事务”的作用域约定
// ==========================================

use crate::repository::error::RepositoryError;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式（TEXT 列）
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、初始化 schema，并包装为共享句柄
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等）
///
/// 约束:
/// - finished_unit.recipe_id 对 recipe 为 RESTRICT 删除
/// - inventory_lot.quantity_remaining 不可为负
/// - recipe_snapshot 一经写入不可修改（触发器拦截）
/// - production_run 在 snapshot_id 落定后不可修改
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_DDL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key) VALUES ('global', 'GLOBAL', 'global')",
        [],
    )?;
    Ok(())
}

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS recipe (
    recipe_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    yield_quantity REAL NOT NULL CHECK (yield_quantity > 0),
    yield_unit TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory_item (
    item_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    base_unit TEXT NOT NULL,
    is_packaging INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recipe_ingredient (
    recipe_id TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
    item_id TEXT NOT NULL REFERENCES inventory_item(item_id) ON DELETE RESTRICT,
    quantity REAL NOT NULL CHECK (quantity > 0),
    unit TEXT NOT NULL,
    PRIMARY KEY (recipe_id, item_id)
);

CREATE TABLE IF NOT EXISTS recipe_component (
    recipe_id TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE CASCADE,
    component_recipe_id TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE RESTRICT,
    batch_multiplier REAL NOT NULL CHECK (batch_multiplier > 0),
    PRIMARY KEY (recipe_id, component_recipe_id)
);

CREATE TABLE IF NOT EXISTS finished_unit (
    unit_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    recipe_id TEXT REFERENCES recipe(recipe_id) ON DELETE RESTRICT,
    inventory_count INTEGER NOT NULL DEFAULT 0 CHECK (inventory_count >= 0),
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS finished_good (
    good_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    inventory_count INTEGER NOT NULL DEFAULT 0 CHECK (inventory_count >= 0),
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS composition (
    composition_id TEXT PRIMARY KEY,
    good_id TEXT NOT NULL REFERENCES finished_good(good_id) ON DELETE CASCADE,
    component_kind TEXT NOT NULL CHECK (component_kind IN ('FINISHED_UNIT', 'FINISHED_GOOD', 'PACKAGING')),
    finished_unit_id TEXT REFERENCES finished_unit(unit_id) ON DELETE RESTRICT,
    finished_good_id TEXT REFERENCES finished_good(good_id) ON DELETE RESTRICT,
    item_id TEXT REFERENCES inventory_item(item_id) ON DELETE RESTRICT,
    quantity REAL NOT NULL CHECK (quantity > 0),
    CHECK (
        (component_kind = 'FINISHED_UNIT' AND finished_unit_id IS NOT NULL AND finished_good_id IS NULL AND item_id IS NULL)
        OR (component_kind = 'FINISHED_GOOD' AND finished_good_id IS NOT NULL AND finished_unit_id IS NULL AND item_id IS NULL)
        OR (component_kind = 'PACKAGING' AND finished_unit_id IS NULL AND finished_good_id IS NULL)
    )
);
CREATE INDEX IF NOT EXISTS idx_composition_good ON composition(good_id);

CREATE TABLE IF NOT EXISTS inventory_lot (
    lot_id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL REFERENCES inventory_item(item_id) ON DELETE RESTRICT,
    quantity_purchased REAL NOT NULL CHECK (quantity_purchased >= 0),
    quantity_remaining REAL NOT NULL CHECK (quantity_remaining >= 0),
    unit TEXT NOT NULL,
    unit_cost REAL,
    acquired_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inventory_lot_fifo ON inventory_lot(item_id, acquired_at, lot_id);

CREATE TABLE IF NOT EXISTS recipe_snapshot (
    snapshot_id TEXT PRIMARY KEY,
    recipe_id TEXT NOT NULL,
    snapshot_json TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    is_backfilled INTEGER NOT NULL DEFAULT 0
);

CREATE TRIGGER IF NOT EXISTS trg_recipe_snapshot_immutable
BEFORE UPDATE ON recipe_snapshot
BEGIN
    SELECT RAISE(ABORT, 'recipe_snapshot is immutable');
END;

CREATE TABLE IF NOT EXISTS production_run (
    run_id TEXT PRIMARY KEY,
    recipe_id TEXT NOT NULL REFERENCES recipe(recipe_id) ON DELETE RESTRICT,
    finished_unit_id TEXT NOT NULL REFERENCES finished_unit(unit_id) ON DELETE RESTRICT,
    snapshot_id TEXT UNIQUE REFERENCES recipe_snapshot(snapshot_id) ON DELETE RESTRICT,
    batches INTEGER NOT NULL CHECK (batches > 0),
    expected_yield REAL NOT NULL,
    actual_yield INTEGER NOT NULL CHECK (actual_yield >= 0),
    total_cost REAL NOT NULL,
    per_unit_cost REAL NOT NULL,
    produced_at TEXT NOT NULL,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_production_run_recipe ON production_run(recipe_id, produced_at);

CREATE TRIGGER IF NOT EXISTS trg_production_run_immutable
BEFORE UPDATE ON production_run
WHEN OLD.snapshot_id IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'production_run is immutable');
END;

CREATE TABLE IF NOT EXISTS production_consumption (
    record_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES production_run(run_id) ON DELETE CASCADE,
    item_id TEXT NOT NULL REFERENCES inventory_item(item_id) ON DELETE RESTRICT,
    quantity REAL NOT NULL,
    unit TEXT NOT NULL,
    total_cost REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS assembly_run (
    run_id TEXT PRIMARY KEY,
    good_id TEXT NOT NULL REFERENCES finished_good(good_id) ON DELETE RESTRICT,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    total_cost REAL NOT NULL,
    per_unit_cost REAL NOT NULL,
    assembled_at TEXT NOT NULL,
    notes TEXT
);

CREATE TABLE IF NOT EXISTS assembly_unit_consumption (
    record_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES assembly_run(run_id) ON DELETE CASCADE,
    finished_unit_id TEXT NOT NULL REFERENCES finished_unit(unit_id) ON DELETE RESTRICT,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    unit_cost REAL NOT NULL,
    total_cost REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS assembly_packaging_consumption (
    record_id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES assembly_run(run_id) ON DELETE CASCADE,
    item_id TEXT NOT NULL REFERENCES inventory_item(item_id) ON DELETE RESTRICT,
    quantity REAL NOT NULL,
    unit TEXT NOT NULL,
    total_cost REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT,
    detail TEXT
);
"#;

// ==========================================
// 事务作用域
// ==========================================

/// 在事务作用域内执行操作
///
/// - `tx = Some(..)`: 参与调用方事务，不提交（提交/回滚由调用方负责）
/// - `tx = None`: 自行获取连接并开启事务；`Ok` 提交，`Err` 回滚
///
/// 回滚由 `Transaction` 的 drop 行为保证（含 panic 展开路径）。
///
/// 注意：调用方已持有事务时必须传入 `Some(tx)`，否则会在同一连接上重复加锁。
pub fn with_transaction<T, E, F>(
    conn: &Arc<Mutex<Connection>>,
    tx: Option<&Transaction<'_>>,
    f: F,
) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<RepositoryError>,
{
    if let Some(tx) = tx {
        return f(tx);
    }

    let guard = conn
        .lock()
        .map_err(|e| RepositoryError::LockError(e.to_string()))?;
    let owned = guard
        .unchecked_transaction()
        .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

    let value = f(&owned)?;

    owned
        .commit()
        .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_memory_conn() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn count_items(conn: &Arc<Mutex<Connection>>) -> i64 {
        conn.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM inventory_item", [], |r| r.get(0))
            .unwrap()
    }

    fn insert_item(tx: &Transaction<'_>, id: &str) -> Result<(), RepositoryError> {
        tx.execute(
            "INSERT INTO inventory_item (item_id, name, base_unit, is_packaging, updated_at)
             VALUES (?1, ?1, 'g', 0, '2026-01-01 00:00:00')",
            [id],
        )?;
        Ok(())
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_owned_scope_commits_on_ok() {
        let conn = shared_memory_conn();
        let result: Result<(), RepositoryError> = with_transaction(&conn, None, |tx| insert_item(tx, "flour"));
        assert!(result.is_ok());
        assert_eq!(count_items(&conn), 1);
    }

    #[test]
    fn test_owned_scope_rolls_back_on_err() {
        let conn = shared_memory_conn();
        let result: Result<(), RepositoryError> = with_transaction(&conn, None, |tx| {
            insert_item(tx, "flour")?;
            Err(RepositoryError::ValidationError("abort".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(count_items(&conn), 0);
    }

    #[test]
    fn test_joined_scope_does_not_commit() {
        let conn = shared_memory_conn();
        {
            let guard = conn.lock().unwrap();
            let outer = guard.unchecked_transaction().unwrap();
            let inner: Result<(), RepositoryError> =
                with_transaction(&conn, Some(&outer), |tx| insert_item(tx, "sugar"));
            assert!(inner.is_ok());
            // 外层放弃 -> 内层写入一并回滚
            outer.rollback().unwrap();
        }
        assert_eq!(count_items(&conn), 0);
    }

    #[test]
    fn test_snapshot_rows_are_immutable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO recipe_snapshot (snapshot_id, recipe_id, snapshot_json, captured_at, is_backfilled)
             VALUES ('s1', 'r1', '{}', '2026-01-01 00:00:00', 0)",
            [],
        )
        .unwrap();
        let err = conn
            .execute("UPDATE recipe_snapshot SET is_backfilled = 1 WHERE snapshot_id = 's1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }
}
