// ==========================================
// 小批量生产排产系统 - 库存物料与批次仓储
// ==========================================
// 红线: Repository 不含业务逻辑（FIFO 规则在引擎层）
// ==========================================

use crate::domain::inventory::InventoryLot;
use crate::domain::recipe::InventoryItem;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, get_bool, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

// ==========================================
// InventoryRepository - 库存仓储
// ==========================================
pub struct InventoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepository {
    /// 创建新的InventoryRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 物料
    // ==========================================

    /// 创建物料
    pub fn insert_item(&self, item: &InventoryItem) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_item_on(&conn, item)?;
        Ok(item.item_id.clone())
    }

    /// 更新物料（含 updated_at）
    pub fn update_item(&self, item: &InventoryItem) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"UPDATE inventory_item
               SET name = ?, base_unit = ?, is_packaging = ?, updated_at = ?
               WHERE item_id = ?"#,
            params![
                &item.name,
                &item.base_unit,
                item.is_packaging as i64,
                format_ts(&item.updated_at),
                &item.item_id,
            ],
        )?;
        Ok(())
    }

    pub fn find_item(&self, item_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        let conn = self.get_conn()?;
        Self::find_item_in(&conn, item_id)
    }

    pub fn insert_item_on(conn: &Connection, item: &InventoryItem) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO inventory_item (item_id, name, base_unit, is_packaging, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                &item.item_id,
                &item.name,
                &item.base_unit,
                item.is_packaging as i64,
                format_ts(&item.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_item_in(conn: &Connection, item_id: &str) -> RepositoryResult<Option<InventoryItem>> {
        let item = conn
            .query_row(
                r#"SELECT item_id, name, base_unit, is_packaging, updated_at
                   FROM inventory_item WHERE item_id = ?"#,
                params![item_id],
                |row| {
                    Ok(InventoryItem {
                        item_id: row.get(0)?,
                        name: row.get(1)?,
                        base_unit: row.get(2)?,
                        is_packaging: get_bool(row, 3)?,
                        updated_at: parse_ts(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    // ==========================================
    // 批次
    // ==========================================

    /// 入库一个批次
    pub fn insert_lot(&self, lot: &InventoryLot) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO inventory_lot (
                lot_id, item_id, quantity_purchased, quantity_remaining,
                unit, unit_cost, acquired_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &lot.lot_id,
                &lot.item_id,
                lot.quantity_purchased,
                lot.quantity_remaining,
                &lot.unit,
                lot.unit_cost,
                format_ts(&lot.acquired_at),
            ],
        )?;
        Ok(lot.lot_id.clone())
    }

    pub fn find_lot(&self, lot_id: &str) -> RepositoryResult<Option<InventoryLot>> {
        let conn = self.get_conn()?;
        let lot = conn
            .query_row(
                r#"SELECT lot_id, item_id, quantity_purchased, quantity_remaining,
                          unit, unit_cost, acquired_at
                   FROM inventory_lot WHERE lot_id = ?"#,
                params![lot_id],
                Self::map_lot,
            )
            .optional()?;
        Ok(lot)
    }

    /// 查询物料的可用批次（FIFO 顺序：acquired_at 升序，同时刻按 lot_id）
    pub fn list_open_lots_fifo_in(conn: &Connection, item_id: &str) -> RepositoryResult<Vec<InventoryLot>> {
        let mut stmt = conn.prepare(
            r#"SELECT lot_id, item_id, quantity_purchased, quantity_remaining,
                      unit, unit_cost, acquired_at
               FROM inventory_lot
               WHERE item_id = ? AND quantity_remaining > 0
               ORDER BY acquired_at ASC, lot_id ASC"#,
        )?;
        let lots = stmt
            .query_map(params![item_id], Self::map_lot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lots)
    }

    /// 在事务中更新批次余量
    pub fn set_lot_remaining_tx(tx: &Transaction, lot_id: &str, remaining: f64) -> RepositoryResult<()> {
        let rows = tx.execute(
            "UPDATE inventory_lot SET quantity_remaining = ? WHERE lot_id = ?",
            params![remaining, lot_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "InventoryLot".to_string(),
                id: lot_id.to_string(),
            });
        }
        Ok(())
    }

    fn map_lot(row: &rusqlite::Row) -> rusqlite::Result<InventoryLot> {
        Ok(InventoryLot {
            lot_id: row.get(0)?,
            item_id: row.get(1)?,
            quantity_purchased: row.get(2)?,
            quantity_remaining: row.get(3)?,
            unit: row.get(4)?,
            unit_cost: row.get(5)?,
            acquired_at: parse_ts(row, 6)?,
        })
    }
}
