// ==========================================
// 小批量生产排产系统 - 成品单元 / 成品组合仓储
// ==========================================
// 红线: inventory_count 的增减只经由记录器在事务内调用
// ==========================================

use crate::domain::finished::{Composition, FinishedGood, FinishedUnit};
use crate::domain::types::ComponentKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

// ==========================================
// FinishedGoodsRepository - 成品仓储
// ==========================================
pub struct FinishedGoodsRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FinishedGoodsRepository {
    /// 创建新的FinishedGoodsRepository实例
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
    // 成品单元
    // ==========================================

    pub fn insert_unit(&self, unit: &FinishedUnit) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO finished_unit (unit_id, name, recipe_id, inventory_count, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                &unit.unit_id,
                &unit.name,
                &unit.recipe_id,
                unit.inventory_count,
                format_ts(&unit.updated_at),
            ],
        )?;
        Ok(unit.unit_id.clone())
    }

    pub fn find_unit(&self, unit_id: &str) -> RepositoryResult<Option<FinishedUnit>> {
        let conn = self.get_conn()?;
        Self::find_unit_in(&conn, unit_id)
    }

    pub fn find_unit_in(conn: &Connection, unit_id: &str) -> RepositoryResult<Option<FinishedUnit>> {
        let unit = conn
            .query_row(
                r#"SELECT unit_id, name, recipe_id, inventory_count, updated_at
                   FROM finished_unit WHERE unit_id = ?"#,
                params![unit_id],
                |row| {
                    Ok(FinishedUnit {
                        unit_id: row.get(0)?,
                        name: row.get(1)?,
                        recipe_id: row.get(2)?,
                        inventory_count: row.get(3)?,
                        updated_at: parse_ts(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(unit)
    }

    /// 在事务中增加成品单元库存
    pub fn increment_unit_count_tx(tx: &Transaction, unit_id: &str, delta: i64) -> RepositoryResult<()> {
        let rows = tx.execute(
            "UPDATE finished_unit SET inventory_count = inventory_count + ? WHERE unit_id = ?",
            params![delta, unit_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "FinishedUnit".to_string(),
                id: unit_id.to_string(),
            });
        }
        Ok(())
    }

    /// 在事务中扣减成品单元库存（库存不足时不修改，返回 false）
    pub fn decrement_unit_count_tx(tx: &Transaction, unit_id: &str, quantity: i64) -> RepositoryResult<bool> {
        let rows = tx.execute(
            r#"UPDATE finished_unit
               SET inventory_count = inventory_count - ?1
               WHERE unit_id = ?2 AND inventory_count >= ?1"#,
            params![quantity, unit_id],
        )?;
        Ok(rows == 1)
    }

    // ==========================================
    // 成品组合
    // ==========================================

    pub fn insert_good(&self, good: &FinishedGood) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO finished_good (good_id, name, inventory_count, updated_at)
               VALUES (?, ?, ?, ?)"#,
            params![
                &good.good_id,
                &good.name,
                good.inventory_count,
                format_ts(&good.updated_at),
            ],
        )?;
        Ok(good.good_id.clone())
    }

    pub fn find_good(&self, good_id: &str) -> RepositoryResult<Option<FinishedGood>> {
        let conn = self.get_conn()?;
        Self::find_good_in(&conn, good_id)
    }

    pub fn find_good_in(conn: &Connection, good_id: &str) -> RepositoryResult<Option<FinishedGood>> {
        let good = conn
            .query_row(
                r#"SELECT good_id, name, inventory_count, updated_at
                   FROM finished_good WHERE good_id = ?"#,
                params![good_id],
                |row| {
                    Ok(FinishedGood {
                        good_id: row.get(0)?,
                        name: row.get(1)?,
                        inventory_count: row.get(2)?,
                        updated_at: parse_ts(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(good)
    }

    /// 在事务中增加成品组合库存
    pub fn increment_good_count_tx(tx: &Transaction, good_id: &str, delta: i64) -> RepositoryResult<()> {
        let rows = tx.execute(
            "UPDATE finished_good SET inventory_count = inventory_count + ? WHERE good_id = ?",
            params![delta, good_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "FinishedGood".to_string(),
                id: good_id.to_string(),
            });
        }
        Ok(())
    }

    /// 添加组合物料清单边
    pub fn add_composition(&self, composition: &Composition) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO composition (
                composition_id, good_id, component_kind,
                finished_unit_id, finished_good_id, item_id, quantity
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &composition.composition_id,
                &composition.good_id,
                composition.component_kind.as_str(),
                &composition.finished_unit_id,
                &composition.finished_good_id,
                &composition.item_id,
                composition.quantity,
            ],
        )?;
        Ok(composition.composition_id.clone())
    }

    /// 查询组合的直接组件（按 composition_id 排序）
    pub fn list_compositions_in(conn: &Connection, good_id: &str) -> RepositoryResult<Vec<Composition>> {
        let mut stmt = conn.prepare(
            r#"SELECT composition_id, good_id, component_kind,
                      finished_unit_id, finished_good_id, item_id, quantity
               FROM composition
               WHERE good_id = ?
               ORDER BY composition_id"#,
        )?;
        let rows = stmt
            .query_map(params![good_id], |row| {
                let kind_raw: String = row.get(2)?;
                let component_kind = ComponentKind::parse(&kind_raw).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        format!("unknown component_kind: {}", kind_raw).into(),
                    )
                })?;
                Ok(Composition {
                    composition_id: row.get(0)?,
                    good_id: row.get(1)?,
                    component_kind,
                    finished_unit_id: row.get(3)?,
                    finished_good_id: row.get(4)?,
                    item_id: row.get(5)?,
                    quantity: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
