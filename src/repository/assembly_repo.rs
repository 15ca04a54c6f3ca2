// ==========================================
// 小批量生产排产系统 - 组装记录仓储
// ==========================================
// 两套消耗台账分表写入：assembly_unit_consumption / assembly_packaging_consumption
// ==========================================

use crate::domain::assembly::{AssemblyPackagingConsumption, AssemblyRun, AssemblyUnitConsumption};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

// ==========================================
// AssemblyRunRepository - 组装记录仓储
// ==========================================
pub struct AssemblyRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssemblyRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<AssemblyRun>> {
        let conn = self.get_conn()?;
        let run = conn
            .query_row(
                r#"SELECT run_id, good_id, quantity, total_cost, per_unit_cost, assembled_at, notes
                   FROM assembly_run WHERE run_id = ?"#,
                params![run_id],
                |row| {
                    Ok(AssemblyRun {
                        run_id: row.get(0)?,
                        good_id: row.get(1)?,
                        quantity: row.get(2)?,
                        total_cost: row.get(3)?,
                        per_unit_cost: row.get(4)?,
                        assembled_at: parse_ts(row, 5)?,
                        notes: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    pub fn count_runs(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM assembly_run", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn list_unit_consumption(&self, run_id: &str) -> RepositoryResult<Vec<AssemblyUnitConsumption>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT record_id, run_id, finished_unit_id, quantity, unit_cost, total_cost
               FROM assembly_unit_consumption
               WHERE run_id = ?
               ORDER BY finished_unit_id"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(AssemblyUnitConsumption {
                    record_id: row.get(0)?,
                    run_id: row.get(1)?,
                    finished_unit_id: row.get(2)?,
                    quantity: row.get(3)?,
                    unit_cost: row.get(4)?,
                    total_cost: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_packaging_consumption(&self, run_id: &str) -> RepositoryResult<Vec<AssemblyPackagingConsumption>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT record_id, run_id, item_id, quantity, unit, total_cost
               FROM assembly_packaging_consumption
               WHERE run_id = ?
               ORDER BY item_id"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(AssemblyPackagingConsumption {
                    record_id: row.get(0)?,
                    run_id: row.get(1)?,
                    item_id: row.get(2)?,
                    quantity: row.get(3)?,
                    unit: row.get(4)?,
                    total_cost: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ==========================================
    // 事务内调用
    // ==========================================

    pub fn insert_run_tx(tx: &Transaction, run: &AssemblyRun) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO assembly_run (
                run_id, good_id, quantity, total_cost, per_unit_cost, assembled_at, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &run.run_id,
                &run.good_id,
                run.quantity,
                run.total_cost,
                run.per_unit_cost,
                format_ts(&run.assembled_at),
                &run.notes,
            ],
        )?;
        Ok(())
    }

    pub fn insert_unit_consumption_tx(tx: &Transaction, record: &AssemblyUnitConsumption) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO assembly_unit_consumption (
                record_id, run_id, finished_unit_id, quantity, unit_cost, total_cost
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &record.record_id,
                &record.run_id,
                &record.finished_unit_id,
                record.quantity,
                record.unit_cost,
                record.total_cost,
            ],
        )?;
        Ok(())
    }

    pub fn insert_packaging_consumption_tx(
        tx: &Transaction,
        record: &AssemblyPackagingConsumption,
    ) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO assembly_packaging_consumption (
                record_id, run_id, item_id, quantity, unit, total_cost
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                &record.record_id,
                &record.run_id,
                &record.item_id,
                record.quantity,
                &record.unit,
                record.total_cost,
            ],
        )?;
        Ok(())
    }
}
