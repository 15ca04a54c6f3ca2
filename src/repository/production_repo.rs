// ==========================================
// 小批量生产排产系统 - 生产记录仓储
// ==========================================
// 红线: 生产记录与原料消耗记录只在同一事务中成对写入
// ==========================================

use crate::domain::production::{ConsumptionRecord, ProductionRun};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, parse_ts};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

const RUN_COLUMNS: &str = "run_id, recipe_id, finished_unit_id, snapshot_id, batches, \
     expected_yield, actual_yield, total_cost, per_unit_cost, produced_at, notes";

// ==========================================
// ProductionRunRepository - 生产记录仓储
// ==========================================
pub struct ProductionRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductionRunRepository {
    /// 创建新的ProductionRunRepository实例
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
    // 查询
    // ==========================================

    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ProductionRun>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM production_run WHERE run_id = ?", RUN_COLUMNS);
        let run = conn.query_row(&sql, params![run_id], Self::map_run).optional()?;
        Ok(run)
    }

    /// 查询配方的生产历史（按生产时间倒序）
    pub fn list_for_recipe(&self, recipe_id: &str) -> RepositoryResult<Vec<ProductionRun>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM production_run WHERE recipe_id = ? ORDER BY produced_at DESC, run_id DESC",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![recipe_id], Self::map_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// 查询生产记录的原料消耗明细
    pub fn list_consumption(&self, run_id: &str) -> RepositoryResult<Vec<ConsumptionRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT record_id, run_id, item_id, quantity, unit, total_cost
               FROM production_consumption
               WHERE run_id = ?
               ORDER BY item_id"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ConsumptionRecord {
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

    pub fn count_runs(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM production_run", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn count_consumption_records(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM production_consumption", [], |row| row.get(0))?;
        Ok(n)
    }

    /// 导入无快照的历史生产记录（快照功能上线前的数据）
    pub fn insert_legacy_run(&self, run: &ProductionRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        Self::insert_run_tx(&tx, run)?;
        tx.commit()?;
        Ok(())
    }

    // ==========================================
    // 事务内调用
    // ==========================================

    pub fn insert_run_tx(tx: &Transaction, run: &ProductionRun) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO production_run (
                run_id, recipe_id, finished_unit_id, snapshot_id, batches,
                expected_yield, actual_yield, total_cost, per_unit_cost,
                produced_at, notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &run.run_id,
                &run.recipe_id,
                &run.finished_unit_id,
                &run.snapshot_id,
                run.batches,
                run.expected_yield,
                run.actual_yield,
                run.total_cost,
                run.per_unit_cost,
                format_ts(&run.produced_at),
                &run.notes,
            ],
        )?;
        Ok(())
    }

    pub fn insert_consumption_tx(tx: &Transaction, record: &ConsumptionRecord) -> RepositoryResult<()> {
        tx.execute(
            r#"INSERT INTO production_consumption (
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

    /// 查询缺少快照的生产记录（回填用）
    pub fn list_missing_snapshot_in(conn: &Connection) -> RepositoryResult<Vec<ProductionRun>> {
        let sql = format!(
            "SELECT {} FROM production_run WHERE snapshot_id IS NULL ORDER BY produced_at ASC, run_id ASC",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map([], Self::map_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// 为历史记录挂接快照（仅允许 NULL -> 值）
    pub fn attach_snapshot_tx(tx: &Transaction, run_id: &str, snapshot_id: &str) -> RepositoryResult<()> {
        let rows = tx.execute(
            "UPDATE production_run SET snapshot_id = ? WHERE run_id = ? AND snapshot_id IS NULL",
            params![snapshot_id, run_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::ValidationError(format!(
                "生产记录 {} 不存在或已有快照",
                run_id
            )));
        }
        Ok(())
    }

    /// 成品单元最近一次生产的单位成本
    pub fn latest_unit_cost_in(conn: &Connection, finished_unit_id: &str) -> RepositoryResult<Option<f64>> {
        let cost = conn
            .query_row(
                r#"SELECT per_unit_cost FROM production_run
                   WHERE finished_unit_id = ? AND actual_yield > 0
                   ORDER BY produced_at DESC, run_id DESC
                   LIMIT 1"#,
                params![finished_unit_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cost)
    }

    fn map_run(row: &rusqlite::Row) -> rusqlite::Result<ProductionRun> {
        Ok(ProductionRun {
            run_id: row.get(0)?,
            recipe_id: row.get(1)?,
            finished_unit_id: row.get(2)?,
            snapshot_id: row.get(3)?,
            batches: row.get(4)?,
            expected_yield: row.get(5)?,
            actual_yield: row.get(6)?,
            total_cost: row.get(7)?,
            per_unit_cost: row.get(8)?,
            produced_at: parse_ts(row, 9)?,
            notes: row.get(10)?,
        })
    }
}
