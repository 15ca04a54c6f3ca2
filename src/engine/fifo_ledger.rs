// ==========================================
// 小批量生产排产系统 - FIFO 库存扣减台账
// ==========================================
// 红线: 按入库时间先进先出；任何批次余量不得为负
// 红线: 试算与实扣共用同一套批次选择与成本计算
// ==========================================
// 职责: 物料需求 -> 批次扣减明细 + 成本归集
// 流程: 读取未用尽批次 -> plan_fifo_draws -> (实扣) 回写批次余量
// ==========================================

use crate::config::PlannerConfig;
use crate::db::with_transaction;
use crate::domain::inventory::{ConsumptionResult, InventoryLot, LotDraw};
use crate::engine::error::{PlanningError, PlanningResult};
use crate::engine::unit_conversion::UnitConverter;
use crate::repository::InventoryRepository;
use rusqlite::{Connection, Transaction};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

// ==========================================
// 纯函数: 批次扣减规划
// ==========================================

/// 规划 FIFO 扣减（不修改任何状态）
///
/// 规则:
/// 1) 批次按 (acquired_at, lot_id) 升序
/// 2) 每个批次只扣减所需的最小量
/// 3) 批次单位与请求单位不同时经换算服务折算，任一换算失败即整体失败
/// 4) 批次全部用尽仍不足时返回 shortfall > 0 / satisfied = false
pub fn plan_fifo_draws(
    item_id: &str,
    lots: &[InventoryLot],
    quantity_needed: f64,
    unit: &str,
    converter: &dyn UnitConverter,
    epsilon: f64,
    dry_run: bool,
) -> PlanningResult<ConsumptionResult> {
    if !quantity_needed.is_finite() || quantity_needed < 0.0 {
        return Err(PlanningError::Validation(format!(
            "扣减数量不能为负: {}",
            quantity_needed
        )));
    }

    let mut ordered: Vec<&InventoryLot> = lots
        .iter()
        .filter(|lot| lot.item_id == item_id && lot.quantity_remaining > 0.0)
        .collect();
    ordered.sort_by(|a, b| {
        a.acquired_at
            .cmp(&b.acquired_at)
            .then_with(|| a.lot_id.cmp(&b.lot_id))
    });

    let mut outstanding = quantity_needed;
    let mut breakdown = Vec::new();
    let mut total_cost = 0.0;
    let mut missing_cost = false;

    for lot in ordered {
        if outstanding <= epsilon {
            break;
        }

        let available_in_request = converter.convert(lot.quantity_remaining, &lot.unit, unit)?;
        if available_in_request <= 0.0 {
            continue;
        }

        let draw_in_request = outstanding.min(available_in_request);
        let exhausts_lot = draw_in_request >= available_in_request - epsilon;
        let draw_from_lot = if exhausts_lot {
            lot.quantity_remaining
        } else {
            lot.quantity_remaining * draw_in_request / available_in_request
        };
        let remaining_after = if exhausts_lot {
            0.0
        } else {
            (lot.quantity_remaining - draw_from_lot).max(0.0)
        };

        let cost = match lot.unit_cost {
            Some(unit_cost) => unit_cost * draw_from_lot,
            None => {
                missing_cost = true;
                0.0
            }
        };
        total_cost += cost;

        breakdown.push(LotDraw {
            lot_id: lot.lot_id.clone(),
            acquired_at: lot.acquired_at,
            lot_unit: lot.unit.clone(),
            quantity_from_lot: draw_from_lot,
            quantity_in_request: draw_in_request,
            unit_cost: lot.unit_cost,
            cost,
            remaining_after,
        });

        outstanding -= draw_in_request;
    }

    let shortfall = if outstanding > epsilon { outstanding } else { 0.0 };
    let consumed = quantity_needed - shortfall;

    Ok(ConsumptionResult {
        item_id: item_id.to_string(),
        requested: quantity_needed,
        unit: unit.to_string(),
        consumed,
        breakdown,
        shortfall,
        satisfied: shortfall == 0.0,
        total_cost,
        missing_cost,
        dry_run,
    })
}

// ==========================================
// FifoLedger - FIFO 扣减台账
// ==========================================
pub struct FifoLedger {
    conn: Arc<Mutex<Connection>>,
    converter: Arc<dyn UnitConverter>,
    config: PlannerConfig,
}

impl FifoLedger {
    pub fn new(conn: Arc<Mutex<Connection>>, converter: Arc<dyn UnitConverter>, config: PlannerConfig) -> Self {
        Self { conn, converter, config }
    }

    pub fn converter(&self) -> &dyn UnitConverter {
        self.converter.as_ref()
    }

    /// 扣减物料（dry_run = true 时只规划不回写）
    ///
    /// # 参数
    /// - tx: 调用方事务；None 时自行开启并提交
    ///
    /// 实扣且库存不足时，已有批次按规划扣减，结果带 shortfall；
    /// 需要“全有或全无”的调用方应在事务内检查 satisfied 并回滚
    pub fn consume(
        &self,
        item_id: &str,
        quantity_needed: f64,
        unit: &str,
        dry_run: bool,
        tx: Option<&Transaction<'_>>,
    ) -> PlanningResult<ConsumptionResult> {
        with_transaction(&self.conn, tx, |tx| {
            Self::consume_tx(
                tx,
                self.converter.as_ref(),
                &self.config,
                item_id,
                quantity_needed,
                unit,
                dry_run,
            )
        })
    }

    /// 事务内扣减
    #[instrument(skip_all, fields(item_id = %item_id, quantity = quantity_needed, unit = %unit, dry_run = dry_run))]
    pub fn consume_tx(
        tx: &Transaction<'_>,
        converter: &dyn UnitConverter,
        config: &PlannerConfig,
        item_id: &str,
        quantity_needed: f64,
        unit: &str,
        dry_run: bool,
    ) -> PlanningResult<ConsumptionResult> {
        let lots = InventoryRepository::list_open_lots_fifo_in(tx, item_id)?;
        let result = plan_fifo_draws(
            item_id,
            &lots,
            quantity_needed,
            unit,
            converter,
            config.quantity_epsilon,
            dry_run,
        )?;

        for draw in &result.breakdown {
            debug!(
                lot_id = %draw.lot_id,
                from_lot = draw.quantity_from_lot,
                lot_unit = %draw.lot_unit,
                remaining_after = draw.remaining_after,
                "批次扣减"
            );
        }

        if !result.satisfied {
            warn!(
                item_id = %item_id,
                requested = quantity_needed,
                shortfall = result.shortfall,
                "FIFO 库存不足"
            );
        }

        if !dry_run {
            for draw in &result.breakdown {
                InventoryRepository::set_lot_remaining_tx(tx, &draw.lot_id, draw.remaining_after)?;
            }
            info!(
                item_id = %item_id,
                consumed = result.consumed,
                lots = result.breakdown.len(),
                total_cost = result.total_cost,
                "FIFO 扣减完成"
            );
        }

        Ok(result)
    }

    /// 可用总量（折算为请求单位）
    pub fn available_quantity(&self, item_id: &str, unit: &str, tx: Option<&Transaction<'_>>) -> PlanningResult<f64> {
        with_transaction(&self.conn, tx, |tx| {
            Self::available_quantity_in(tx, self.converter.as_ref(), item_id, unit)
        })
    }

    pub fn available_quantity_in(
        conn: &Connection,
        converter: &dyn UnitConverter,
        item_id: &str,
        unit: &str,
    ) -> PlanningResult<f64> {
        let lots = InventoryRepository::list_open_lots_fifo_in(conn, item_id)?;
        let mut total = 0.0;
        for lot in &lots {
            total += converter.convert(lot.quantity_remaining, &lot.unit, unit)?;
        }
        Ok(total)
    }
}
