// ==========================================
// 小批量生产排产系统 - 批次计算器
// ==========================================
// 红线: 批次数只允许向上取整，任何情况下总产量 >= 需求量
// ==========================================
// 职责: 需求量 -> 批次数 + 浪费指标（纯函数）
// ==========================================

use crate::config::planner_config::{DEFAULT_QUANTITY_EPSILON, ROUNDING_RELATIVE_TOLERANCE};
use crate::engine::error::{PlanningError, PlanningResult};
use serde::{Deserialize, Serialize};

/// 浪费指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteMetrics {
    pub total_yield: f64,
    pub waste_units: f64,
    pub waste_percent: f64,
}

/// 批次计划（批次数 + 浪费指标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub units_needed: f64,
    pub yield_per_batch: f64,
    pub batches: u32,
    pub total_yield: f64,
    pub waste_units: f64,
    pub waste_percent: f64,
}

/// 计算批次数（默认容差）
pub fn calculate_batches(units_needed: f64, yield_per_batch: f64) -> PlanningResult<u32> {
    calculate_batches_with_epsilon(units_needed, yield_per_batch, DEFAULT_QUANTITY_EPSILON)
}

/// 计算批次数
///
/// 规则:
/// 1) yield_per_batch <= 0 或非有限值 => Validation
/// 2) units_needed < 0 或非有限值 => Validation
/// 3) 比值在 epsilon 内贴近整数、且该整数批次的产量不低于需求时取该整数
///    （消除浮点噪声），否则向上取整
pub fn calculate_batches_with_epsilon(
    units_needed: f64,
    yield_per_batch: f64,
    epsilon: f64,
) -> PlanningResult<u32> {
    if !yield_per_batch.is_finite() || yield_per_batch <= 0.0 {
        return Err(PlanningError::Validation(format!(
            "每批次产量必须为正数: {}",
            yield_per_batch
        )));
    }
    if !units_needed.is_finite() || units_needed < 0.0 {
        return Err(PlanningError::Validation(format!(
            "需求数量不能为负: {}",
            units_needed
        )));
    }
    if units_needed == 0.0 {
        return Ok(0);
    }

    let ratio = units_needed / yield_per_batch;
    let nearest = ratio.round();
    let covers = nearest * yield_per_batch >= units_needed * (1.0 - ROUNDING_RELATIVE_TOLERANCE);
    let batches = if (ratio - nearest).abs() <= epsilon && covers {
        nearest
    } else {
        ratio.ceil()
    };

    if batches > u32::MAX as f64 {
        return Err(PlanningError::Validation(format!(
            "批次数超出范围: {}",
            batches
        )));
    }
    Ok(batches as u32)
}

/// 计算浪费指标
///
/// total_yield = batches * yield_per_batch
/// waste_units = total_yield - units_needed
/// waste_percent = waste_units / total_yield * 100（total_yield 为 0 时取 0）
pub fn calculate_waste(units_needed: f64, batches: u32, yield_per_batch: f64) -> WasteMetrics {
    let total_yield = batches as f64 * yield_per_batch;
    let waste_units = total_yield - units_needed;
    let waste_percent = if total_yield == 0.0 {
        0.0
    } else {
        waste_units / total_yield * 100.0
    };
    WasteMetrics {
        total_yield,
        waste_units,
        waste_percent,
    }
}

/// 批次计划（批次数 + 浪费）
pub fn plan_batches(units_needed: f64, yield_per_batch: f64, epsilon: f64) -> PlanningResult<BatchPlan> {
    let batches = calculate_batches_with_epsilon(units_needed, yield_per_batch, epsilon)?;
    let waste = calculate_waste(units_needed, batches, yield_per_batch);
    Ok(BatchPlan {
        units_needed,
        yield_per_batch,
        batches,
        total_yield: waste.total_yield,
        waste_units: waste.waste_units,
        waste_percent: waste.waste_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_49_units_at_48_per_batch() {
        let batches = calculate_batches(49.0, 48.0).unwrap();
        assert_eq!(batches, 2);

        let waste = calculate_waste(49.0, batches, 48.0);
        assert_eq!(waste.total_yield, 96.0);
        assert_eq!(waste.waste_units, 47.0);
        assert!((waste.waste_percent - 48.958_333).abs() < 1e-3);
    }

    #[test]
    fn test_300_units_at_48_per_batch() {
        assert_eq!(calculate_batches(300.0, 48.0).unwrap(), 7);
    }

    #[test]
    fn test_exact_multiple_does_not_add_batch() {
        assert_eq!(calculate_batches(96.0, 48.0).unwrap(), 2);
        // 0.1 * 3 在浮点下略大于 0.3
        assert_eq!(calculate_batches(0.1 + 0.2, 0.1).unwrap(), 3);
    }

    #[test]
    fn test_zero_units_needs_zero_batches() {
        assert_eq!(calculate_batches(0.0, 12.0).unwrap(), 0);
        let waste = calculate_waste(0.0, 0, 12.0);
        assert_eq!(waste.waste_percent, 0.0);
    }

    #[test]
    fn test_ceiling_is_sufficient_and_minimal() {
        for yield_per_batch in [1.0, 7.0, 12.0, 48.0, 2.5] {
            for needed in 1..=500 {
                let needed = needed as f64;
                let batches = calculate_batches(needed, yield_per_batch).unwrap();
                assert!(batches as f64 * yield_per_batch >= needed);
                assert!(((batches - 1) as f64) * yield_per_batch < needed);
            }
        }
    }

    #[test]
    fn test_invalid_yield_is_rejected() {
        assert!(matches!(calculate_batches(10.0, 0.0), Err(PlanningError::Validation(_))));
        assert!(matches!(calculate_batches(10.0, -4.0), Err(PlanningError::Validation(_))));
        assert!(matches!(calculate_batches(10.0, f64::NAN), Err(PlanningError::Validation(_))));
        assert!(matches!(calculate_batches(-1.0, 4.0), Err(PlanningError::Validation(_))));
    }

    #[test]
    fn test_plan_batches_combines_both() {
        let plan = plan_batches(49.0, 48.0, 1e-9).unwrap();
        assert_eq!(plan.batches, 2);
        assert_eq!(plan.waste_units, 47.0);
    }

    #[test]
    fn test_loose_epsilon_never_rounds_below_requirement() {
        // 49 / 48 与 1 相差约 0.02，容差再大也不能少做一批
        let plan = plan_batches(49.0, 48.0, 0.05).unwrap();
        assert_eq!(plan.batches, 2);
        assert!(plan.waste_units >= 0.0);

        let plan = plan_batches(95.9, 48.0, 0.5).unwrap();
        assert_eq!(plan.batches, 2);
        assert!(plan.total_yield >= 95.9);
    }
}
