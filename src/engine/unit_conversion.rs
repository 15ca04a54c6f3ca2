// ==========================================
// 小批量生产排产系统 - 单位换算服务接口
// ==========================================
// 职责: 定义换算 trait（外部服务），引擎只依赖 trait
// 默认实现: 同量纲系数表（质量 / 体积 / 计数）
// ==========================================

use std::collections::HashMap;
use thiserror::Error;

/// 单位换算失败（不兼容或未知单位）
#[derive(Error, Debug, Clone, PartialEq)]
#[error("无法换算 {quantity} {from} -> {to}")]
pub struct UnitConversionError {
    pub quantity: f64,
    pub from: String,
    pub to: String,
}

/// 单位换算服务
pub trait UnitConverter: Send + Sync {
    /// 将 quantity 从 from 单位换算到 to 单位
    fn convert(&self, quantity: f64, from: &str, to: &str) -> Result<f64, UnitConversionError>;
}

// ==========================================
// FactorTableConverter - 系数表换算
// ==========================================
// 每个单位登记 (量纲, 相对基准单位的系数)
#[derive(Debug, Clone, Default)]
pub struct FactorTableConverter {
    factors: HashMap<String, (String, f64)>,
}

impl FactorTableConverter {
    /// 空表（仅支持同名单位）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 登记单位
    pub fn with_unit(mut self, unit: &str, dimension: &str, factor_to_base: f64) -> Self {
        self.factors.insert(
            normalize(unit),
            (dimension.to_string(), factor_to_base),
        );
        self
    }

    /// 常用厨房单位（质量基准 g，体积基准 ml，计数基准 each）
    pub fn standard() -> Self {
        Self::empty()
            .with_unit("g", "mass", 1.0)
            .with_unit("kg", "mass", 1000.0)
            .with_unit("oz", "mass", 28.349_523_125)
            .with_unit("lb", "mass", 453.592_37)
            .with_unit("ml", "volume", 1.0)
            .with_unit("l", "volume", 1000.0)
            .with_unit("tsp", "volume", 4.928_921_593_75)
            .with_unit("tbsp", "volume", 14.786_764_781_25)
            .with_unit("cup", "volume", 236.588_236_5)
            .with_unit("each", "count", 1.0)
            .with_unit("dozen", "count", 12.0)
    }
}

fn normalize(unit: &str) -> String {
    unit.trim().to_ascii_lowercase()
}

impl UnitConverter for FactorTableConverter {
    fn convert(&self, quantity: f64, from: &str, to: &str) -> Result<f64, UnitConversionError> {
        let from_key = normalize(from);
        let to_key = normalize(to);
        if from_key == to_key {
            return Ok(quantity);
        }

        let err = || UnitConversionError {
            quantity,
            from: from.to_string(),
            to: to.to_string(),
        };

        let (from_dim, from_factor) = self.factors.get(&from_key).ok_or_else(err)?;
        let (to_dim, to_factor) = self.factors.get(&to_key).ok_or_else(err)?;
        if from_dim != to_dim || *to_factor == 0.0 {
            return Err(err());
        }
        Ok(quantity * from_factor / to_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_unit_is_identity_even_if_unknown() {
        let conv = FactorTableConverter::empty();
        assert_eq!(conv.convert(3.5, "box", "BOX").unwrap(), 3.5);
    }

    #[test]
    fn test_standard_mass_conversion() {
        let conv = FactorTableConverter::standard();
        assert!((conv.convert(2.0, "kg", "g").unwrap() - 2000.0).abs() < 1e-9);
        assert!((conv.convert(1.0, "dozen", "each").unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_dimension_fails() {
        let conv = FactorTableConverter::standard();
        let err = conv.convert(1.0, "kg", "ml").unwrap_err();
        assert_eq!(err.from, "kg");
        assert_eq!(err.to, "ml");
    }
}
