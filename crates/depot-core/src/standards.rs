use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-material rule for costing outgoing stock.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostingMethod {
    #[default]
    WeightedAverage,
    Fifo,
}

impl CostingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedAverage => "WEIGHTED_AVERAGE",
            Self::Fifo => "FIFO",
        }
    }
}

impl fmt::Display for CostingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostingMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WEIGHTED_AVERAGE" | "AVCO" | "AVERAGE" => Ok(Self::WeightedAverage),
            "FIFO" => Ok(Self::Fifo),
            other => Err(format!("unsupported costing method: {other}")),
        }
    }
}

/// Largest number of decimal places a quantity or cost may carry; the
/// ledger columns hold six.
pub const MAX_SCALE: u32 = 6;

/// Exclusive upper bound for a single quantity, unit cost or unit price.
/// Keeps `quantity * unit_cost` inside the value columns.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Monetary values are stored and returned with two decimals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("fifo".parse::<CostingMethod>(), Ok(CostingMethod::Fifo));
        assert_eq!(
            " avco ".parse::<CostingMethod>(),
            Ok(CostingMethod::WeightedAverage)
        );
        assert!("lifo".parse::<CostingMethod>().is_err());
    }

    #[test]
    fn default_is_weighted_average() {
        assert_eq!(CostingMethod::default(), CostingMethod::WeightedAverage);
    }

    #[test]
    fn rounds_money_to_cents() {
        assert_eq!(round_money(dec!(105.004)), dec!(105.00));
        assert_eq!(round_money(dec!(110.126)), dec!(110.13));
    }

    #[test]
    fn amount_limit_keeps_line_values_in_range() {
        assert_eq!(AMOUNT_LIMIT, dec!(1000000000));
        let largest = dec!(999999999.999999);
        assert!(largest.checked_mul(largest).is_some());
    }
}
