use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    InventoryValuation,
    StockMovement,
    Revenue,
    Cogs,
    ProfitAndLoss,
    TurnoverRate,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        Self::InventoryValuation,
        Self::StockMovement,
        Self::Revenue,
        Self::Cogs,
        Self::ProfitAndLoss,
        Self::TurnoverRate,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::InventoryValuation => "inventory-valuation",
            Self::StockMovement => "stock-movement",
            Self::Revenue => "revenue",
            Self::Cogs => "cogs",
            Self::ProfitAndLoss => "profit-and-loss",
            Self::TurnoverRate => "turnover-rate",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug() == value)
            .ok_or(ReportError::UnknownKind(value))
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl ReportPeriod {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ReportError> {
        if to < from {
            return Err(ReportError::InvalidPeriod { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_url_segments() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.slug().parse::<ReportKind>().unwrap(), kind);
        }
        assert_eq!(
            "Profit-And-Loss".parse::<ReportKind>().unwrap(),
            ReportKind::ProfitAndLoss
        );
        assert!(matches!(
            "balance-sheet".parse::<ReportKind>(),
            Err(ReportError::UnknownKind(_))
        ));
    }

    #[test]
    fn period_is_inclusive_and_ordered() {
        let from = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let period = ReportPeriod::new(from, to).unwrap();
        assert!(period.contains(from));
        assert!(period.contains(to));
        assert!(!period.contains(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));

        assert!(matches!(
            ReportPeriod::new(to, from),
            Err(ReportError::InvalidPeriod { .. })
        ));
        assert!(ReportPeriod::new(from, from).is_ok());
    }
}
