//! Inventory and profitability reports built from the stock ledger.

mod builder;
mod period;
pub mod reports;

use chrono::NaiveDate;
use depot_core::StoreError;
use thiserror::Error;

pub use builder::{Labels, ReportBuilder, StoreLabels};
pub use period::{ReportKind, ReportPeriod};
pub use reports::Report;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown report kind: {0}")]
    UnknownKind(String),

    #[error("report period ends ({to}) before it starts ({from})")]
    InvalidPeriod { from: NaiveDate, to: NaiveDate },

    #[error(transparent)]
    Store(#[from] StoreError),
}
