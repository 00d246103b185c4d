use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Receipt,
    Issue,
    Transfer,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "RECEIPT",
            Self::Issue => "ISSUE",
            Self::Transfer => "TRANSFER",
        }
    }

    /// Prefix used in human-readable document numbers.
    pub fn number_prefix(&self) -> &'static str {
        match self {
            Self::Receipt => "RC",
            Self::Issue => "IS",
            Self::Transfer => "TR",
        }
    }

    /// Whether posting this kind draws stock out of `warehouse_id`.
    pub fn draws_stock(&self) -> bool {
        matches!(self, Self::Issue | Self::Transfer)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RECEIPT" => Ok(Self::Receipt),
            "ISSUE" => Ok(Self::Issue),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(format!("unsupported document kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    New,
    Confirmed,
    Posted,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Confirmed => "CONFIRMED",
            Self::Posted => "POSTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "CONFIRMED" => Ok(Self::Confirmed),
            "POSTED" => Ok(Self::Posted),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unsupported document status: {other}")),
        }
    }
}

/// Caller-chosen quantity to take from a specific lot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentLine {
    pub line_no: i32,
    pub material_id: Uuid,
    pub quantity: Decimal,
    /// Purchase cost per unit; receipts only.
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    /// Sale price per unit; issues only, feeds revenue reports.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub manufactured_on: Option<NaiveDate>,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    /// Explicit lot selection overriding FEFO.
    #[serde(default)]
    pub allocation: Option<Vec<LotDraw>>,
    #[serde(default)]
    pub posted_unit_cost: Option<Decimal>,
    #[serde(default)]
    pub posted_value: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockDocument {
    pub id: Uuid,
    pub number: String,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub warehouse_id: Uuid,
    pub destination_warehouse_id: Option<Uuid>,
    pub lines: Vec<DocumentLine>,
    pub note: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl StockDocument {
    pub fn line(&self, line_no: i32) -> Option<&DocumentLine> {
        self.lines.iter().find(|line| line.line_no == line_no)
    }

    /// Day the stock effect of this document was booked, if posted.
    pub fn posting_date(&self) -> Option<NaiveDate> {
        self.posted_at.map(|at| at.date_naive())
    }

    pub fn total_quantity(&self) -> Decimal {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}
