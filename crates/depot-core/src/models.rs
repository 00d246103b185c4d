use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::standards::CostingMethod;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Material {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub costing_method: Option<CostingMethod>,
    pub created_at: DateTime<Utc>,
}

impl Material {
    /// Costing method in effect; weighted average when none was configured.
    pub fn effective_costing_method(&self) -> CostingMethod {
        self.costing_method.unwrap_or_default()
    }
}

/// A received batch of one material in one warehouse.
///
/// `remaining_quantity` only moves through posting batches and stays within
/// `0..=received_quantity`. Lots that reach zero are kept for history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLot {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub lot_number: Option<String>,
    pub manufactured_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    pub received_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub source_document_id: Uuid,
    /// Store-assigned insertion counter; breaks ties between lots created in
    /// the same instant.
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl StockLot {
    pub fn is_depleted(&self) -> bool {
        self.remaining_quantity <= Decimal::ZERO
    }

    /// Creation order key, oldest first.
    pub fn creation_key(&self) -> (DateTime<Utc>, i64) {
        (self.created_at, self.sequence)
    }
}

/// Denormalized on-hand quantity for one (warehouse, material).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stock {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Stock {
    pub fn empty(warehouse_id: Uuid, material_id: Uuid) -> Self {
        Self {
            warehouse_id,
            material_id,
            quantity: Decimal::ZERO,
            updated_at: None,
        }
    }
}

/// Daily movement rollup for one (warehouse, material, day).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockBalance {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub date: NaiveDate,
    pub quantity_in: Decimal,
    pub value_in: Decimal,
    pub quantity_out: Decimal,
    pub value_out: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl StockBalance {
    pub fn net_quantity(&self) -> Decimal {
        self.quantity_in - self.quantity_out
    }

    pub fn net_value(&self) -> Decimal {
        self.value_in - self.value_out
    }
}

/// Quantity drawn from one lot to satisfy one issue or transfer line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueAllocation {
    pub id: Uuid,
    pub document_id: Uuid,
    pub line_no: i32,
    pub lot_id: Uuid,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl IssueAllocation {
    pub fn is_active(&self) -> bool {
        self.reversed_at.is_none()
    }
}
