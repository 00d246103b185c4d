use chrono::NaiveDate;
use depot_core::{AMOUNT_LIMIT, CostingMethod, DocumentKind, LotDraw, MAX_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FieldError, InventoryError, InventoryResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub code: String,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub costing_method: Option<CostingMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocumentLine {
    pub material_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub manufactured_on: Option<NaiveDate>,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub allocation: Option<Vec<LotDraw>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub warehouse_id: Uuid,
    #[serde(default)]
    pub destination_warehouse_id: Option<Uuid>,
    pub lines: Vec<NewDocumentLine>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_by: String,
}

pub(crate) fn normalize_code(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

fn required(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    }
}

/// Magnitude and precision limits of the ledger columns.
fn within_limits(errors: &mut Vec<FieldError>, field: String, value: Decimal) {
    if value.abs() >= AMOUNT_LIMIT {
        errors.push(FieldError::new(field, format!("must be below {AMOUNT_LIMIT}")));
    } else if value.normalize().scale() > MAX_SCALE {
        errors.push(FieldError::new(
            field,
            format!("at most {MAX_SCALE} decimal places are allowed"),
        ));
    }
}

fn into_result(errors: Vec<FieldError>) -> InventoryResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(InventoryError::Validation(errors))
    }
}

pub fn validate_warehouse(input: &NewWarehouse) -> InventoryResult<()> {
    let mut errors = Vec::new();
    required(&mut errors, "code", &input.code);
    required(&mut errors, "name", &input.name);
    into_result(errors)
}

pub fn validate_material(input: &NewMaterial) -> InventoryResult<()> {
    let mut errors = Vec::new();
    required(&mut errors, "code", &input.code);
    required(&mut errors, "name", &input.name);
    required(&mut errors, "unit", &input.unit);
    into_result(errors)
}

/// Shape checks that need no lookups. Every problem is reported, not just
/// the first.
pub fn validate_document(input: &NewDocument) -> InventoryResult<()> {
    let mut errors = Vec::new();
    required(&mut errors, "created_by", &input.created_by);

    match (input.kind, input.destination_warehouse_id) {
        (DocumentKind::Transfer, None) => errors.push(FieldError::new(
            "destination_warehouse_id",
            "transfers need a destination warehouse",
        )),
        (DocumentKind::Transfer, Some(destination)) if destination == input.warehouse_id => {
            errors.push(FieldError::new(
                "destination_warehouse_id",
                "destination must differ from the source warehouse",
            ))
        }
        (DocumentKind::Receipt | DocumentKind::Issue, Some(_)) => errors.push(FieldError::new(
            "destination_warehouse_id",
            "only transfers have a destination warehouse",
        )),
        _ => {}
    }

    if input.lines.is_empty() {
        errors.push(FieldError::new("lines", "at least one line is required"));
    }

    for (index, line) in input.lines.iter().enumerate() {
        let field = |name: &str| format!("lines[{index}].{name}");

        if line.quantity <= Decimal::ZERO {
            errors.push(FieldError::new(field("quantity"), "quantity must be positive"));
        } else {
            within_limits(&mut errors, field("quantity"), line.quantity);
        }
        match line.unit_cost {
            Some(cost) if cost < Decimal::ZERO => {
                errors.push(FieldError::new(field("unit_cost"), "unit cost cannot be negative"))
            }
            Some(cost) => within_limits(&mut errors, field("unit_cost"), cost),
            None => {}
        }
        match line.unit_price {
            Some(price) if price < Decimal::ZERO => {
                errors.push(FieldError::new(field("unit_price"), "unit price cannot be negative"))
            }
            Some(price) => within_limits(&mut errors, field("unit_price"), price),
            None => {}
        }
        if let (Some(made), Some(expires)) = (line.manufactured_on, line.expires_on) {
            if expires < made {
                errors.push(FieldError::new(
                    field("expires_on"),
                    "expiry cannot precede the manufacture date",
                ));
            }
        }
        if let Some(allocation) = &line.allocation {
            if input.kind == DocumentKind::Receipt {
                errors.push(FieldError::new(
                    field("allocation"),
                    "receipts create lots and cannot select them",
                ));
            } else if allocation.is_empty() {
                errors.push(FieldError::new(
                    field("allocation"),
                    "an explicit allocation needs at least one lot",
                ));
            } else if allocation.iter().any(|draw| draw.quantity <= Decimal::ZERO) {
                errors.push(FieldError::new(
                    field("allocation"),
                    "every lot draw must be positive",
                ));
            } else {
                for draw in allocation {
                    within_limits(&mut errors, field("allocation"), draw.quantity);
                }
            }
        }
    }

    into_result(errors)
}
