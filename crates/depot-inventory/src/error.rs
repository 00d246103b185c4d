use depot_core::{DocumentStatus, StoreError};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::workflow::WorkflowAction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error(
        "insufficient stock of {material_code}: requested {requested}, available {available}, short by {shortfall}"
    )]
    InsufficientStock {
        material_id: Uuid,
        material_code: String,
        requested: Decimal,
        available: Decimal,
        shortfall: Decimal,
    },

    #[error("cannot {action} document {number} while it is {from}")]
    InvalidTransition {
        document_id: Uuid,
        number: String,
        from: DocumentStatus,
        action: WorkflowAction,
    },

    #[error("document {number} cannot be reversed: lot {lot_id} has already been drawn from")]
    ReversalBlocked { number: String, lot_id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InventoryError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// A sum or product left the range of `Decimal`.
    pub fn out_of_range(field: impl Into<String>) -> Self {
        Self::field(field, "amount is out of range")
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type InventoryResult<T> = Result<T, InventoryError>;
