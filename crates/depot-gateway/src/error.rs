use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use depot_core::StoreError;
use depot_finance::ReportError;
use depot_inventory::{FieldError, InventoryError};
use depot_platform::{ErrorBody, ErrorDetail};
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::message(error),
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody {
                error: "validation failed".to_string(),
                details: errors
                    .into_iter()
                    .map(|err| ErrorDetail {
                        field: err.field,
                        message: err.message,
                    })
                    .collect(),
            },
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::validation(vec![FieldError::new(field, message)])
    }

    /// Backend failures are logged in full; callers only see a generic message.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        error!("request failed: {err:#}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            StoreError::Conflict(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            StoreError::Backend(err) => Self::internal(err),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Validation(errors) => Self::validation(errors),
            InventoryError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            InventoryError::InsufficientStock { .. }
            | InventoryError::InvalidTransition { .. }
            | InventoryError::ReversalBlocked { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
            InventoryError::Store(err) => err.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UnknownKind(_) => Self::field("kind", err.to_string()),
            ReportError::InvalidPeriod { .. } => Self::field("to", err.to_string()),
            ReportError::Store(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn inventory_errors_map_to_http_statuses() {
        let shortage = InventoryError::InsufficientStock {
            material_id: Uuid::new_v4(),
            material_code: "VT-01".to_string(),
            requested: dec!(20),
            available: dec!(15),
            shortfall: dec!(5),
        };
        assert_eq!(ApiError::from(shortage).status(), StatusCode::CONFLICT);

        let missing = InventoryError::not_found("document", Uuid::new_v4());
        assert_eq!(ApiError::from(missing).status(), StatusCode::NOT_FOUND);

        let backend = InventoryError::Store(StoreError::Backend(anyhow::anyhow!("pool closed")));
        let api = ApiError::from(backend);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.error, "internal server error");
    }

    #[test]
    fn validation_errors_keep_every_field() {
        let api = ApiError::from(InventoryError::Validation(vec![
            FieldError::new("lines[0].quantity", "quantity must be positive"),
            FieldError::new("warehouse_id", "warehouse does not exist"),
        ]));
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.body.details.len(), 2);
        assert_eq!(api.body.details[1].field, "warehouse_id");
    }

    #[test]
    fn unknown_report_kind_is_a_field_error() {
        let api = ApiError::from(ReportError::UnknownKind("balance-sheet".to_string()));
        assert_eq!(api.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api.body.details[0].field, "kind");
    }
}
