use chrono::{DateTime, NaiveDate, Utc};
use depot_core::{CostingMethod, EventEnvelope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub actor: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `null` resets the material to the default method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCostingMethodRequest {
    #[serde(default)]
    pub costing_method: Option<CostingMethod>,
}

/// Query strings stay raw so bad values come back as field errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDocumentsQuery {
    pub kind: Option<String>,
    pub status: Option<String>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationFailuresQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

impl ErrorBody {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailureView {
    pub sequence: i64,
    pub document_id: Uuid,
    pub number: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl From<&EventEnvelope> for NotificationFailureView {
    fn from(envelope: &EventEnvelope) -> Self {
        let field = |name: &str| {
            envelope
                .event
                .payload
                .get(name)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };
        Self {
            sequence: envelope.sequence,
            document_id: envelope.event.aggregate_id,
            number: field("number"),
            status: field("status"),
            error: field("error"),
            occurred_at: envelope.event.occurred_at,
        }
    }
}
