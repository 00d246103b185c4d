use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::documents::{DocumentKind, DocumentStatus, StockDocument};
use crate::events::{DomainEvent, DomainEventKind};
use crate::models::{IssueAllocation, Material, Stock, StockBalance, StockLot, Warehouse};
use crate::standards::CostingMethod;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope>;
    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
    /// Most recent events of one kind across all streams, newest first.
    async fn by_kind(
        &self,
        kind: DomainEventKind,
        limit: usize,
    ) -> anyhow::Result<Vec<EventEnvelope>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub status: Option<DocumentStatus>,
    pub warehouse_id: Option<Uuid>,
    /// Only documents posted on or after this day.
    pub posted_from: Option<NaiveDate>,
    /// Only documents posted on or before this day.
    pub posted_to: Option<NaiveDate>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &StockDocument) -> bool {
        if self.kind.is_some_and(|kind| kind != document.kind) {
            return false;
        }
        if self.status.is_some_and(|status| status != document.status) {
            return false;
        }
        if let Some(warehouse_id) = self.warehouse_id {
            if document.warehouse_id != warehouse_id
                && document.destination_warehouse_id != Some(warehouse_id)
            {
                return false;
            }
        }
        if self.posted_from.is_some() || self.posted_to.is_some() {
            let Some(posted_on) = document.posting_date() else {
                return false;
            };
            if self.posted_from.is_some_and(|from| posted_on < from) {
                return false;
            }
            if self.posted_to.is_some_and(|to| posted_on > to) {
                return false;
            }
        }
        true
    }
}

/// Document state to write, valid only if the stored status still equals
/// `expected_status`.
#[derive(Debug, Clone)]
pub struct DocumentTransition {
    pub document: StockDocument,
    pub expected_status: DocumentStatus,
}

/// Signed change of one lot's remaining quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDelta {
    pub lot_id: Uuid,
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDelta {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub delta: Decimal,
}

/// Amounts added to the daily balance row of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub warehouse_id: Uuid,
    pub material_id: Uuid,
    pub date: NaiveDate,
    pub quantity_in: Decimal,
    pub value_in: Decimal,
    pub quantity_out: Decimal,
    pub value_out: Decimal,
}

impl BalanceDelta {
    pub fn key(&self) -> (Uuid, Uuid, NaiveDate) {
        (self.warehouse_id, self.material_id, self.date)
    }
}

/// Everything one workflow action writes. Stores apply a batch atomically:
/// either every part lands or none does.
///
/// Lot deltas must keep each lot within `0..=received_quantity`; a violation
/// or a stale `expected_status` rejects the batch with
/// [`StoreError::Conflict`].
#[derive(Debug, Clone)]
pub struct LedgerBatch {
    pub transition: DocumentTransition,
    pub new_lots: Vec<StockLot>,
    pub lot_deltas: Vec<LotDelta>,
    pub allocations: Vec<IssueAllocation>,
    /// Marks active allocations of this document as reversed.
    pub reverse_allocations_of: Option<Uuid>,
    pub stock_deltas: Vec<StockDelta>,
    pub balance_deltas: Vec<BalanceDelta>,
}

impl LedgerBatch {
    pub fn transition_only(transition: DocumentTransition) -> Self {
        Self {
            transition,
            new_lots: Vec::new(),
            lot_deltas: Vec::new(),
            allocations: Vec::new(),
            reverse_allocations_of: None,
            stock_deltas: Vec::new(),
            balance_deltas: Vec::new(),
        }
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_warehouse(&self, warehouse: &Warehouse) -> StoreResult<()>;
    async fn warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>>;
    async fn warehouses(&self) -> StoreResult<Vec<Warehouse>>;

    async fn insert_material(&self, material: &Material) -> StoreResult<()>;
    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>>;
    async fn materials(&self) -> StoreResult<Vec<Material>>;
    async fn set_costing_method(
        &self,
        material_id: Uuid,
        method: Option<CostingMethod>,
    ) -> StoreResult<Material>;

    async fn insert_document(&self, document: &StockDocument) -> StoreResult<()>;
    async fn document(&self, id: Uuid) -> StoreResult<Option<StockDocument>>;
    async fn documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<StockDocument>>;

    /// All lots of the key, depleted ones included, oldest first.
    async fn lots(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Vec<StockLot>>;
    async fn lot(&self, id: Uuid) -> StoreResult<Option<StockLot>>;
    async fn lots_from_document(&self, document_id: Uuid) -> StoreResult<Vec<StockLot>>;

    async fn stock(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Stock>;
    async fn stocks(&self, warehouse_id: Option<Uuid>) -> StoreResult<Vec<Stock>>;

    /// Daily balance rows with `from <= date <= to`.
    async fn balances(
        &self,
        warehouse_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<StockBalance>>;

    async fn allocations(&self, document_id: Uuid) -> StoreResult<Vec<IssueAllocation>>;
    async fn allocations_for_lot(&self, lot_id: Uuid) -> StoreResult<Vec<IssueAllocation>>;

    async fn commit(&self, batch: LedgerBatch) -> StoreResult<()>;
}

#[async_trait]
pub trait DocumentNumbering: Send + Sync {
    /// Next number for the (kind, warehouse) sequence, e.g. `RC-HN01-00001`.
    async fn next_number(&self, kind: DocumentKind, warehouse_code: &str) -> StoreResult<String>;
}

/// Summary published after a document changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingNotice {
    pub document_id: Uuid,
    pub number: String,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub warehouse_id: Uuid,
    pub destination_warehouse_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl PostingNotice {
    pub fn for_document(document: &StockDocument) -> Self {
        Self {
            document_id: document.id,
            number: document.number.clone(),
            kind: document.kind,
            status: document.status,
            warehouse_id: document.warehouse_id,
            destination_warehouse_id: document.destination_warehouse_id,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &PostingNotice) -> anyhow::Result<()>;
}
