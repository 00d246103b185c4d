use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use depot_core::{
    CostingMethod, DocumentFilter, DocumentKind, DocumentLine, DocumentNumbering, DocumentStatus,
    DocumentTransition, DomainEvent, DomainEventKind, EventStore, IssueAllocation, LedgerBatch,
    LedgerStore, Material, Notifier, PostingNotice, Stock, StockDocument, StockLot, StoreError,
    Warehouse,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::costing::{Valuation, valuation};
use crate::error::{FieldError, InventoryError, InventoryResult};
use crate::ledger::{LotsByMaterial, plan_posting, plan_reversal};
use crate::validation::{
    NewDocument, NewMaterial, NewWarehouse, normalize_code, validate_document, validate_material,
    validate_warehouse,
};
use crate::workflow::{StockEffect, WorkflowAction, transition};

pub const DEFAULT_POSTING_ATTEMPTS: u32 = 3;

/// Entry point for catalog, document workflow and stock queries.
///
/// Stock only moves through [`InventoryService::post`] and
/// [`InventoryService::cancel`], each committed as one [`LedgerBatch`].
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
    numbering: Arc<dyn DocumentNumbering>,
    events: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        numbering: Arc<dyn DocumentNumbering>,
        events: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            numbering,
            events,
            notifier,
            max_attempts: DEFAULT_POSTING_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    pub async fn create_warehouse(&self, input: NewWarehouse) -> InventoryResult<Warehouse> {
        validate_warehouse(&input)?;
        let warehouse = Warehouse {
            id: Uuid::new_v4(),
            code: normalize_code(&input.code),
            name: input.name.trim().to_string(),
            created_at: Utc::now(),
        };

        self.store
            .insert_warehouse(&warehouse)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(message) => InventoryError::field("code", message),
                other => other.into(),
            })?;
        info!(warehouse_id = %warehouse.id, code = %warehouse.code, "warehouse created");
        Ok(warehouse)
    }

    pub async fn create_material(&self, input: NewMaterial) -> InventoryResult<Material> {
        validate_material(&input)?;
        let material = Material {
            id: Uuid::new_v4(),
            code: normalize_code(&input.code),
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            costing_method: input.costing_method,
            created_at: Utc::now(),
        };

        self.store
            .insert_material(&material)
            .await
            .map_err(|err| match err {
                StoreError::Conflict(message) => InventoryError::field("code", message),
                other => other.into(),
            })?;
        info!(material_id = %material.id, code = %material.code, "material created");
        Ok(material)
    }

    pub async fn set_costing_method(
        &self,
        material_id: Uuid,
        method: Option<CostingMethod>,
    ) -> InventoryResult<Material> {
        let material = self
            .store
            .set_costing_method(material_id, method)
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => InventoryError::not_found("material", material_id),
                other => other.into(),
            })?;
        info!(
            material_id = %material.id,
            method = %material.effective_costing_method(),
            "costing method updated"
        );
        Ok(material)
    }

    async fn warehouse(&self, id: Uuid) -> InventoryResult<Warehouse> {
        self.store
            .warehouse(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("warehouse", id))
    }

    async fn material(&self, id: Uuid) -> InventoryResult<Material> {
        self.store
            .material(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("material", id))
    }

    pub async fn document(&self, id: Uuid) -> InventoryResult<StockDocument> {
        self.store
            .document(id)
            .await?
            .ok_or_else(|| InventoryError::not_found("document", id))
    }

    pub async fn create_document(&self, input: NewDocument) -> InventoryResult<StockDocument> {
        validate_document(&input)?;

        let mut missing = Vec::new();
        let warehouse = self.store.warehouse(input.warehouse_id).await?;
        if warehouse.is_none() {
            missing.push(FieldError::new("warehouse_id", "unknown warehouse"));
        }
        if let Some(destination_id) = input.destination_warehouse_id {
            if self.store.warehouse(destination_id).await?.is_none() {
                missing.push(FieldError::new(
                    "destination_warehouse_id",
                    "unknown warehouse",
                ));
            }
        }
        for (index, line) in input.lines.iter().enumerate() {
            if self.store.material(line.material_id).await?.is_none() {
                missing.push(FieldError::new(
                    format!("lines[{index}].material_id"),
                    "unknown material",
                ));
            }
        }
        let Some(warehouse) = warehouse.filter(|_| missing.is_empty()) else {
            return Err(InventoryError::Validation(missing));
        };

        let number = self
            .numbering
            .next_number(input.kind, &warehouse.code)
            .await?;
        let lines = input
            .lines
            .into_iter()
            .zip(1..)
            .map(|(line, line_no)| DocumentLine {
                line_no,
                material_id: line.material_id,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                unit_price: line.unit_price,
                lot_number: line
                    .lot_number
                    .map(|lot| lot.trim().to_string())
                    .filter(|lot| !lot.is_empty()),
                manufactured_on: line.manufactured_on,
                expires_on: line.expires_on,
                allocation: line.allocation,
                posted_unit_cost: None,
                posted_value: None,
            })
            .collect();

        let document = StockDocument {
            id: Uuid::new_v4(),
            number,
            kind: input.kind,
            status: DocumentStatus::New,
            warehouse_id: input.warehouse_id,
            destination_warehouse_id: input.destination_warehouse_id,
            lines,
            note: input.note,
            created_by: input.created_by.trim().to_string(),
            created_at: Utc::now(),
            confirmed_by: None,
            confirmed_at: None,
            posted_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
        };
        self.store.insert_document(&document).await?;

        info!(
            document_id = %document.id,
            number = %document.number,
            kind = %document.kind,
            lines = document.lines.len(),
            "document created"
        );
        self.record_event(&document, DomainEventKind::DocumentCreated)
            .await;
        Ok(document)
    }

    fn check_transition(
        document: &StockDocument,
        action: WorkflowAction,
    ) -> InventoryResult<StockEffect> {
        transition(document.status, action)
            .map(|transition| transition.effect)
            .ok_or_else(|| InventoryError::InvalidTransition {
                document_id: document.id,
                number: document.number.clone(),
                from: document.status,
                action,
            })
    }

    /// New -> Confirmed. Records the approver; stock is untouched.
    pub async fn confirm(&self, id: Uuid, actor: &str) -> InventoryResult<StockDocument> {
        let actor = required_actor(actor)?;
        let document = self.document(id).await?;
        Self::check_transition(&document, WorkflowAction::Confirm)?;

        let mut confirmed = document.clone();
        confirmed.status = DocumentStatus::Confirmed;
        confirmed.confirmed_by = Some(actor);
        confirmed.confirmed_at = Some(Utc::now());

        self.commit_transition(&document, confirmed.clone(), WorkflowAction::Confirm)
            .await?;
        info!(document_id = %id, number = %confirmed.number, "document confirmed");
        self.record_event(&confirmed, DomainEventKind::DocumentConfirmed)
            .await;
        Ok(confirmed)
    }

    async fn commit_transition(
        &self,
        current: &StockDocument,
        next: StockDocument,
        action: WorkflowAction,
    ) -> InventoryResult<()> {
        let batch = LedgerBatch::transition_only(DocumentTransition {
            document: next,
            expected_status: current.status,
        });
        self.store.commit(batch).await.map_err(|err| match err {
            StoreError::Conflict(_) => InventoryError::InvalidTransition {
                document_id: current.id,
                number: current.number.clone(),
                from: current.status,
                action,
            },
            other => other.into(),
        })
    }

    /// Confirmed -> Posted: the only transition that applies stock.
    pub async fn post(&self, id: Uuid) -> InventoryResult<StockDocument> {
        let posted = self.commit_with_retry(id, Plan::Post).await?;

        let event = match posted.kind {
            DocumentKind::Receipt => DomainEventKind::StockReceived,
            DocumentKind::Issue => DomainEventKind::StockIssued,
            DocumentKind::Transfer => DomainEventKind::StockTransferred,
        };
        info!(
            document_id = %posted.id,
            number = %posted.number,
            kind = %posted.kind,
            quantity = %posted.total_quantity(),
            "document posted"
        );
        self.record_event(&posted, event).await;
        self.dispatch_notice(&posted);
        Ok(posted)
    }

    /// Any non-terminal state -> Cancelled. A posted document is reversed in
    /// the same commit.
    pub async fn cancel(
        &self,
        id: Uuid,
        actor: &str,
        reason: Option<String>,
    ) -> InventoryResult<StockDocument> {
        let actor = required_actor(actor)?;
        let reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());

        let document = self.document(id).await?;
        let effect = Self::check_transition(&document, WorkflowAction::Cancel)?;

        let cancelled = if effect == StockEffect::Reverse {
            let plan = Plan::Reverse {
                actor: &actor,
                reason: reason.clone(),
            };
            let cancelled = self.commit_with_retry(id, plan).await?;
            info!(
                document_id = %cancelled.id,
                number = %cancelled.number,
                "posted document reversed"
            );
            self.record_event(&cancelled, DomainEventKind::DocumentReversed)
                .await;
            cancelled
        } else {
            let mut cancelled = document.clone();
            cancelled.status = DocumentStatus::Cancelled;
            cancelled.cancelled_by = Some(actor);
            cancelled.cancelled_at = Some(Utc::now());
            cancelled.cancel_reason = reason;
            self.commit_transition(&document, cancelled.clone(), WorkflowAction::Cancel)
                .await?;
            cancelled
        };

        info!(document_id = %cancelled.id, number = %cancelled.number, "document cancelled");
        self.record_event(&cancelled, DomainEventKind::DocumentCancelled)
            .await;
        self.dispatch_notice(&cancelled);
        Ok(cancelled)
    }

    /// Reloads, replans and recommits while the store reports a conflict.
    async fn commit_with_retry(
        &self,
        id: Uuid,
        plan: Plan<'_>,
    ) -> InventoryResult<StockDocument> {
        let action = plan.action();
        let mut attempt = 1;
        loop {
            let document = self.document(id).await?;
            Self::check_transition(&document, action)?;

            let batch = match &plan {
                Plan::Post => self.plan_posting(&document).await?,
                Plan::Reverse { actor, reason } => {
                    self.plan_reversal(&document, actor, reason.clone()).await?
                }
            };
            let next = batch.transition.document.clone();

            match self.store.commit(batch).await {
                Ok(()) => return Ok(next),
                Err(StoreError::Conflict(reason)) if attempt < self.max_attempts => {
                    warn!(
                        document_id = %id,
                        attempt,
                        %action,
                        "ledger commit conflicted, retrying: {reason}"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    error!(document_id = %id, %action, "ledger commit failed: {err}");
                    return Err(err.into());
                }
            }
        }
    }

    async fn plan_posting(&self, document: &StockDocument) -> InventoryResult<LedgerBatch> {
        let material_ids: HashSet<Uuid> = document
            .lines
            .iter()
            .map(|line| line.material_id)
            .collect();

        let mut materials = HashMap::with_capacity(material_ids.len());
        let mut lots = LotsByMaterial::new();
        for material_id in material_ids {
            materials.insert(material_id, self.material(material_id).await?);
            if document.kind.draws_stock() {
                lots.insert(
                    material_id,
                    self.store.lots(document.warehouse_id, material_id).await?,
                );
            }
        }

        plan_posting(document, &materials, lots, Utc::now())
    }

    async fn plan_reversal(
        &self,
        document: &StockDocument,
        actor: &str,
        reason: Option<String>,
    ) -> InventoryResult<LedgerBatch> {
        let allocations = self.store.allocations(document.id).await?;
        let created_lots = self.store.lots_from_document(document.id).await?;
        debug!(
            document_id = %document.id,
            allocations = allocations.len(),
            created_lots = created_lots.len(),
            "planning reversal"
        );
        plan_reversal(
            document,
            &allocations,
            &created_lots,
            actor,
            reason,
            Utc::now(),
        )
    }

    pub async fn warehouses(&self) -> InventoryResult<Vec<Warehouse>> {
        Ok(self.store.warehouses().await?)
    }

    pub async fn materials(&self) -> InventoryResult<Vec<Material>> {
        Ok(self.store.materials().await?)
    }

    pub async fn documents(&self, filter: &DocumentFilter) -> InventoryResult<Vec<StockDocument>> {
        Ok(self.store.documents(filter).await?)
    }

    pub async fn stock(&self, warehouse_id: Uuid, material_id: Uuid) -> InventoryResult<Stock> {
        Ok(self.store.stock(warehouse_id, material_id).await?)
    }

    pub async fn lots(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> InventoryResult<Vec<StockLot>> {
        Ok(self.store.lots(warehouse_id, material_id).await?)
    }

    pub async fn allocations(&self, document_id: Uuid) -> InventoryResult<Vec<IssueAllocation>> {
        self.document(document_id).await?;
        Ok(self.store.allocations(document_id).await?)
    }

    /// Current unit cost and value of a key under the material's method.
    pub async fn valuation(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> InventoryResult<Valuation> {
        self.warehouse(warehouse_id).await?;
        let material = self.material(material_id).await?;
        let lots = self.store.lots(warehouse_id, material_id).await?;
        Ok(valuation(material.effective_costing_method(), &lots))
    }

    async fn record_event(&self, document: &StockDocument, kind: DomainEventKind) {
        let event = DomainEvent::new(
            document.id,
            kind,
            json!({
                "number": document.number,
                "kind": document.kind,
                "status": document.status,
                "warehouse_id": document.warehouse_id,
                "destination_warehouse_id": document.destination_warehouse_id,
            }),
        );
        if let Err(err) = self.events.append(document.id, event).await {
            warn!(document_id = %document.id, ?kind, "failed to record domain event: {err:#}");
        }
    }

    /// Publishes the document's new state without waiting for delivery. A
    /// failed delivery is logged and kept as a `NotificationFailed` event.
    pub fn dispatch_notice(&self, document: &StockDocument) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let events = Arc::clone(&self.events);
        let notice = PostingNotice::for_document(document);

        tokio::spawn(async move {
            let Err(err) = notifier.notify(&notice).await else {
                return;
            };
            warn!(
                document_id = %notice.document_id,
                number = %notice.number,
                "notification delivery failed: {err:#}"
            );
            let event = DomainEvent::new(
                notice.document_id,
                DomainEventKind::NotificationFailed,
                json!({
                    "number": notice.number,
                    "status": notice.status,
                    "error": format!("{err:#}"),
                }),
            );
            if let Err(err) = events.append(notice.document_id, event).await {
                error!(
                    document_id = %notice.document_id,
                    "failed to record notification failure: {err:#}"
                );
            }
        })
    }
}

/// Stock-moving work that is replanned from fresh state on every attempt.
enum Plan<'a> {
    Post,
    Reverse {
        actor: &'a str,
        reason: Option<String>,
    },
}

impl Plan<'_> {
    fn action(&self) -> WorkflowAction {
        match self {
            Self::Post => WorkflowAction::Post,
            Self::Reverse { .. } => WorkflowAction::Cancel,
        }
    }
}

fn required_actor(actor: &str) -> InventoryResult<String> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(InventoryError::field("actor", "actor is required"));
    }
    Ok(actor.to_string())
}
