use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use depot_core::{
    CostingMethod, DocumentFilter, IssueAllocation, LedgerBatch, LedgerStore, Material, Stock,
    StockBalance, StockDocument, StockLot, StoreError, StoreResult, Warehouse,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    warehouses: HashMap<Uuid, Warehouse>,
    materials: HashMap<Uuid, Material>,
    documents: HashMap<Uuid, StockDocument>,
    lots: HashMap<Uuid, StockLot>,
    lot_sequence: i64,
    stocks: HashMap<(Uuid, Uuid), Stock>,
    balances: BTreeMap<(Uuid, Uuid, NaiveDate), StockBalance>,
    allocations: Vec<IssueAllocation>,
}

/// Ledger kept behind one lock, so a batch commit is atomic with respect to
/// every reader and writer.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn checked_sum(current: Decimal, delta: Decimal, what: &str) -> StoreResult<Decimal> {
    current
        .checked_add(delta)
        .ok_or_else(|| StoreError::conflict(format!("{what} would overflow")))
}

fn sorted_lots<'a>(lots: impl Iterator<Item = &'a StockLot>) -> Vec<StockLot> {
    let mut lots: Vec<StockLot> = lots.cloned().collect();
    lots.sort_by_key(StockLot::creation_key);
    lots
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_warehouse(&self, warehouse: &Warehouse) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.warehouses.values().any(|w| w.code == warehouse.code) {
            return Err(StoreError::conflict(format!(
                "warehouse code {} already exists",
                warehouse.code
            )));
        }
        state.warehouses.insert(warehouse.id, warehouse.clone());
        Ok(())
    }

    async fn warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>> {
        Ok(self.state.read().await.warehouses.get(&id).cloned())
    }

    async fn warehouses(&self) -> StoreResult<Vec<Warehouse>> {
        let state = self.state.read().await;
        let mut warehouses: Vec<Warehouse> = state.warehouses.values().cloned().collect();
        warehouses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(warehouses)
    }

    async fn insert_material(&self, material: &Material) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.materials.values().any(|m| m.code == material.code) {
            return Err(StoreError::conflict(format!(
                "material code {} already exists",
                material.code
            )));
        }
        state.materials.insert(material.id, material.clone());
        Ok(())
    }

    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>> {
        Ok(self.state.read().await.materials.get(&id).cloned())
    }

    async fn materials(&self) -> StoreResult<Vec<Material>> {
        let state = self.state.read().await;
        let mut materials: Vec<Material> = state.materials.values().cloned().collect();
        materials.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(materials)
    }

    async fn set_costing_method(
        &self,
        material_id: Uuid,
        method: Option<CostingMethod>,
    ) -> StoreResult<Material> {
        let mut state = self.state.write().await;
        let material = state
            .materials
            .get_mut(&material_id)
            .ok_or_else(|| StoreError::not_found("material", material_id))?;
        material.costing_method = method;
        Ok(material.clone())
    }

    async fn insert_document(&self, document: &StockDocument) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(StoreError::conflict(format!(
                "document {} already exists",
                document.id
            )));
        }
        state.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn document(&self, id: Uuid) -> StoreResult<Option<StockDocument>> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<StockDocument>> {
        let state = self.state.read().await;
        let mut documents: Vec<StockDocument> = state
            .documents
            .values()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }

    async fn lots(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Vec<StockLot>> {
        let state = self.state.read().await;
        Ok(sorted_lots(state.lots.values().filter(|lot| {
            lot.warehouse_id == warehouse_id && lot.material_id == material_id
        })))
    }

    async fn lot(&self, id: Uuid) -> StoreResult<Option<StockLot>> {
        Ok(self.state.read().await.lots.get(&id).cloned())
    }

    async fn lots_from_document(&self, document_id: Uuid) -> StoreResult<Vec<StockLot>> {
        let state = self.state.read().await;
        Ok(sorted_lots(
            state
                .lots
                .values()
                .filter(|lot| lot.source_document_id == document_id),
        ))
    }

    async fn stock(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Stock> {
        let state = self.state.read().await;
        Ok(state
            .stocks
            .get(&(warehouse_id, material_id))
            .cloned()
            .unwrap_or_else(|| Stock::empty(warehouse_id, material_id)))
    }

    async fn stocks(&self, warehouse_id: Option<Uuid>) -> StoreResult<Vec<Stock>> {
        let state = self.state.read().await;
        let mut stocks: Vec<Stock> = state
            .stocks
            .values()
            .filter(|stock| warehouse_id.is_none_or(|id| stock.warehouse_id == id))
            .cloned()
            .collect();
        stocks.sort_by_key(|stock| (stock.warehouse_id, stock.material_id));
        Ok(stocks)
    }

    async fn balances(
        &self,
        warehouse_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<StockBalance>> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .values()
            .filter(|balance| balance.date >= from && balance.date <= to)
            .filter(|balance| warehouse_id.is_none_or(|id| balance.warehouse_id == id))
            .cloned()
            .collect())
    }

    async fn allocations(&self, document_id: Uuid) -> StoreResult<Vec<IssueAllocation>> {
        let state = self.state.read().await;
        Ok(state
            .allocations
            .iter()
            .filter(|allocation| allocation.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn allocations_for_lot(&self, lot_id: Uuid) -> StoreResult<Vec<IssueAllocation>> {
        let state = self.state.read().await;
        Ok(state
            .allocations
            .iter()
            .filter(|allocation| allocation.lot_id == lot_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: LedgerBatch) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let document_id = batch.transition.document.id;
        let current = state
            .documents
            .get(&document_id)
            .ok_or_else(|| StoreError::not_found("document", document_id))?;
        if current.status != batch.transition.expected_status {
            return Err(StoreError::conflict(format!(
                "document {} is {} (expected {})",
                current.number, current.status, batch.transition.expected_status
            )));
        }

        // Every new value is computed before the first write.
        let mut lot_totals: HashMap<Uuid, Decimal> = HashMap::new();
        for delta in &batch.lot_deltas {
            let total = lot_totals.entry(delta.lot_id).or_default();
            *total = checked_sum(*total, delta.delta, "lot movement")?;
        }
        let mut lot_updates = Vec::with_capacity(lot_totals.len());
        for (lot_id, delta) in &lot_totals {
            let lot = state
                .lots
                .get(lot_id)
                .ok_or_else(|| StoreError::not_found("lot", lot_id))?;
            let next = checked_sum(lot.remaining_quantity, *delta, "lot remaining")?;
            if next < Decimal::ZERO || next > lot.received_quantity {
                return Err(StoreError::conflict(format!(
                    "lot {lot_id} cannot move by {delta} from {}",
                    lot.remaining_quantity
                )));
            }
            lot_updates.push((*lot_id, next));
        }
        for lot in &batch.new_lots {
            if state.lots.contains_key(&lot.id) {
                return Err(StoreError::conflict(format!("lot {} already exists", lot.id)));
            }
        }
        let mut stock_updates: HashMap<(Uuid, Uuid), Decimal> = HashMap::new();
        for delta in &batch.stock_deltas {
            let key = (delta.warehouse_id, delta.material_id);
            let on_hand = match stock_updates.get(&key) {
                Some(quantity) => *quantity,
                None => state
                    .stocks
                    .get(&key)
                    .map(|stock| stock.quantity)
                    .unwrap_or_default(),
            };
            let next = checked_sum(on_hand, delta.delta, "stock on hand")?;
            if next < Decimal::ZERO {
                return Err(StoreError::conflict(format!(
                    "stock of material {} would go negative",
                    delta.material_id
                )));
            }
            stock_updates.insert(key, next);
        }
        let mut balance_updates: BTreeMap<(Uuid, Uuid, NaiveDate), StockBalance> =
            BTreeMap::new();
        for delta in &batch.balance_deltas {
            let mut balance = match balance_updates.get(&delta.key()) {
                Some(balance) => balance.clone(),
                None => state
                    .balances
                    .get(&delta.key())
                    .cloned()
                    .unwrap_or_else(|| StockBalance {
                        warehouse_id: delta.warehouse_id,
                        material_id: delta.material_id,
                        date: delta.date,
                        quantity_in: Decimal::ZERO,
                        value_in: Decimal::ZERO,
                        quantity_out: Decimal::ZERO,
                        value_out: Decimal::ZERO,
                        updated_at: now,
                    }),
            };
            balance.quantity_in =
                checked_sum(balance.quantity_in, delta.quantity_in, "quantity in")?;
            balance.value_in = checked_sum(balance.value_in, delta.value_in, "value in")?;
            balance.quantity_out =
                checked_sum(balance.quantity_out, delta.quantity_out, "quantity out")?;
            balance.value_out = checked_sum(balance.value_out, delta.value_out, "value out")?;
            balance.updated_at = now;
            balance_updates.insert(delta.key(), balance);
        }

        for (lot_id, remaining) in lot_updates {
            if let Some(lot) = state.lots.get_mut(&lot_id) {
                lot.remaining_quantity = remaining;
            }
        }
        for mut lot in batch.new_lots {
            state.lot_sequence += 1;
            lot.sequence = state.lot_sequence;
            state.lots.insert(lot.id, lot);
        }
        if let Some(reversed_document) = batch.reverse_allocations_of {
            for allocation in state
                .allocations
                .iter_mut()
                .filter(|a| a.document_id == reversed_document && a.is_active())
            {
                allocation.reversed_at = Some(now);
            }
        }
        state.allocations.extend(batch.allocations);
        for ((warehouse_id, material_id), quantity) in stock_updates {
            let stock = state
                .stocks
                .entry((warehouse_id, material_id))
                .or_insert_with(|| Stock::empty(warehouse_id, material_id));
            stock.quantity = quantity;
            stock.updated_at = Some(now);
        }
        state.balances.extend(balance_updates);
        state
            .documents
            .insert(document_id, batch.transition.document);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{
        BalanceDelta, DocumentKind, DocumentStatus, DocumentTransition, LotDelta, StockDelta,
    };
    use rust_decimal_macros::dec;

    fn document(status: DocumentStatus) -> StockDocument {
        StockDocument {
            id: Uuid::new_v4(),
            number: "RC-HN01-00001".to_string(),
            kind: DocumentKind::Receipt,
            status,
            warehouse_id: Uuid::new_v4(),
            destination_warehouse_id: None,
            lines: Vec::new(),
            note: None,
            created_by: "tester".to_string(),
            created_at: Utc::now(),
            confirmed_by: None,
            confirmed_at: None,
            posted_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    fn lot(document: &StockDocument, material_id: Uuid, quantity: Decimal) -> StockLot {
        StockLot {
            id: Uuid::new_v4(),
            warehouse_id: document.warehouse_id,
            material_id,
            lot_number: None,
            manufactured_on: None,
            expires_on: None,
            received_quantity: quantity,
            remaining_quantity: quantity,
            unit_cost: Some(dec!(10)),
            source_document_id: document.id,
            sequence: 0,
            created_at: Utc::now(),
        }
    }

    fn posting(document: &StockDocument) -> DocumentTransition {
        let mut posted = document.clone();
        posted.status = DocumentStatus::Posted;
        DocumentTransition {
            document: posted,
            expected_status: DocumentStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn stale_status_rejects_whole_batch() {
        let store = InMemoryLedgerStore::new();
        let doc = document(DocumentStatus::New);
        store.insert_document(&doc).await.unwrap();
        let material_id = Uuid::new_v4();

        let mut batch = LedgerBatch::transition_only(posting(&doc));
        batch.new_lots.push(lot(&doc, material_id, dec!(5)));

        let err = store.commit(batch).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.lots(doc.warehouse_id, material_id).await.unwrap().is_empty());
        assert_eq!(
            store.document(doc.id).await.unwrap().unwrap().status,
            DocumentStatus::New
        );
    }

    #[tokio::test]
    async fn overdraw_rejects_batch_without_partial_writes() {
        let store = InMemoryLedgerStore::new();
        let receipt = document(DocumentStatus::Confirmed);
        store.insert_document(&receipt).await.unwrap();
        let material_id = Uuid::new_v4();
        let received = lot(&receipt, material_id, dec!(5));
        let lot_id = received.id;

        let mut batch = LedgerBatch::transition_only(posting(&receipt));
        batch.new_lots.push(received);
        batch.stock_deltas.push(StockDelta {
            warehouse_id: receipt.warehouse_id,
            material_id,
            delta: dec!(5),
        });
        store.commit(batch).await.unwrap();

        let issue = document(DocumentStatus::Confirmed);
        store.insert_document(&issue).await.unwrap();
        let mut batch = LedgerBatch::transition_only(posting(&issue));
        batch.lot_deltas.push(LotDelta {
            lot_id,
            delta: dec!(-3),
        });
        batch.lot_deltas.push(LotDelta {
            lot_id,
            delta: dec!(-3),
        });
        batch.stock_deltas.push(StockDelta {
            warehouse_id: receipt.warehouse_id,
            material_id,
            delta: dec!(-6),
        });

        assert!(store.commit(batch).await.unwrap_err().is_conflict());
        let stored = store.lot(lot_id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_quantity, dec!(5));
        assert_eq!(
            store
                .stock(receipt.warehouse_id, material_id)
                .await
                .unwrap()
                .quantity,
            dec!(5)
        );
    }

    #[tokio::test]
    async fn overflowing_totals_reject_batch_before_writing() {
        let store = InMemoryLedgerStore::new();
        let material_id = Uuid::new_v4();
        let first = document(DocumentStatus::Confirmed);
        store.insert_document(&first).await.unwrap();
        let mut batch = LedgerBatch::transition_only(posting(&first));
        batch.new_lots.push(lot(&first, material_id, Decimal::MAX));
        batch.stock_deltas.push(StockDelta {
            warehouse_id: first.warehouse_id,
            material_id,
            delta: Decimal::MAX,
        });
        store.commit(batch).await.unwrap();

        let mut second = document(DocumentStatus::Confirmed);
        second.warehouse_id = first.warehouse_id;
        store.insert_document(&second).await.unwrap();
        let mut batch = LedgerBatch::transition_only(posting(&second));
        batch.new_lots.push(lot(&second, material_id, Decimal::MAX));
        batch.stock_deltas.push(StockDelta {
            warehouse_id: second.warehouse_id,
            material_id,
            delta: Decimal::MAX,
        });

        assert!(store.commit(batch).await.unwrap_err().is_conflict());
        assert_eq!(store.lots(first.warehouse_id, material_id).await.unwrap().len(), 1);
        assert_eq!(
            store
                .stock(first.warehouse_id, material_id)
                .await
                .unwrap()
                .quantity,
            Decimal::MAX
        );
        assert_eq!(
            store.document(second.id).await.unwrap().unwrap().status,
            DocumentStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn balance_deltas_accumulate_on_one_row_per_day() {
        let store = InMemoryLedgerStore::new();
        let material_id = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        for _ in 0..2 {
            let doc = document(DocumentStatus::Confirmed);
            store.insert_document(&doc).await.unwrap();
            let mut batch = LedgerBatch::transition_only(posting(&doc));
            batch.balance_deltas.push(BalanceDelta {
                warehouse_id: Uuid::nil(),
                material_id,
                date: day,
                quantity_in: dec!(4),
                value_in: dec!(40),
                quantity_out: Decimal::ZERO,
                value_out: Decimal::ZERO,
            });
            store.commit(batch).await.unwrap();
        }

        let rows = store.balances(None, day, day).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity_in, dec!(8));
        assert_eq!(rows[0].value_in, dec!(80));
    }
}
