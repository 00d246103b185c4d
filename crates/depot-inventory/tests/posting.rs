use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use depot_core::{
    CostingMethod, DocumentKind, DocumentStatus, DomainEventKind, EventStore, LedgerStore,
    LotDraw, Material, Notifier, PostingNotice, StockDocument, Warehouse,
};
use depot_inventory::{
    InventoryError, InventoryService, NewDocument, NewDocumentLine, NewMaterial, NewWarehouse,
    WorkflowAction,
};
use depot_store::{InMemoryDocumentNumbering, InMemoryEventStore, InMemoryLedgerStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _notice: &PostingNotice) -> anyhow::Result<()> {
        Ok(())
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _notice: &PostingNotice) -> anyhow::Result<()> {
        anyhow::bail!("broker unreachable")
    }
}

struct Fixture {
    service: InventoryService,
    store: Arc<InMemoryLedgerStore>,
    events: Arc<InMemoryEventStore>,
    warehouse: Warehouse,
    material: Material,
}

async fn fixture_with(notifier: Arc<dyn Notifier>, method: Option<CostingMethod>) -> Fixture {
    let store = Arc::new(InMemoryLedgerStore::new());
    let events = Arc::new(InMemoryEventStore::default());
    let service = InventoryService::new(
        store.clone(),
        Arc::new(InMemoryDocumentNumbering::default()),
        events.clone(),
        notifier,
    );

    let warehouse = service
        .create_warehouse(NewWarehouse {
            code: "hn".to_string(),
            name: "Kho Ha Noi".to_string(),
        })
        .await
        .unwrap();
    let material = service
        .create_material(NewMaterial {
            code: "vt-01".to_string(),
            name: "Paracetamol 500mg".to_string(),
            unit: "box".to_string(),
            costing_method: method,
        })
        .await
        .unwrap();

    Fixture {
        service,
        store,
        events,
        warehouse,
        material,
    }
}

async fn fixture(method: Option<CostingMethod>) -> Fixture {
    fixture_with(Arc::new(SilentNotifier), method).await
}

fn line(material_id: Uuid, quantity: Decimal) -> NewDocumentLine {
    NewDocumentLine {
        material_id,
        quantity,
        unit_cost: None,
        unit_price: None,
        lot_number: None,
        manufactured_on: None,
        expires_on: None,
        allocation: None,
    }
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).unwrap()
}

impl Fixture {
    async fn submit(&self, kind: DocumentKind, lines: Vec<NewDocumentLine>) -> StockDocument {
        self.service
            .create_document(NewDocument {
                kind,
                warehouse_id: self.warehouse.id,
                destination_warehouse_id: None,
                lines,
                note: None,
                created_by: "thu.kho".to_string(),
            })
            .await
            .unwrap()
    }

    async fn confirmed(&self, kind: DocumentKind, lines: Vec<NewDocumentLine>) -> StockDocument {
        let document = self.submit(kind, lines).await;
        self.service.confirm(document.id, "ke.toan").await.unwrap()
    }

    async fn receive(&self, quantity: Decimal, unit_cost: Decimal, expires_on: Option<NaiveDate>) {
        let mut receipt = line(self.material.id, quantity);
        receipt.unit_cost = Some(unit_cost);
        receipt.expires_on = expires_on;
        let document = self.confirmed(DocumentKind::Receipt, vec![receipt]).await;
        self.service.post(document.id).await.unwrap();
    }

    async fn issue(&self, quantity: Decimal) -> Result<StockDocument, InventoryError> {
        let document = self
            .confirmed(DocumentKind::Issue, vec![line(self.material.id, quantity)])
            .await;
        self.service.post(document.id).await
    }

    /// Posts an issue out of `from`, or a transfer when `to` is given.
    async fn move_stock(&self, from: Uuid, to: Option<Uuid>, quantity: Decimal) -> StockDocument {
        let document = self
            .service
            .create_document(NewDocument {
                kind: if to.is_some() {
                    DocumentKind::Transfer
                } else {
                    DocumentKind::Issue
                },
                warehouse_id: from,
                destination_warehouse_id: to,
                lines: vec![line(self.material.id, quantity)],
                note: None,
                created_by: "thu.kho".to_string(),
            })
            .await
            .unwrap();
        self.service.confirm(document.id, "ke.toan").await.unwrap();
        self.service.post(document.id).await.unwrap()
    }

    async fn assert_stock_matches_lots(&self) {
        let stock = self
            .store
            .stock(self.warehouse.id, self.material.id)
            .await
            .unwrap();
        let lots = self
            .store
            .lots(self.warehouse.id, self.material.id)
            .await
            .unwrap();
        let total: Decimal = lots.iter().map(|lot| lot.remaining_quantity).sum();
        assert_eq!(stock.quantity, total);
        assert!(lots.iter().all(|lot| lot.remaining_quantity >= Decimal::ZERO));
    }
}

#[tokio::test]
async fn receipt_creates_lot_and_numbers_document() {
    let fx = fixture(None).await;
    let document = fx.submit(DocumentKind::Receipt, vec![line(fx.material.id, dec!(5))]).await;
    assert_eq!(document.number, "RC-HN-00001");
    assert_eq!(document.status, DocumentStatus::New);
    assert_eq!(document.lines[0].line_no, 1);

    fx.receive(dec!(10), dec!(100), None).await;

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(10));
    let lots = fx.service.lots(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].unit_cost, Some(dec!(100)));
    fx.assert_stock_matches_lots().await;
}

#[tokio::test]
async fn weighted_average_issue_uses_pooled_cost() {
    let fx = fixture(Some(CostingMethod::WeightedAverage)).await;
    fx.receive(dec!(10), dec!(100), None).await;
    fx.receive(dec!(10), dec!(120), None).await;

    let issued = fx.issue(dec!(5)).await.unwrap();
    assert_eq!(issued.lines[0].posted_unit_cost, Some(dec!(110)));
    assert_eq!(issued.lines[0].posted_value, Some(dec!(550.00)));
}

#[tokio::test]
async fn fifo_issue_blends_consumed_lots() {
    let fx = fixture(Some(CostingMethod::Fifo)).await;
    fx.receive(dec!(10), dec!(100), None).await;
    fx.receive(dec!(10), dec!(130), None).await;

    let issued = fx.issue(dec!(12)).await.unwrap();
    assert_eq!(issued.lines[0].posted_unit_cost, Some(dec!(105.00)));
    assert_eq!(issued.lines[0].posted_value, Some(dec!(1260.00)));

    let allocations = fx.service.allocations(issued.id).await.unwrap();
    let allocated: Decimal = allocations.iter().map(|a| a.quantity).sum();
    assert_eq!(allocated, dec!(12));
    fx.assert_stock_matches_lots().await;
}

#[tokio::test]
async fn fefo_takes_earliest_expiry_first() {
    let fx = fixture(None).await;
    fx.receive(dec!(5), dec!(10), Some(date(12, 31))).await;
    fx.receive(dec!(5), dec!(10), None).await;
    fx.receive(dec!(5), dec!(10), Some(date(6, 30))).await;

    let issued = fx.issue(dec!(7)).await.unwrap();
    let lots = fx.service.lots(fx.warehouse.id, fx.material.id).await.unwrap();
    let june = lots.iter().find(|l| l.expires_on == Some(date(6, 30))).unwrap();
    let december = lots.iter().find(|l| l.expires_on == Some(date(12, 31))).unwrap();
    let undated = lots.iter().find(|l| l.expires_on.is_none()).unwrap();

    assert_eq!(june.remaining_quantity, dec!(0));
    assert_eq!(december.remaining_quantity, dec!(3));
    assert_eq!(undated.remaining_quantity, dec!(5));

    let allocations = fx.service.allocations(issued.id).await.unwrap();
    assert_eq!(allocations[0].lot_id, june.id);
    assert_eq!(allocations[1].lot_id, december.id);
}

#[tokio::test]
async fn manual_allocation_overrides_fefo() {
    let fx = fixture(None).await;
    fx.receive(dec!(5), dec!(10), Some(date(6, 30))).await;
    fx.receive(dec!(5), dec!(12), Some(date(12, 31))).await;
    let lots = fx.service.lots(fx.warehouse.id, fx.material.id).await.unwrap();
    let late = lots.iter().find(|l| l.expires_on == Some(date(12, 31))).unwrap();

    let mut chosen = line(fx.material.id, dec!(4));
    chosen.allocation = Some(vec![LotDraw {
        lot_id: late.id,
        quantity: dec!(4),
    }]);
    let document = fx.confirmed(DocumentKind::Issue, vec![chosen]).await;
    fx.service.post(document.id).await.unwrap();

    let late = fx.store.lot(late.id).await.unwrap().unwrap();
    assert_eq!(late.remaining_quantity, dec!(1));
}

#[tokio::test]
async fn shortage_rejects_without_touching_stock() {
    let fx = fixture(None).await;
    fx.receive(dec!(15), dec!(10), None).await;

    let err = fx.issue(dec!(20)).await.unwrap_err();
    match err {
        InventoryError::InsufficientStock {
            requested,
            available,
            shortfall,
            ..
        } => {
            assert_eq!(requested, dec!(20));
            assert_eq!(available, dec!(15));
            assert_eq!(shortfall, dec!(5));
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(15));

    let today = Utc::now().date_naive();
    let balances = fx
        .store
        .balances(Some(fx.warehouse.id), today, today)
        .await
        .unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].quantity_out, dec!(0));

    let issues = fx
        .service
        .store()
        .documents(&depot_core::DocumentFilter {
            kind: Some(DocumentKind::Issue),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(issues[0].status, DocumentStatus::Confirmed);
}

#[tokio::test]
async fn same_day_movements_share_one_balance_row() {
    let fx = fixture(None).await;
    fx.receive(dec!(10), dec!(10), None).await;
    fx.receive(dec!(5), dec!(20), None).await;
    fx.issue(dec!(3)).await.unwrap();

    let today = Utc::now().date_naive();
    let balances = fx
        .store
        .balances(Some(fx.warehouse.id), today, today)
        .await
        .unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].quantity_in, dec!(15));
    assert_eq!(balances[0].value_in, dec!(200));
    assert_eq!(balances[0].quantity_out, dec!(3));
}

#[tokio::test]
async fn cancelling_a_posted_issue_restores_everything() {
    let fx = fixture(None).await;
    fx.receive(dec!(10), dec!(10), None).await;
    let issued = fx.issue(dec!(4)).await.unwrap();

    let cancelled = fx
        .service
        .cancel(issued.id, "ke.toan", Some("wrong customer".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, DocumentStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("wrong customer"));

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(10));
    let allocations = fx.service.allocations(issued.id).await.unwrap();
    assert!(allocations.iter().all(|a| !a.is_active()));

    let today = Utc::now().date_naive();
    let balances = fx
        .store
        .balances(Some(fx.warehouse.id), today, today)
        .await
        .unwrap();
    assert_eq!(balances[0].quantity_out, dec!(0));
    assert_eq!(balances[0].value_out, dec!(0));
    fx.assert_stock_matches_lots().await;

    let events = fx.events.stream(issued.id).await.unwrap();
    assert!(
        events
            .iter()
            .any(|e| e.event.kind == DomainEventKind::DocumentReversed)
    );
}

#[tokio::test]
async fn drawn_receipt_cannot_be_reversed() {
    let fx = fixture(None).await;
    let mut receipt = line(fx.material.id, dec!(10));
    receipt.unit_cost = Some(dec!(10));
    let document = fx.confirmed(DocumentKind::Receipt, vec![receipt]).await;
    fx.service.post(document.id).await.unwrap();
    fx.issue(dec!(1)).await.unwrap();

    let err = fx
        .service
        .cancel(document.id, "ke.toan", None)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::ReversalBlocked { .. }));
    let still = fx.service.document(document.id).await.unwrap();
    assert_eq!(still.status, DocumentStatus::Posted);
}

#[tokio::test]
async fn illegal_transitions_are_refused() {
    let fx = fixture(None).await;
    let document = fx.submit(DocumentKind::Receipt, vec![line(fx.material.id, dec!(1))]).await;

    let err = fx.service.post(document.id).await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InvalidTransition {
            from: DocumentStatus::New,
            action: WorkflowAction::Post,
            ..
        }
    ));

    fx.service.cancel(document.id, "ke.toan", None).await.unwrap();
    let err = fx.service.confirm(document.id, "ke.toan").await.unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InvalidTransition {
            from: DocumentStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn transfer_moves_lots_between_warehouses() {
    let fx = fixture(None).await;
    fx.receive(dec!(10), dec!(25), Some(date(9, 1))).await;
    let destination = fx
        .service
        .create_warehouse(NewWarehouse {
            code: "hcm".to_string(),
            name: "Kho Ho Chi Minh".to_string(),
        })
        .await
        .unwrap();

    let transfer = fx
        .service
        .create_document(NewDocument {
            kind: DocumentKind::Transfer,
            warehouse_id: fx.warehouse.id,
            destination_warehouse_id: Some(destination.id),
            lines: vec![line(fx.material.id, dec!(4))],
            note: None,
            created_by: "thu.kho".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(transfer.number, "TR-HN-00001");
    fx.service.confirm(transfer.id, "ke.toan").await.unwrap();
    fx.service.post(transfer.id).await.unwrap();

    let source = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    let target = fx.service.stock(destination.id, fx.material.id).await.unwrap();
    assert_eq!(source.quantity, dec!(6));
    assert_eq!(target.quantity, dec!(4));

    let moved = fx.service.lots(destination.id, fx.material.id).await.unwrap();
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].expires_on, Some(date(9, 1)));
    assert_eq!(moved[0].unit_cost, Some(dec!(25)));
}

#[tokio::test]
async fn cancelling_a_posted_transfer_restores_both_sides() {
    let fx = fixture(None).await;
    fx.receive(dec!(10), dec!(10), None).await;
    fx.receive(dec!(10), dec!(14), None).await;
    let destination = fx
        .service
        .create_warehouse(NewWarehouse {
            code: "hcm".to_string(),
            name: "Kho Ho Chi Minh".to_string(),
        })
        .await
        .unwrap();
    let transfer = fx
        .move_stock(fx.warehouse.id, Some(destination.id), dec!(12))
        .await;
    let today = Utc::now().date_naive();
    let target_row = fx
        .store
        .balances(Some(destination.id), today, today)
        .await
        .unwrap();
    assert_eq!(target_row[0].value_in, dec!(128.00));
    assert_eq!(transfer.lines[0].posted_value, Some(dec!(144.00)));

    fx.service.cancel(transfer.id, "ke.toan", None).await.unwrap();

    let source = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    let target = fx.service.stock(destination.id, fx.material.id).await.unwrap();
    assert_eq!(source.quantity, dec!(20));
    assert_eq!(target.quantity, dec!(0));
    let moved = fx.service.lots(destination.id, fx.material.id).await.unwrap();
    assert!(moved.iter().all(|lot| lot.remaining_quantity.is_zero()));
    let allocations = fx.service.allocations(transfer.id).await.unwrap();
    assert!(allocations.iter().all(|a| !a.is_active()));
    fx.assert_stock_matches_lots().await;

    let target_row = fx
        .store
        .balances(Some(destination.id), today, today)
        .await
        .unwrap();
    assert_eq!(target_row[0].quantity_in, dec!(0));
    assert_eq!(target_row[0].value_in, dec!(0));
    let source_row = fx
        .store
        .balances(Some(fx.warehouse.id), today, today)
        .await
        .unwrap();
    assert_eq!(source_row[0].quantity_out, dec!(0));
    assert_eq!(source_row[0].value_out, dec!(0));

    let second = fx
        .move_stock(fx.warehouse.id, Some(destination.id), dec!(3))
        .await;
    fx.move_stock(destination.id, None, dec!(1)).await;
    let err = fx
        .service
        .cancel(second.id, "ke.toan", None)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::ReversalBlocked { .. }));
    let still = fx.service.document(second.id).await.unwrap();
    assert_eq!(still.status, DocumentStatus::Posted);
    let source = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(source.quantity, dec!(17));
}

#[tokio::test]
async fn amounts_beyond_the_ledger_are_rejected_up_front() {
    let fx = fixture(None).await;
    let mut huge = line(fx.material.id, dec!(40000000000000000000000000000));
    huge.unit_cost = Some(dec!(2));
    let mut precise = line(fx.material.id, dec!(1));
    precise.unit_cost = Some(dec!(0.1234567));

    let err = fx
        .service
        .create_document(NewDocument {
            kind: DocumentKind::Receipt,
            warehouse_id: fx.warehouse.id,
            destination_warehouse_id: None,
            lines: vec![huge, precise],
            note: None,
            created_by: "thu.kho".to_string(),
        })
        .await
        .unwrap_err();
    let InventoryError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["lines[0].quantity", "lines[1].unit_cost"]);

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(0));
}

#[tokio::test]
async fn unknown_references_are_field_errors() {
    let fx = fixture(None).await;
    let err = fx
        .service
        .create_document(NewDocument {
            kind: DocumentKind::Issue,
            warehouse_id: Uuid::new_v4(),
            destination_warehouse_id: None,
            lines: vec![line(Uuid::new_v4(), dec!(1))],
            note: None,
            created_by: "thu.kho".to_string(),
        })
        .await
        .unwrap_err();
    let InventoryError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["warehouse_id", "lines[0].material_id"]);

    let err = fx
        .service
        .create_warehouse(NewWarehouse {
            code: " HN ".to_string(),
            name: "Duplicate".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::Validation(_)));
}

#[tokio::test]
async fn double_post_applies_once() {
    let fx = fixture(None).await;
    let mut receipt = line(fx.material.id, dec!(10));
    receipt.unit_cost = Some(dec!(10));
    let document = fx.confirmed(DocumentKind::Receipt, vec![receipt]).await;

    let (first, second) = tokio::join!(fx.service.post(document.id), fx.service.post(document.id));
    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(10));
}

#[tokio::test]
async fn competing_issues_never_overdraw() {
    let fx = fixture(None).await;
    fx.receive(dec!(10), dec!(10), None).await;
    let a = fx
        .confirmed(DocumentKind::Issue, vec![line(fx.material.id, dec!(8))])
        .await;
    let b = fx
        .confirmed(DocumentKind::Issue, vec![line(fx.material.id, dec!(8))])
        .await;

    let (first, second) = tokio::join!(fx.service.post(a.id), fx.service.post(b.id));
    let failures: Vec<InventoryError> = [first, second]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        InventoryError::InsufficientStock { .. }
    ));

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(2));
    fx.assert_stock_matches_lots().await;
}

#[tokio::test]
async fn failed_notification_is_recorded() {
    let fx = fixture_with(Arc::new(BrokenNotifier), None).await;
    fx.receive(dec!(1), dec!(1), None).await;

    let mut failures = Vec::new();
    for _ in 0..100 {
        failures = fx
            .events
            .by_kind(DomainEventKind::NotificationFailed, 10)
            .await
            .unwrap();
        if !failures.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].event.payload["error"], "broker unreachable");

    let stock = fx.service.stock(fx.warehouse.id, fx.material.id).await.unwrap();
    assert_eq!(stock.quantity, dec!(1));
}
