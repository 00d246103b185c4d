use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, Utc};
use depot_core::{CostingMethod, DocumentKind, LedgerStore, Notifier, PostingNotice};
use depot_finance::{Report, ReportBuilder, ReportKind, ReportPeriod, StoreLabels};
use depot_inventory::{InventoryService, NewDocument, NewDocumentLine, NewMaterial, NewWarehouse};
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

fn line(
    material_id: Uuid,
    quantity: Decimal,
    unit_cost: Option<Decimal>,
    unit_price: Option<Decimal>,
) -> NewDocumentLine {
    NewDocumentLine {
        material_id,
        quantity,
        unit_cost,
        unit_price,
        lot_number: None,
        manufactured_on: None,
        expires_on: None,
        allocation: None,
    }
}

async fn post(
    service: &InventoryService,
    warehouse_id: Uuid,
    kind: DocumentKind,
    line: NewDocumentLine,
) {
    let document = service
        .create_document(NewDocument {
            kind,
            warehouse_id,
            destination_warehouse_id: None,
            lines: vec![line],
            note: None,
            created_by: "thu.kho".to_string(),
        })
        .await
        .unwrap();
    service.confirm(document.id, "ke.toan").await.unwrap();
    service.post(document.id).await.unwrap();
}

#[tokio::test]
async fn reports_reflect_posted_activity() {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
    let service = InventoryService::new(
        store.clone(),
        Arc::new(InMemoryDocumentNumbering::default()),
        Arc::new(InMemoryEventStore::default()),
        Arc::new(SilentNotifier),
    );
    let warehouse = service
        .create_warehouse(NewWarehouse {
            code: "HN".to_string(),
            name: "Kho Ha Noi".to_string(),
        })
        .await
        .unwrap();
    let material = service
        .create_material(NewMaterial {
            code: "VT-01".to_string(),
            name: "Paracetamol".to_string(),
            unit: "box".to_string(),
            costing_method: Some(CostingMethod::Fifo),
        })
        .await
        .unwrap();

    let receipt = |cost| line(material.id, dec!(10), Some(cost), None);
    post(&service, warehouse.id, DocumentKind::Receipt, receipt(dec!(100))).await;
    post(&service, warehouse.id, DocumentKind::Receipt, receipt(dec!(130))).await;
    post(
        &service,
        warehouse.id,
        DocumentKind::Issue,
        line(material.id, dec!(12), None, Some(dec!(150))),
    )
    .await;

    let today = Utc::now().date_naive();
    let period = ReportPeriod::new(today.checked_sub_days(Days::new(7)).unwrap(), today).unwrap();
    let builder = ReportBuilder::new(store.clone());
    let labels = StoreLabels(store.clone());

    let Report::ProfitAndLoss(pnl) = builder
        .build(ReportKind::ProfitAndLoss, period, None, &labels)
        .await
        .unwrap()
    else {
        panic!("expected a profit and loss report");
    };
    assert_eq!(pnl.revenue, dec!(1800.00));
    assert_eq!(pnl.cogs, dec!(1260.00));
    assert_eq!(pnl.gross_profit, dec!(540.00));
    assert_eq!(pnl.gross_margin_percent, dec!(30.00));

    let Report::InventoryValuation(valuation) = builder
        .build(ReportKind::InventoryValuation, period, Some(warehouse.id), &labels)
        .await
        .unwrap()
    else {
        panic!("expected a valuation report");
    };
    assert_eq!(valuation.rows.len(), 1);
    assert_eq!(valuation.rows[0].material.name, "Paracetamol");
    assert_eq!(valuation.total_quantity, dec!(8));
    assert_eq!(valuation.total_value, dec!(1040.00));

    let Report::StockMovement(movement) = builder
        .build(ReportKind::StockMovement, period, None, &labels)
        .await
        .unwrap()
    else {
        panic!("expected a movement report");
    };
    assert_eq!(movement.totals.begin_quantity, dec!(0));
    assert_eq!(movement.totals.quantity_in, dec!(20));
    assert_eq!(movement.totals.quantity_out, dec!(12));
    assert_eq!(movement.totals.end_quantity, dec!(8));

    let Report::TurnoverRate(turnover) = builder
        .build(ReportKind::TurnoverRate, period, None, &labels)
        .await
        .unwrap()
    else {
        panic!("expected a turnover report");
    };
    assert_eq!(turnover.end_value, dec!(1040.00));
    assert_eq!(turnover.average_inventory_value, dec!(520.00));
    assert_eq!(turnover.turnover_rate, dec!(2.42));
}
