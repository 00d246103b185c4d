use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use depot_core::{
    DocumentFilter, DocumentKind, DocumentStatus, LedgerStore, StockBalance, StockDocument,
};
use depot_inventory::costing::lot_value;
use depot_inventory::valuation;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::reports::{
    CogsReport, InventoryValuationReport, Label, MovementInput, Report, RevenueReport,
    StockMovementReport, ValuationRow, cogs, inventory_valuation, profit_and_loss, revenue,
    stock_movement, turnover_rate,
};
use crate::{ReportError, ReportKind, ReportPeriod};

/// Display names for report rows.
#[async_trait]
pub trait Labels: Send + Sync {
    async fn warehouse_name(&self, id: Uuid) -> Option<String>;
    async fn material_name(&self, id: Uuid) -> Option<String>;
}

/// Resolves names straight from the ledger store.
pub struct StoreLabels(pub Arc<dyn LedgerStore>);

#[async_trait]
impl Labels for StoreLabels {
    async fn warehouse_name(&self, id: Uuid) -> Option<String> {
        self.0.warehouse(id).await.ok().flatten().map(|w| w.name)
    }

    async fn material_name(&self, id: Uuid) -> Option<String> {
        self.0.material(id).await.ok().flatten().map(|m| m.name)
    }
}

/// Loads ledger data for a report and hands it to the pure builders.
#[derive(Clone)]
pub struct ReportBuilder {
    store: Arc<dyn LedgerStore>,
}

impl ReportBuilder {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn build(
        &self,
        kind: ReportKind,
        period: ReportPeriod,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<Report, ReportError> {
        debug!(%kind, from = %period.from, to = %period.to, ?warehouse_id, "building report");
        let report = match kind {
            ReportKind::InventoryValuation => {
                Report::InventoryValuation(self.valuation(warehouse_id, labels).await?)
            }
            ReportKind::StockMovement => {
                Report::StockMovement(self.movement(period, warehouse_id, labels).await?)
            }
            ReportKind::Revenue => {
                Report::Revenue(self.revenue(period, warehouse_id, labels).await?)
            }
            ReportKind::Cogs => Report::Cogs(self.cogs(period, warehouse_id, labels).await?),
            ReportKind::ProfitAndLoss => {
                let revenue = self.revenue(period, warehouse_id, labels).await?;
                let cogs = self.cogs(period, warehouse_id, labels).await?;
                Report::ProfitAndLoss(profit_and_loss(&revenue, &cogs))
            }
            ReportKind::TurnoverRate => {
                let cogs = self.cogs(period, warehouse_id, labels).await?;
                let movement = self.movement(period, warehouse_id, labels).await?;
                Report::TurnoverRate(turnover_rate(&cogs, &movement))
            }
        };
        Ok(report)
    }

    async fn label_warehouse(&self, labels: &dyn Labels, id: Uuid) -> Label {
        Label {
            id,
            name: labels.warehouse_name(id).await.unwrap_or_default(),
        }
    }

    async fn label_material(&self, labels: &dyn Labels, id: Uuid) -> Label {
        Label {
            id,
            name: labels.material_name(id).await.unwrap_or_default(),
        }
    }

    async fn valuation(
        &self,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<InventoryValuationReport, ReportError> {
        let materials: HashMap<Uuid, _> = self
            .store
            .materials()
            .await?
            .into_iter()
            .map(|material| (material.id, material.effective_costing_method()))
            .collect();

        let mut rows = Vec::new();
        for stock in self.store.stocks(warehouse_id).await? {
            if stock.quantity.is_zero() {
                continue;
            }
            let lots = self.store.lots(stock.warehouse_id, stock.material_id).await?;
            let method = materials
                .get(&stock.material_id)
                .copied()
                .unwrap_or_default();
            rows.push(ValuationRow {
                warehouse: self.label_warehouse(labels, stock.warehouse_id).await,
                material: self.label_material(labels, stock.material_id).await,
                valuation: valuation(method, &lots),
            });
        }
        Ok(inventory_valuation(Utc::now().date_naive(), rows))
    }

    async fn movement(
        &self,
        period: ReportPeriod,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<StockMovementReport, ReportError> {
        let today = Utc::now().date_naive();
        let within = self
            .store
            .balances(warehouse_id, period.from, period.to)
            .await?;
        let after = match period.to.succ_opt() {
            Some(next) if next <= today => {
                self.store.balances(warehouse_id, next, today).await?
            }
            _ => Vec::new(),
        };
        let stocks: HashMap<(Uuid, Uuid), _> = self
            .store
            .stocks(warehouse_id)
            .await?
            .into_iter()
            .map(|stock| ((stock.warehouse_id, stock.material_id), stock.quantity))
            .collect();

        let keys: BTreeSet<(Uuid, Uuid)> = stocks
            .keys()
            .copied()
            .chain(within.iter().map(|row| (row.warehouse_id, row.material_id)))
            .collect();

        let mut inputs = Vec::with_capacity(keys.len());
        for (warehouse, material) in keys {
            let live_value: Decimal = self
                .store
                .lots(warehouse, material)
                .await?
                .iter()
                .map(lot_value)
                .sum();
            let for_key = |rows: &[StockBalance]| {
                rows.iter()
                    .filter(|row| row.warehouse_id == warehouse && row.material_id == material)
                    .cloned()
                    .collect::<Vec<_>>()
            };
            inputs.push(MovementInput {
                warehouse: self.label_warehouse(labels, warehouse).await,
                material: self.label_material(labels, material).await,
                live_quantity: stocks
                    .get(&(warehouse, material))
                    .copied()
                    .unwrap_or_default(),
                live_value,
                within: for_key(&within),
                after: for_key(&after),
            });
        }
        Ok(stock_movement(period, inputs))
    }

    async fn posted_issues(
        &self,
        period: ReportPeriod,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<(Vec<StockDocument>, HashMap<Uuid, String>), ReportError> {
        let documents = self
            .store
            .documents(&DocumentFilter {
                kind: Some(DocumentKind::Issue),
                status: Some(DocumentStatus::Posted),
                warehouse_id,
                posted_from: Some(period.from),
                posted_to: Some(period.to),
            })
            .await?;

        let mut names = HashMap::new();
        for document in &documents {
            for line in &document.lines {
                if !names.contains_key(&line.material_id) {
                    let name = labels
                        .material_name(line.material_id)
                        .await
                        .unwrap_or_default();
                    names.insert(line.material_id, name);
                }
            }
        }
        Ok((documents, names))
    }

    async fn revenue(
        &self,
        period: ReportPeriod,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<RevenueReport, ReportError> {
        let (documents, names) = self.posted_issues(period, warehouse_id, labels).await?;
        Ok(revenue(period, &documents, &names))
    }

    async fn cogs(
        &self,
        period: ReportPeriod,
        warehouse_id: Option<Uuid>,
        labels: &dyn Labels,
    ) -> Result<CogsReport, ReportError> {
        let (documents, names) = self.posted_issues(period, warehouse_id, labels).await?;
        Ok(cogs(period, &documents, &names))
    }
}
