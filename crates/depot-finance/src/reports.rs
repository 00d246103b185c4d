//! Report shapes and the pure functions that fill them.

use std::collections::HashMap;

use chrono::NaiveDate;
use depot_core::{DocumentKind, DocumentStatus, StockBalance, StockDocument, round_money};
use depot_inventory::{PeriodMovement, Valuation, closing_position, period_movement};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::ReportPeriod;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Report {
    InventoryValuation(InventoryValuationReport),
    StockMovement(StockMovementReport),
    Revenue(RevenueReport),
    Cogs(CogsReport),
    ProfitAndLoss(ProfitAndLossReport),
    TurnoverRate(TurnoverReport),
}

#[derive(Debug, Clone, Serialize)]
pub struct ValuationRow {
    pub warehouse: Label,
    pub material: Label,
    #[serde(flatten)]
    pub valuation: Valuation,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryValuationReport {
    pub as_of: NaiveDate,
    pub rows: Vec<ValuationRow>,
    pub total_quantity: Decimal,
    pub total_value: Decimal,
}

pub fn inventory_valuation(
    as_of: NaiveDate,
    rows: Vec<ValuationRow>,
) -> InventoryValuationReport {
    let total_quantity = rows.iter().map(|row| row.valuation.quantity).sum();
    let total_value = round_money(rows.iter().map(|row| row.valuation.value).sum());
    InventoryValuationReport {
        as_of,
        rows,
        total_quantity,
        total_value,
    }
}

/// Everything needed to rebuild one key's period figures.
#[derive(Debug, Clone)]
pub struct MovementInput {
    pub warehouse: Label,
    pub material: Label,
    pub live_quantity: Decimal,
    pub live_value: Decimal,
    pub within: Vec<StockBalance>,
    pub after: Vec<StockBalance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementRow {
    pub warehouse: Label,
    pub material: Label,
    #[serde(flatten)]
    pub movement: PeriodMovement,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockMovementReport {
    pub period: ReportPeriod,
    pub rows: Vec<MovementRow>,
    pub totals: PeriodMovement,
}

pub fn stock_movement(period: ReportPeriod, inputs: Vec<MovementInput>) -> StockMovementReport {
    let mut totals = PeriodMovement::default();
    let rows: Vec<MovementRow> = inputs
        .into_iter()
        .map(|input| {
            let (end_quantity, end_value) =
                closing_position(input.live_quantity, input.live_value, &input.after);
            let movement = period_movement(end_quantity, end_value, &input.within);
            MovementRow {
                warehouse: input.warehouse,
                material: input.material,
                movement,
            }
        })
        .filter(|row| row.movement != PeriodMovement::default())
        .collect();

    for row in &rows {
        let movement = &row.movement;
        totals.begin_quantity += movement.begin_quantity;
        totals.begin_value += movement.begin_value;
        totals.quantity_in += movement.quantity_in;
        totals.value_in += movement.value_in;
        totals.quantity_out += movement.quantity_out;
        totals.value_out += movement.value_out;
        totals.end_quantity += movement.end_quantity;
        totals.end_value += movement.end_value;
    }

    StockMovementReport {
        period,
        rows,
        totals,
    }
}

fn posted_issues<'a>(
    period: &'a ReportPeriod,
    documents: &'a [StockDocument],
) -> impl Iterator<Item = (&'a StockDocument, NaiveDate)> + 'a {
    documents.iter().filter_map(move |document| {
        let posted_on = document.posting_date()?;
        let counts = document.kind == DocumentKind::Issue
            && document.status == DocumentStatus::Posted
            && period.contains(posted_on);
        counts.then_some((document, posted_on))
    })
}

fn label(names: &HashMap<Uuid, String>, id: Uuid) -> Label {
    Label {
        id,
        name: names.get(&id).cloned().unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueLine {
    pub document_id: Uuid,
    pub number: String,
    pub posted_on: NaiveDate,
    pub material: Label,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueReport {
    pub period: ReportPeriod,
    pub lines: Vec<RevenueLine>,
    pub total: Decimal,
}

/// Sales value of issues posted in the period. Lines without a price are
/// internal consumption and earn nothing.
pub fn revenue(
    period: ReportPeriod,
    documents: &[StockDocument],
    materials: &HashMap<Uuid, String>,
) -> RevenueReport {
    let mut lines = Vec::new();
    for (document, posted_on) in posted_issues(&period, documents) {
        for line in &document.lines {
            let Some(unit_price) = line.unit_price else {
                continue;
            };
            lines.push(RevenueLine {
                document_id: document.id,
                number: document.number.clone(),
                posted_on,
                material: label(materials, line.material_id),
                quantity: line.quantity,
                unit_price,
                amount: round_money(line.quantity * unit_price),
            });
        }
    }
    let total = round_money(lines.iter().map(|line| line.amount).sum());
    RevenueReport {
        period,
        lines,
        total,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CogsLine {
    pub document_id: Uuid,
    pub number: String,
    pub posted_on: NaiveDate,
    pub material: Label,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CogsReport {
    pub period: ReportPeriod,
    pub lines: Vec<CogsLine>,
    pub total: Decimal,
}

/// Cost booked on issues posted in the period. Transfers only move value
/// between warehouses and are not cost of goods sold.
pub fn cogs(
    period: ReportPeriod,
    documents: &[StockDocument],
    materials: &HashMap<Uuid, String>,
) -> CogsReport {
    let lines: Vec<CogsLine> = posted_issues(&period, documents)
        .flat_map(|(document, posted_on)| {
            document.lines.iter().map(move |line| CogsLine {
                document_id: document.id,
                number: document.number.clone(),
                posted_on,
                material: label(materials, line.material_id),
                quantity: line.quantity,
                unit_cost: line.posted_unit_cost.unwrap_or_default(),
                value: line.posted_value.unwrap_or_default(),
            })
        })
        .collect();
    let total = round_money(lines.iter().map(|line| line.value).sum());
    CogsReport {
        period,
        lines,
        total,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfitAndLossReport {
    pub period: ReportPeriod,
    pub revenue: Decimal,
    pub cogs: Decimal,
    pub gross_profit: Decimal,
    pub gross_margin_percent: Decimal,
}

pub fn profit_and_loss(revenue: &RevenueReport, cogs: &CogsReport) -> ProfitAndLossReport {
    let gross_profit = round_money(revenue.total - cogs.total);
    let gross_margin_percent = if revenue.total.is_zero() {
        Decimal::ZERO
    } else {
        (gross_profit / revenue.total * Decimal::ONE_HUNDRED).round_dp(2)
    };
    ProfitAndLossReport {
        period: revenue.period,
        revenue: revenue.total,
        cogs: cogs.total,
        gross_profit,
        gross_margin_percent,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnoverReport {
    pub period: ReportPeriod,
    pub cogs: Decimal,
    pub begin_value: Decimal,
    pub end_value: Decimal,
    pub average_inventory_value: Decimal,
    pub turnover_rate: Decimal,
}

/// COGS over the mean of opening and closing inventory value.
pub fn turnover_rate(cogs: &CogsReport, movement: &StockMovementReport) -> TurnoverReport {
    let begin_value = movement.totals.begin_value;
    let end_value = movement.totals.end_value;
    let average = round_money((begin_value + end_value) / Decimal::TWO);
    let turnover_rate = if average.is_zero() {
        Decimal::ZERO
    } else {
        (cogs.total / average).round_dp(2)
    };
    TurnoverReport {
        period: cogs.period,
        cogs: cogs.total,
        begin_value,
        end_value,
        average_inventory_value: average,
        turnover_rate,
    }
}
