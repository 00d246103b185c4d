//! Turns a workflow action on a document into the [`LedgerBatch`] that
//! applies or reverses its stock effect.
//!
//! Planning is pure: it works on copies of the lots, so a plan that fails
//! part-way leaves nothing behind. The store decides whether the plan still
//! holds when it commits.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use depot_core::{
    DocumentKind, DocumentStatus, DocumentTransition, IssueAllocation, LedgerBatch, LotDelta,
    Material, StockDelta, StockDocument, StockLot, round_money,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::allocation::{
    AllocationError, PlannedDraw, allocate_fefo, allocate_manual, apply_draws, available_quantity,
};
use crate::balance::BalanceBook;
use crate::costing::cost_outgoing;
use crate::error::{FieldError, InventoryError, InventoryResult};

/// Lots of one warehouse keyed by material, as loaded for planning.
pub type LotsByMaterial = HashMap<Uuid, Vec<StockLot>>;

/// Stock deltas merged per (warehouse, material).
#[derive(Default)]
struct StockBook {
    deltas: BTreeMap<(Uuid, Uuid), Decimal>,
}

impl StockBook {
    fn add(
        &mut self,
        warehouse_id: Uuid,
        material_id: Uuid,
        delta: Decimal,
    ) -> InventoryResult<()> {
        let total = self.deltas.entry((warehouse_id, material_id)).or_default();
        *total = total
            .checked_add(delta)
            .ok_or_else(|| InventoryError::out_of_range("quantity"))?;
        Ok(())
    }

    fn into_deltas(self) -> Vec<StockDelta> {
        self.deltas
            .into_iter()
            .filter(|(_, delta)| !delta.is_zero())
            .map(|((warehouse_id, material_id), delta)| StockDelta {
                warehouse_id,
                material_id,
                delta,
            })
            .collect()
    }
}

fn material<'a>(
    materials: &'a HashMap<Uuid, Material>,
    material_id: Uuid,
) -> InventoryResult<&'a Material> {
    materials
        .get(&material_id)
        .ok_or_else(|| InventoryError::not_found("material", material_id))
}

/// Whole-document availability check, run before any line is allocated.
fn ensure_available(
    document: &StockDocument,
    materials: &HashMap<Uuid, Material>,
    lots: &LotsByMaterial,
) -> InventoryResult<()> {
    let mut requested: Vec<(Uuid, Decimal)> = Vec::new();
    for line in &document.lines {
        match requested.iter_mut().find(|(id, _)| *id == line.material_id) {
            Some((_, quantity)) => *quantity += line.quantity,
            None => requested.push((line.material_id, line.quantity)),
        }
    }

    for (material_id, quantity) in requested {
        let available = lots
            .get(&material_id)
            .map(|lots| available_quantity(lots))
            .unwrap_or_default();
        if available < quantity {
            let material = material(materials, material_id)?;
            return Err(InventoryError::InsufficientStock {
                material_id,
                material_code: material.code.clone(),
                requested: quantity,
                available,
                shortfall: quantity - available,
            });
        }
    }

    Ok(())
}

fn allocation_error(line_index: usize, error: AllocationError) -> InventoryError {
    InventoryError::Validation(vec![FieldError::new(
        format!("lines[{line_index}].allocation"),
        error.to_string(),
    )])
}

/// Value of `(quantity, unit_cost)` draws at the cost of the lots they
/// came from.
fn drawn_value(
    draws: impl IntoIterator<Item = (Decimal, Option<Decimal>)>,
    field: &str,
) -> InventoryResult<Decimal> {
    draws
        .into_iter()
        .try_fold(Decimal::ZERO, |total, (quantity, unit_cost)| {
            quantity
                .checked_mul(unit_cost.unwrap_or_default())
                .and_then(|value| total.checked_add(value))
        })
        .map(round_money)
        .ok_or_else(|| InventoryError::out_of_range(field))
}

fn posted_transition(document: &StockDocument, posted_at: DateTime<Utc>) -> StockDocument {
    let mut posted = document.clone();
    posted.status = DocumentStatus::Posted;
    posted.posted_at = Some(posted_at);
    posted
}

/// Plans Confirmed -> Posted.
///
/// `lots` must hold the current lots of `document.warehouse_id` for every
/// material on an issue or transfer; receipts need none.
pub fn plan_posting(
    document: &StockDocument,
    materials: &HashMap<Uuid, Material>,
    mut lots: LotsByMaterial,
    posted_at: DateTime<Utc>,
) -> InventoryResult<LedgerBatch> {
    let mut posted = posted_transition(document, posted_at);
    let mut batch = LedgerBatch::transition_only(DocumentTransition {
        document: posted.clone(),
        expected_status: DocumentStatus::Confirmed,
    });
    let mut stock = StockBook::default();
    let mut balances = BalanceBook::default();
    let day = posted_at.date_naive();

    if document.kind == DocumentKind::Receipt {
        for (index, line) in posted.lines.iter_mut().enumerate() {
            material(materials, line.material_id)?;
            let value = line
                .quantity
                .checked_mul(line.unit_cost.unwrap_or_default())
                .map(round_money)
                .ok_or_else(|| InventoryError::out_of_range(format!("lines[{index}].unit_cost")))?;

            batch.new_lots.push(StockLot {
                id: Uuid::new_v4(),
                warehouse_id: document.warehouse_id,
                material_id: line.material_id,
                lot_number: line.lot_number.clone(),
                manufactured_on: line.manufactured_on,
                expires_on: line.expires_on,
                received_quantity: line.quantity,
                remaining_quantity: line.quantity,
                unit_cost: line.unit_cost,
                source_document_id: document.id,
                sequence: 0,
                created_at: posted_at,
            });
            stock.add(document.warehouse_id, line.material_id, line.quantity)?;
            balances.record_in(
                document.warehouse_id,
                line.material_id,
                day,
                line.quantity,
                value,
            )?;

            line.posted_unit_cost = line.unit_cost.map(round_money);
            line.posted_value = Some(value);
        }
    } else {
        ensure_available(document, materials, &lots)?;
        let destination = document.destination_warehouse_id;

        for (index, line) in posted.lines.iter_mut().enumerate() {
            let material = material(materials, line.material_id)?;
            let working = lots.entry(line.material_id).or_default();

            let draws = match &line.allocation {
                Some(selection) => allocate_manual(working, selection, line.quantity),
                None => allocate_fefo(working, line.quantity),
            }
            .map_err(|err| match err {
                AllocationError::Insufficient {
                    requested,
                    available,
                } => InventoryError::InsufficientStock {
                    material_id: material.id,
                    material_code: material.code.clone(),
                    requested,
                    available,
                    shortfall: requested - available,
                },
                other => allocation_error(index, other),
            })?;

            let cost = cost_outgoing(
                material.effective_costing_method(),
                working,
                &draws,
                line.quantity,
            );

            for draw in &draws {
                batch.lot_deltas.push(LotDelta {
                    lot_id: draw.lot_id,
                    delta: -draw.quantity,
                });
                batch.allocations.push(IssueAllocation {
                    id: Uuid::new_v4(),
                    document_id: document.id,
                    line_no: line.line_no,
                    lot_id: draw.lot_id,
                    warehouse_id: document.warehouse_id,
                    material_id: line.material_id,
                    quantity: draw.quantity,
                    unit_cost: draw.unit_cost,
                    created_at: posted_at,
                    reversed_at: None,
                });
            }
            stock.add(document.warehouse_id, line.material_id, -line.quantity)?;
            balances.record_out(
                document.warehouse_id,
                line.material_id,
                day,
                line.quantity,
                cost.value,
            )?;

            if let Some(destination_id) = destination {
                for draw in &draws {
                    batch.new_lots.push(transferred_lot(
                        working,
                        draw,
                        line.material_id,
                        destination_id,
                        document.id,
                        posted_at,
                    ));
                }
                // Destination lots keep their source cost, so the in-side is
                // valued at those costs rather than the outgoing average.
                let value_in = drawn_value(
                    draws.iter().map(|draw| (draw.quantity, draw.unit_cost)),
                    &format!("lines[{index}].quantity"),
                )?;
                stock.add(destination_id, line.material_id, line.quantity)?;
                balances.record_in(
                    destination_id,
                    line.material_id,
                    day,
                    line.quantity,
                    value_in,
                )?;
            }

            apply_draws(working, &draws);
            line.posted_unit_cost = Some(cost.unit_cost);
            line.posted_value = Some(cost.value);
        }
    }

    batch.stock_deltas = stock.into_deltas();
    batch.balance_deltas = balances.into_deltas();
    batch.transition.document = posted;
    Ok(batch)
}

/// Destination copy of a drawn source lot, keeping its identity and cost.
fn transferred_lot(
    source_lots: &[StockLot],
    draw: &PlannedDraw,
    material_id: Uuid,
    destination_id: Uuid,
    document_id: Uuid,
    posted_at: DateTime<Utc>,
) -> StockLot {
    let source = source_lots.iter().find(|lot| lot.id == draw.lot_id);
    StockLot {
        id: Uuid::new_v4(),
        warehouse_id: destination_id,
        material_id,
        lot_number: source.and_then(|lot| lot.lot_number.clone()),
        manufactured_on: source.and_then(|lot| lot.manufactured_on),
        expires_on: source.and_then(|lot| lot.expires_on),
        received_quantity: draw.quantity,
        remaining_quantity: draw.quantity,
        unit_cost: draw.unit_cost,
        source_document_id: document_id,
        sequence: 0,
        created_at: posted_at,
    }
}

/// Plans Posted -> Cancelled: the exact inverse of the posting, with
/// offsetting daily balance entries on the reversal day.
///
/// `created_lots` are the lots the document created (receipt lots, or the
/// destination lots of a transfer); each must still hold its full quantity.
/// `allocations` are the document's allocations.
pub fn plan_reversal(
    document: &StockDocument,
    allocations: &[IssueAllocation],
    created_lots: &[StockLot],
    actor: &str,
    reason: Option<String>,
    reversed_at: DateTime<Utc>,
) -> InventoryResult<LedgerBatch> {
    let mut cancelled = document.clone();
    cancelled.status = DocumentStatus::Cancelled;
    cancelled.cancelled_by = Some(actor.to_string());
    cancelled.cancelled_at = Some(reversed_at);
    cancelled.cancel_reason = reason;

    let mut batch = LedgerBatch::transition_only(DocumentTransition {
        document: cancelled,
        expected_status: DocumentStatus::Posted,
    });
    let mut stock = StockBook::default();
    let mut balances = BalanceBook::default();
    let day = reversed_at.date_naive();

    for lot in created_lots {
        if lot.remaining_quantity != lot.received_quantity {
            return Err(InventoryError::ReversalBlocked {
                number: document.number.clone(),
                lot_id: lot.id,
            });
        }
        batch.lot_deltas.push(LotDelta {
            lot_id: lot.id,
            delta: -lot.received_quantity,
        });
        stock.add(lot.warehouse_id, lot.material_id, -lot.received_quantity)?;
    }

    if document.kind.draws_stock() {
        for allocation in allocations.iter().filter(|a| a.is_active()) {
            batch.lot_deltas.push(LotDelta {
                lot_id: allocation.lot_id,
                delta: allocation.quantity,
            });
            stock.add(
                allocation.warehouse_id,
                allocation.material_id,
                allocation.quantity,
            )?;
        }
        batch.reverse_allocations_of = Some(document.id);
    }

    for (index, line) in document.lines.iter().enumerate() {
        let value = line.posted_value.unwrap_or_default();
        match document.kind {
            DocumentKind::Receipt => balances.record_in(
                document.warehouse_id,
                line.material_id,
                day,
                -line.quantity,
                -value,
            )?,
            DocumentKind::Issue => balances.record_out(
                document.warehouse_id,
                line.material_id,
                day,
                -line.quantity,
                -value,
            )?,
            DocumentKind::Transfer => {
                balances.record_out(
                    document.warehouse_id,
                    line.material_id,
                    day,
                    -line.quantity,
                    -value,
                )?;
                if let Some(destination_id) = document.destination_warehouse_id {
                    let value_in = drawn_value(
                        allocations
                            .iter()
                            .filter(|a| a.is_active() && a.line_no == line.line_no)
                            .map(|a| (a.quantity, a.unit_cost)),
                        &format!("lines[{index}].quantity"),
                    )?;
                    balances.record_in(
                        destination_id,
                        line.material_id,
                        day,
                        -line.quantity,
                        -value_in,
                    )?;
                }
            }
        }
    }

    batch.stock_deltas = stock.into_deltas();
    batch.balance_deltas = balances.into_deltas();
    Ok(batch)
}
