//! Lot selection for outgoing stock.
//!
//! FEFO is the default: lots with an expiry date go before lots without one,
//! earlier expiry first, then earlier manufacture date, then creation order.
//! Callers may pass an explicit selection instead, which is checked against the
//! same lots.

use std::cmp::Ordering;
use std::collections::HashMap;

use depot_core::{LotDraw, StockLot};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Quantity to take from one lot, with the lot's cost carried along for costing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedDraw {
    pub lot_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("requested quantity must be positive, got {0}")]
    NonPositiveRequest(Decimal),

    #[error("{available} available, {requested} requested")]
    Insufficient {
        requested: Decimal,
        available: Decimal,
    },

    #[error("lot {0} does not hold this material in this warehouse")]
    UnknownLot(Uuid),

    #[error("draw from lot {lot_id} must be positive, got {quantity}")]
    NonPositiveDraw { lot_id: Uuid, quantity: Decimal },

    #[error("lot {lot_id} holds {available}, cannot draw {requested}")]
    LotOverdrawn {
        lot_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("selected lots total {allocated}, line requires {requested}")]
    TotalMismatch {
        requested: Decimal,
        allocated: Decimal,
    },
}

fn dated_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn fefo_cmp(a: &StockLot, b: &StockLot) -> Ordering {
    dated_first(a.expires_on, b.expires_on)
        .then_with(|| dated_first(a.manufactured_on, b.manufactured_on))
        .then_with(|| a.creation_key().cmp(&b.creation_key()))
}

/// Lots with stock left, in FEFO order.
pub fn fefo_order(lots: &[StockLot]) -> Vec<&StockLot> {
    let mut ordered: Vec<&StockLot> = lots.iter().filter(|lot| !lot.is_depleted()).collect();
    ordered.sort_by(|a, b| fefo_cmp(a, b));
    ordered
}

pub fn available_quantity(lots: &[StockLot]) -> Decimal {
    lots.iter()
        .filter(|lot| !lot.is_depleted())
        .map(|lot| lot.remaining_quantity)
        .sum()
}

/// Greedy FEFO draw of exactly `requested`. Fails without drawing anything
/// when the lots cannot cover it.
pub fn allocate_fefo(
    lots: &[StockLot],
    requested: Decimal,
) -> Result<Vec<PlannedDraw>, AllocationError> {
    if requested <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveRequest(requested));
    }

    let available = available_quantity(lots);
    if available < requested {
        return Err(AllocationError::Insufficient {
            requested,
            available,
        });
    }

    let mut remaining = requested;
    let mut draws = Vec::new();
    for lot in fefo_order(lots) {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = lot.remaining_quantity.min(remaining);
        draws.push(PlannedDraw {
            lot_id: lot.id,
            quantity: take,
            unit_cost: lot.unit_cost,
        });
        remaining -= take;
    }

    Ok(draws)
}

/// Checks a caller-supplied selection: every lot must be one of `lots`, no lot
/// may be drawn past its remaining quantity, and the draws must add up to
/// `requested`. Repeated lots are merged.
pub fn allocate_manual(
    lots: &[StockLot],
    selection: &[LotDraw],
    requested: Decimal,
) -> Result<Vec<PlannedDraw>, AllocationError> {
    if requested <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveRequest(requested));
    }

    let by_id: HashMap<Uuid, &StockLot> = lots.iter().map(|lot| (lot.id, lot)).collect();
    let mut draws: Vec<PlannedDraw> = Vec::with_capacity(selection.len());

    for draw in selection {
        if draw.quantity <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveDraw {
                lot_id: draw.lot_id,
                quantity: draw.quantity,
            });
        }
        let lot = by_id
            .get(&draw.lot_id)
            .ok_or(AllocationError::UnknownLot(draw.lot_id))?;

        match draws.iter_mut().find(|planned| planned.lot_id == draw.lot_id) {
            Some(planned) => planned.quantity += draw.quantity,
            None => draws.push(PlannedDraw {
                lot_id: lot.id,
                quantity: draw.quantity,
                unit_cost: lot.unit_cost,
            }),
        }
    }

    for planned in &draws {
        let available = by_id
            .get(&planned.lot_id)
            .map(|lot| lot.remaining_quantity)
            .unwrap_or_default();
        if planned.quantity > available {
            return Err(AllocationError::LotOverdrawn {
                lot_id: planned.lot_id,
                requested: planned.quantity,
                available,
            });
        }
    }

    let allocated: Decimal = draws.iter().map(|draw| draw.quantity).sum();
    if allocated != requested {
        return Err(AllocationError::TotalMismatch {
            requested,
            allocated,
        });
    }

    Ok(draws)
}

/// Applies draws to working copies of the lots.
pub fn apply_draws(lots: &mut [StockLot], draws: &[PlannedDraw]) {
    for draw in draws {
        if let Some(lot) = lots.iter_mut().find(|lot| lot.id == draw.lot_id) {
            lot.remaining_quantity -= draw.quantity;
        }
    }
}
