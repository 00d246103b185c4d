//! Unit cost of outgoing stock and point-in-time valuation.
//!
//! Every returned money amount is rounded to two decimals.

use depot_core::{CostingMethod, StockLot, round_money};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::allocation::PlannedDraw;

/// Value-weighted mean cost over lots with stock left and a known cost.
/// Zero when no such quantity exists.
pub fn weighted_average_unit_cost(lots: &[StockLot]) -> Decimal {
    let (quantity, value) = lots
        .iter()
        .filter(|lot| lot.remaining_quantity > Decimal::ZERO)
        .filter_map(|lot| lot.unit_cost.map(|cost| (lot.remaining_quantity, cost)))
        .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), (q, cost)| {
            (qty + q, value + q * cost)
        });

    if quantity.is_zero() {
        return Decimal::ZERO;
    }
    round_money(value / quantity)
}

/// Cost of the oldest lot that still holds stock.
pub fn fifo_unit_cost(lots: &[StockLot]) -> Decimal {
    lots.iter()
        .filter(|lot| lot.remaining_quantity > Decimal::ZERO)
        .min_by_key(|lot| lot.creation_key())
        .and_then(|lot| lot.unit_cost)
        .map(round_money)
        .unwrap_or(Decimal::ZERO)
}

pub fn current_unit_cost(method: CostingMethod, lots: &[StockLot]) -> Decimal {
    match method {
        CostingMethod::WeightedAverage => weighted_average_unit_cost(lots),
        CostingMethod::Fifo => fifo_unit_cost(lots),
    }
}

/// Quantity-weighted cost of the lots an allocation actually consumed.
/// Draws from lots without a known cost are left out of the mean.
pub fn blended_unit_cost(draws: &[PlannedDraw]) -> Decimal {
    let (quantity, value) = draws
        .iter()
        .filter_map(|draw| draw.unit_cost.map(|cost| (draw.quantity, cost)))
        .fold((Decimal::ZERO, Decimal::ZERO), |(qty, value), (q, cost)| {
            (qty + q, value + q * cost)
        });

    if quantity.is_zero() {
        return Decimal::ZERO;
    }
    round_money(value / quantity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IssueCost {
    pub unit_cost: Decimal,
    pub value: Decimal,
}

/// Cost booked for one outgoing line.
///
/// `lots_before` is the lot state before the line's draws are applied; it only
/// matters for weighted average. FIFO blends the lots in `draws`.
pub fn cost_outgoing(
    method: CostingMethod,
    lots_before: &[StockLot],
    draws: &[PlannedDraw],
    quantity: Decimal,
) -> IssueCost {
    match method {
        CostingMethod::WeightedAverage => {
            let unit_cost = weighted_average_unit_cost(lots_before);
            IssueCost {
                unit_cost,
                value: round_money(unit_cost * quantity),
            }
        }
        CostingMethod::Fifo => {
            let value: Decimal = draws
                .iter()
                .map(|draw| draw.quantity * draw.unit_cost.unwrap_or_default())
                .sum();
            IssueCost {
                unit_cost: blended_unit_cost(draws),
                value: round_money(value),
            }
        }
    }
}

pub fn lot_value(lot: &StockLot) -> Decimal {
    lot.remaining_quantity * lot.unit_cost.unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub method: CostingMethod,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub value: Decimal,
}

/// Valuation from live lot quantities. Historical figures are derived from
/// the daily balances instead, see [`crate::balance::period_movement`].
pub fn valuation(method: CostingMethod, lots: &[StockLot]) -> Valuation {
    let quantity = lots
        .iter()
        .filter(|lot| lot.remaining_quantity > Decimal::ZERO)
        .map(|lot| lot.remaining_quantity)
        .sum();
    let value = lots.iter().map(lot_value).sum();

    Valuation {
        method,
        quantity,
        unit_cost: current_unit_cost(method, lots),
        value: round_money(value),
    }
}
