//! Daily balance ledger helpers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use depot_core::{BalanceDelta, StockBalance, round_money};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};

fn accumulate(total: &mut Decimal, amount: Decimal, field: &str) -> InventoryResult<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| InventoryError::out_of_range(field))?;
    Ok(())
}

/// Collects the balance movements of one batch, one entry per
/// (warehouse, material, day).
#[derive(Debug, Default)]
pub struct BalanceBook {
    entries: BTreeMap<(Uuid, Uuid, NaiveDate), BalanceDelta>,
}

impl BalanceBook {
    fn entry(
        &mut self,
        warehouse_id: Uuid,
        material_id: Uuid,
        date: NaiveDate,
    ) -> &mut BalanceDelta {
        self.entries
            .entry((warehouse_id, material_id, date))
            .or_insert_with(|| BalanceDelta {
                warehouse_id,
                material_id,
                date,
                quantity_in: Decimal::ZERO,
                value_in: Decimal::ZERO,
                quantity_out: Decimal::ZERO,
                value_out: Decimal::ZERO,
            })
    }

    pub fn record_in(
        &mut self,
        warehouse_id: Uuid,
        material_id: Uuid,
        date: NaiveDate,
        quantity: Decimal,
        value: Decimal,
    ) -> InventoryResult<()> {
        let entry = self.entry(warehouse_id, material_id, date);
        accumulate(&mut entry.quantity_in, quantity, "quantity_in")?;
        accumulate(&mut entry.value_in, value, "value_in")
    }

    pub fn record_out(
        &mut self,
        warehouse_id: Uuid,
        material_id: Uuid,
        date: NaiveDate,
        quantity: Decimal,
        value: Decimal,
    ) -> InventoryResult<()> {
        let entry = self.entry(warehouse_id, material_id, date);
        accumulate(&mut entry.quantity_out, quantity, "quantity_out")?;
        accumulate(&mut entry.value_out, value, "value_out")
    }

    pub fn into_deltas(self) -> Vec<BalanceDelta> {
        self.entries.into_values().collect()
    }
}

/// Begin/in/out/end figures of one key over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeriodMovement {
    pub begin_quantity: Decimal,
    pub begin_value: Decimal,
    pub quantity_in: Decimal,
    pub value_in: Decimal,
    pub quantity_out: Decimal,
    pub value_out: Decimal,
    pub end_quantity: Decimal,
    pub end_value: Decimal,
}

/// Rewinds a live (quantity, value) past the movements booked after the
/// period end, giving the period's closing figures.
pub fn closing_position(
    live_quantity: Decimal,
    live_value: Decimal,
    after_period: &[StockBalance],
) -> (Decimal, Decimal) {
    after_period
        .iter()
        .fold((live_quantity, live_value), |(quantity, value), row| {
            (quantity - row.net_quantity(), value - row.net_value())
        })
}

/// Period figures from the closing position and the rows inside the period:
/// `begin = end - in + out`.
///
/// This is a reconstruction from daily totals, not a replay of lot history,
/// so postings back-dated into a closed period shift every later opening
/// balance.
pub fn period_movement(
    end_quantity: Decimal,
    end_value: Decimal,
    in_period: &[StockBalance],
) -> PeriodMovement {
    let mut movement = PeriodMovement {
        end_quantity,
        end_value: round_money(end_value),
        ..PeriodMovement::default()
    };
    for row in in_period {
        movement.quantity_in += row.quantity_in;
        movement.value_in += row.value_in;
        movement.quantity_out += row.quantity_out;
        movement.value_out += row.value_out;
    }
    movement.value_in = round_money(movement.value_in);
    movement.value_out = round_money(movement.value_out);
    movement.begin_quantity = end_quantity - movement.quantity_in + movement.quantity_out;
    movement.begin_value = round_money(end_value - movement.value_in + movement.value_out);
    movement
}
