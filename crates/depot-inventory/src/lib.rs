//! Lot allocation, costing and the document workflow that moves stock.

pub mod allocation;
pub mod balance;
pub mod costing;
pub mod error;
pub mod ledger;
pub mod service;
pub mod validation;
pub mod workflow;

pub use allocation::{AllocationError, PlannedDraw, allocate_fefo, allocate_manual, fefo_order};
pub use balance::{BalanceBook, PeriodMovement, closing_position, period_movement};
pub use costing::{IssueCost, Valuation, cost_outgoing, current_unit_cost, valuation};
pub use error::{FieldError, InventoryError, InventoryResult};
pub use ledger::{LotsByMaterial, plan_posting, plan_reversal};
pub use service::{DEFAULT_POSTING_ATTEMPTS, InventoryService};
pub use validation::{NewDocument, NewDocumentLine, NewMaterial, NewWarehouse};
pub use workflow::{StockEffect, Transition, WorkflowAction, transition};
