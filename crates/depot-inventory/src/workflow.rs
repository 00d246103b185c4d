use std::fmt;

use depot_core::DocumentStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Confirm,
    Post,
    Cancel,
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Confirm => "confirm",
            Self::Post => "post",
            Self::Cancel => "cancel",
        })
    }
}

/// What a legal transition does to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    Apply,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub effect: StockEffect,
}

/// New -> Confirmed -> Posted, with Cancelled reachable from any of them.
/// Cancelled is absorbing.
pub fn transition(from: DocumentStatus, action: WorkflowAction) -> Option<Transition> {
    use DocumentStatus::{Cancelled, Confirmed, New, Posted};

    let (to, effect) = match (from, action) {
        (New, WorkflowAction::Confirm) => (Confirmed, StockEffect::None),
        (Confirmed, WorkflowAction::Post) => (Posted, StockEffect::Apply),
        (New | Confirmed, WorkflowAction::Cancel) => (Cancelled, StockEffect::None),
        (Posted, WorkflowAction::Cancel) => (Cancelled, StockEffect::Reverse),
        _ => return None,
    };

    Some(Transition { from, to, effect })
}
