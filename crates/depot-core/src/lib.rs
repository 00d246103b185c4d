pub mod documents;
pub mod events;
pub mod models;
pub mod standards;
pub mod storage;

pub use documents::{DocumentKind, DocumentLine, DocumentStatus, LotDraw, StockDocument};
pub use events::{DomainEvent, DomainEventKind};
pub use models::{IssueAllocation, Material, Stock, StockBalance, StockLot, Warehouse};
pub use standards::{AMOUNT_LIMIT, CostingMethod, MAX_SCALE, round_money};
pub use storage::{
    BalanceDelta, DocumentFilter, DocumentNumbering, DocumentTransition, EventEnvelope,
    EventStore, LedgerBatch, LedgerStore, LotDelta, Notifier, PostingNotice, StockDelta,
    StoreError, StoreResult,
};
