mod events;
mod ledger;
mod numbering;

pub use events::InMemoryEventStore;
pub use ledger::InMemoryLedgerStore;
pub use numbering::InMemoryDocumentNumbering;
