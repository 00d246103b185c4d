pub mod cache;
pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_events;
pub mod pg_store;
pub mod redis_bus;

pub use cache::LookupCache;
pub use config::{ServiceConfig, StoreBackend};
pub use contracts::{
    CancelRequest, ConfirmRequest, ErrorBody, ErrorDetail, ListDocumentsQuery,
    NotificationFailureView, NotificationFailuresQuery, ReportQuery, SetCostingMethodRequest,
};
pub use db::{bootstrap_schema, connect_database};
pub use pg_events::PgEventStore;
pub use pg_store::{PgDocumentNumbering, PgLedgerStore};
pub use redis_bus::{DOCUMENT_CHANNEL, LogNotifier, RedisBus};
