mod error;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use depot_core::{
    DocumentFilter, DocumentKind, DocumentNumbering, DocumentStatus, DomainEventKind, EventStore,
    IssueAllocation, LedgerStore, Material, Notifier, Stock, StockDocument, StockLot, Warehouse,
};
use depot_finance::{Labels, Report, ReportBuilder, ReportKind, ReportPeriod};
use depot_inventory::{
    FieldError, InventoryService, NewDocument, NewMaterial, NewWarehouse, Valuation,
};
use depot_platform::{
    CancelRequest, ConfirmRequest, ListDocumentsQuery, LogNotifier, LookupCache,
    NotificationFailureView, NotificationFailuresQuery, PgDocumentNumbering, PgEventStore,
    PgLedgerStore, RedisBus, ReportQuery, ServiceConfig, SetCostingMethodRequest, StoreBackend,
    bootstrap_schema, connect_database,
};
use depot_store::{InMemoryDocumentNumbering, InMemoryEventStore, InMemoryLedgerStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_FAILURE_LIMIT: usize = 50;
const MAX_FAILURE_LIMIT: usize = 500;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
struct AppState {
    service: InventoryService,
    reports: ReportBuilder,
    cache: LookupCache,
}

/// Report labels served from the lookup cache.
struct CachedLabels<'a>(&'a LookupCache);

#[async_trait]
impl Labels for CachedLabels<'_> {
    async fn warehouse_name(&self, id: Uuid) -> Option<String> {
        self.0.warehouse_name(id).await
    }

    async fn material_name(&self, id: Uuid) -> Option<String> {
        self.0.material_name(id).await
    }
}

struct Backends {
    store: Arc<dyn LedgerStore>,
    numbering: Arc<dyn DocumentNumbering>,
    events: Arc<dyn EventStore>,
}

async fn open_backends(config: &ServiceConfig) -> AnyResult<Backends> {
    match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required when DEPOT_STORE=postgres")?;
            let pool = connect_database(url, config.database_max_connections).await?;
            bootstrap_schema(&pool).await?;
            Ok(Backends {
                store: Arc::new(PgLedgerStore::new(pool.clone())),
                numbering: Arc::new(PgDocumentNumbering::new(pool.clone())),
                events: Arc::new(PgEventStore::new(pool)),
            })
        }
        StoreBackend::Memory => {
            warn!("using the in-memory store; data is lost on restart");
            Ok(Backends {
                store: Arc::new(InMemoryLedgerStore::new()),
                numbering: Arc::new(InMemoryDocumentNumbering::default()),
                events: Arc::new(InMemoryEventStore::default()),
            })
        }
    }
}

fn open_notifier(config: &ServiceConfig) -> AnyResult<Arc<dyn Notifier>> {
    match config.redis_url.as_deref() {
        Some(url) => Ok(Arc::new(RedisBus::connect(url)?)),
        None => {
            info!("REDIS_URL not set; document notices are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "depot_gateway=info,depot_inventory=info,tower_http=info".to_string()
        }))
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let backends = open_backends(&config).await?;
    let notifier = open_notifier(&config)?;

    let service = InventoryService::new(
        backends.store.clone(),
        backends.numbering,
        backends.events,
        notifier,
    )
    .with_max_attempts(config.posting_max_attempts);
    let state = AppState {
        service,
        reports: ReportBuilder::new(backends.store.clone()),
        cache: LookupCache::new(backends.store, config.lookup_cache_ttl),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/warehouses", get(list_warehouses).post(create_warehouse))
        .route("/materials", get(list_materials).post(create_material))
        .route("/materials/{id}/costing-method", put(set_costing_method))
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/{id}", get(get_document))
        .route("/documents/{id}/confirm", post(confirm_document))
        .route("/documents/{id}/post", post(post_document))
        .route("/documents/{id}/cancel", post(cancel_document))
        .route("/documents/{id}/allocations", get(document_allocations))
        .route("/stock/{warehouse_id}/{material_id}", get(stock))
        .route("/stock/{warehouse_id}/{material_id}/lots", get(stock_lots))
        .route("/stock/{warehouse_id}/{material_id}/unit-cost", get(unit_cost))
        .route("/reports/{kind}", get(report))
        .route("/ops/notification-failures", get(notification_failures))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_warehouse(
    State(state): State<AppState>,
    Json(payload): Json<NewWarehouse>,
) -> Result<(StatusCode, Json<Warehouse>), ApiError> {
    let warehouse = state.service.create_warehouse(payload).await?;
    Ok((StatusCode::CREATED, Json(warehouse)))
}

async fn list_warehouses(State(state): State<AppState>) -> ApiResult<Vec<Warehouse>> {
    Ok(Json(state.service.warehouses().await?))
}

async fn create_material(
    State(state): State<AppState>,
    Json(payload): Json<NewMaterial>,
) -> Result<(StatusCode, Json<Material>), ApiError> {
    let material = state.service.create_material(payload).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

async fn list_materials(State(state): State<AppState>) -> ApiResult<Vec<Material>> {
    Ok(Json(state.service.materials().await?))
}

async fn set_costing_method(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetCostingMethodRequest>,
) -> ApiResult<Material> {
    let material = state
        .service
        .set_costing_method(id, payload.costing_method)
        .await?;
    state.cache.refresh_material(material.clone()).await;
    Ok(Json(material))
}

async fn create_document(
    State(state): State<AppState>,
    Json(payload): Json<NewDocument>,
) -> Result<(StatusCode, Json<StockDocument>), ApiError> {
    let document = state.service.create_document(payload).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

fn document_filter(query: ListDocumentsQuery) -> Result<DocumentFilter, ApiError> {
    let mut errors = Vec::new();
    let mut filter = DocumentFilter {
        warehouse_id: query.warehouse_id,
        ..DocumentFilter::default()
    };
    if let Some(kind) = query.kind.as_deref().filter(|kind| !kind.trim().is_empty()) {
        match kind.parse::<DocumentKind>() {
            Ok(kind) => filter.kind = Some(kind),
            Err(message) => errors.push(FieldError::new("kind", message)),
        }
    }
    if let Some(status) = query.status.as_deref().filter(|status| !status.trim().is_empty()) {
        match status.parse::<DocumentStatus>() {
            Ok(status) => filter.status = Some(status),
            Err(message) => errors.push(FieldError::new("status", message)),
        }
    }
    if errors.is_empty() {
        Ok(filter)
    } else {
        Err(ApiError::validation(errors))
    }
}

async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Vec<StockDocument>> {
    let filter = document_filter(query)?;
    Ok(Json(state.service.documents(&filter).await?))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StockDocument> {
    Ok(Json(state.service.document(id).await?))
}

async fn confirm_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmRequest>,
) -> ApiResult<StockDocument> {
    Ok(Json(state.service.confirm(id, &payload.actor).await?))
}

async fn post_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StockDocument> {
    Ok(Json(state.service.post(id).await?))
}

async fn cancel_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> ApiResult<StockDocument> {
    Ok(Json(
        state
            .service
            .cancel(id, &payload.actor, payload.reason)
            .await?,
    ))
}

async fn document_allocations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<IssueAllocation>> {
    Ok(Json(state.service.allocations(id).await?))
}

async fn stock(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Stock> {
    Ok(Json(state.service.stock(warehouse_id, material_id).await?))
}

async fn stock_lots(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Vec<StockLot>> {
    Ok(Json(state.service.lots(warehouse_id, material_id).await?))
}

async fn unit_cost(
    State(state): State<AppState>,
    Path((warehouse_id, material_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Valuation> {
    Ok(Json(
        state.service.valuation(warehouse_id, material_id).await?,
    ))
}

async fn report(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Report> {
    let kind: ReportKind = kind.parse()?;
    let (Some(from), Some(to)) = (query.from, query.to) else {
        let mut errors = Vec::new();
        if query.from.is_none() {
            errors.push(FieldError::new("from", "from is required"));
        }
        if query.to.is_none() {
            errors.push(FieldError::new("to", "to is required"));
        }
        return Err(ApiError::validation(errors));
    };
    let period = ReportPeriod::new(from, to)?;

    let labels = CachedLabels(&state.cache);
    let report = state
        .reports
        .build(kind, period, query.warehouse_id, &labels)
        .await?;
    Ok(Json(report))
}

async fn notification_failures(
    State(state): State<AppState>,
    Query(query): Query<NotificationFailuresQuery>,
) -> ApiResult<Vec<NotificationFailureView>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FAILURE_LIMIT)
        .clamp(1, MAX_FAILURE_LIMIT);
    let failures = state
        .service
        .events()
        .by_kind(DomainEventKind::NotificationFailed, limit)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(failures.iter().map(NotificationFailureView::from).collect()))
}
