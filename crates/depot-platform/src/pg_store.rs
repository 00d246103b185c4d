//! Postgres-backed ledger. `commit` runs one transaction that locks the
//! document row and applies every lot change as a guarded update, so two
//! postings racing for the same lots cannot both succeed.

use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use depot_core::{
    CostingMethod, DocumentFilter, DocumentKind, DocumentLine, DocumentNumbering, DocumentStatus,
    IssueAllocation, LedgerBatch, LedgerStore, Material, Stock, StockBalance, StockDocument,
    StockLot, StoreError, StoreResult, Warehouse,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::Error::new(err))
}

/// Constraint violations surface as conflicts; anything else is a backend
/// failure.
fn write_error(err: sqlx::Error, context: &str) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some(UNIQUE_VIOLATION) | Some(CHECK_VIOLATION) => {
            StoreError::conflict(format!("{context}: {err}"))
        }
        _ => backend(err),
    }
}

fn parse_column<T>(value: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|err: String| StoreError::Backend(anyhow!(err)))
}

fn warehouse_from_row(row: &PgRow) -> StoreResult<Warehouse> {
    Ok(Warehouse {
        id: row.try_get("id").map_err(backend)?,
        code: row.try_get("code").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn material_from_row(row: &PgRow) -> StoreResult<Material> {
    let costing_method: Option<String> = row.try_get("costing_method").map_err(backend)?;
    Ok(Material {
        id: row.try_get("id").map_err(backend)?,
        code: row.try_get("code").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        unit: row.try_get("unit").map_err(backend)?,
        costing_method: costing_method
            .as_deref()
            .map(parse_column::<CostingMethod>)
            .transpose()?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn document_from_row(row: &PgRow) -> StoreResult<StockDocument> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let Json(lines): Json<Vec<DocumentLine>> = row.try_get("lines").map_err(backend)?;
    Ok(StockDocument {
        id: row.try_get("id").map_err(backend)?,
        number: row.try_get("number").map_err(backend)?,
        kind: parse_column(&kind)?,
        status: parse_column(&status)?,
        warehouse_id: row.try_get("warehouse_id").map_err(backend)?,
        destination_warehouse_id: row.try_get("destination_warehouse_id").map_err(backend)?,
        lines,
        note: row.try_get("note").map_err(backend)?,
        created_by: row.try_get("created_by").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        confirmed_by: row.try_get("confirmed_by").map_err(backend)?,
        confirmed_at: row.try_get("confirmed_at").map_err(backend)?,
        posted_at: row.try_get("posted_at").map_err(backend)?,
        cancelled_by: row.try_get("cancelled_by").map_err(backend)?,
        cancelled_at: row.try_get("cancelled_at").map_err(backend)?,
        cancel_reason: row.try_get("cancel_reason").map_err(backend)?,
    })
}

fn lot_from_row(row: &PgRow) -> StoreResult<StockLot> {
    Ok(StockLot {
        id: row.try_get("id").map_err(backend)?,
        warehouse_id: row.try_get("warehouse_id").map_err(backend)?,
        material_id: row.try_get("material_id").map_err(backend)?,
        lot_number: row.try_get("lot_number").map_err(backend)?,
        manufactured_on: row.try_get("manufactured_on").map_err(backend)?,
        expires_on: row.try_get("expires_on").map_err(backend)?,
        received_quantity: row.try_get("received_quantity").map_err(backend)?,
        remaining_quantity: row.try_get("remaining_quantity").map_err(backend)?,
        unit_cost: row.try_get("unit_cost").map_err(backend)?,
        source_document_id: row.try_get("source_document_id").map_err(backend)?,
        sequence: row.try_get("sequence").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn stock_from_row(row: &PgRow) -> StoreResult<Stock> {
    Ok(Stock {
        warehouse_id: row.try_get("warehouse_id").map_err(backend)?,
        material_id: row.try_get("material_id").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn balance_from_row(row: &PgRow) -> StoreResult<StockBalance> {
    Ok(StockBalance {
        warehouse_id: row.try_get("warehouse_id").map_err(backend)?,
        material_id: row.try_get("material_id").map_err(backend)?,
        date: row.try_get("balance_date").map_err(backend)?,
        quantity_in: row.try_get("quantity_in").map_err(backend)?,
        value_in: row.try_get("value_in").map_err(backend)?,
        quantity_out: row.try_get("quantity_out").map_err(backend)?,
        value_out: row.try_get("value_out").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn allocation_from_row(row: &PgRow) -> StoreResult<IssueAllocation> {
    Ok(IssueAllocation {
        id: row.try_get("id").map_err(backend)?,
        document_id: row.try_get("document_id").map_err(backend)?,
        line_no: row.try_get("line_no").map_err(backend)?,
        lot_id: row.try_get("lot_id").map_err(backend)?,
        warehouse_id: row.try_get("warehouse_id").map_err(backend)?,
        material_id: row.try_get("material_id").map_err(backend)?,
        quantity: row.try_get("quantity").map_err(backend)?,
        unit_cost: row.try_get("unit_cost").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        reversed_at: row.try_get("reversed_at").map_err(backend)?,
    })
}

const LOT_COLUMNS: &str = r#"
    id, warehouse_id, material_id, lot_number, manufactured_on, expires_on,
    received_quantity, remaining_quantity, unit_cost, source_document_id,
    sequence, created_at
"#;

const DOCUMENT_COLUMNS: &str = r#"
    id, number, kind, status, warehouse_id, destination_warehouse_id, lines, note,
    created_by, created_at, confirmed_by, confirmed_at, posted_at,
    cancelled_by, cancelled_at, cancel_reason
"#;

const ALLOCATION_COLUMNS: &str = r#"
    id, document_id, line_no, lot_id, warehouse_id, material_id, quantity,
    unit_cost, created_at, reversed_at
"#;

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_warehouse(&self, warehouse: &Warehouse) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO warehouses (id, code, name, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(warehouse.id)
        .bind(&warehouse.code)
        .bind(&warehouse.name)
        .bind(warehouse.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            write_error(err, &format!("warehouse code {} already exists", warehouse.code))
        })?;
        Ok(())
    }

    async fn warehouse(&self, id: Uuid) -> StoreResult<Option<Warehouse>> {
        let row = sqlx::query("SELECT id, code, name, created_at FROM warehouses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(warehouse_from_row).transpose()
    }

    async fn warehouses(&self) -> StoreResult<Vec<Warehouse>> {
        let rows = sqlx::query("SELECT id, code, name, created_at FROM warehouses ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(warehouse_from_row).collect()
    }

    async fn insert_material(&self, material: &Material) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO materials (id, code, name, unit, costing_method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(material.id)
        .bind(&material.code)
        .bind(&material.name)
        .bind(&material.unit)
        .bind(material.costing_method.map(|method| method.as_str()))
        .bind(material.created_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            write_error(err, &format!("material code {} already exists", material.code))
        })?;
        Ok(())
    }

    async fn material(&self, id: Uuid) -> StoreResult<Option<Material>> {
        let row = sqlx::query(
            "SELECT id, code, name, unit, costing_method, created_at FROM materials WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(material_from_row).transpose()
    }

    async fn materials(&self) -> StoreResult<Vec<Material>> {
        let rows = sqlx::query(
            "SELECT id, code, name, unit, costing_method, created_at FROM materials ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(material_from_row).collect()
    }

    async fn set_costing_method(
        &self,
        material_id: Uuid,
        method: Option<CostingMethod>,
    ) -> StoreResult<Material> {
        let row = sqlx::query(
            r#"
            UPDATE materials
            SET costing_method = $2
            WHERE id = $1
            RETURNING id, code, name, unit, costing_method, created_at
            "#,
        )
        .bind(material_id)
        .bind(method.map(|method| method.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            Some(row) => material_from_row(&row),
            None => Err(StoreError::not_found("material", material_id)),
        }
    }

    async fn insert_document(&self, document: &StockDocument) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_documents (
                id, number, kind, status, warehouse_id, destination_warehouse_id, lines,
                note, created_by, created_at, confirmed_by, confirmed_at, posted_at,
                cancelled_by, cancelled_at, cancel_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(document.id)
        .bind(&document.number)
        .bind(document.kind.as_str())
        .bind(document.status.as_str())
        .bind(document.warehouse_id)
        .bind(document.destination_warehouse_id)
        .bind(Json(&document.lines))
        .bind(document.note.as_deref())
        .bind(&document.created_by)
        .bind(document.created_at)
        .bind(document.confirmed_by.as_deref())
        .bind(document.confirmed_at)
        .bind(document.posted_at)
        .bind(document.cancelled_by.as_deref())
        .bind(document.cancelled_at)
        .bind(document.cancel_reason.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|err| write_error(err, &format!("document {} already exists", document.number)))?;
        Ok(())
    }

    async fn document(&self, id: Uuid) -> StoreResult<Option<StockDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM stock_documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<StockDocument>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM stock_documents
            WHERE ($1::text IS NULL OR kind = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3 OR destination_warehouse_id = $3)
              AND ($4::date IS NULL OR (posted_at AT TIME ZONE 'UTC')::date >= $4)
              AND ($5::date IS NULL OR (posted_at AT TIME ZONE 'UTC')::date <= $5)
            ORDER BY created_at
            "#
        ))
        .bind(filter.kind.map(|kind| kind.as_str()))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.warehouse_id)
        .bind(filter.posted_from)
        .bind(filter.posted_to)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn lots(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Vec<StockLot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE warehouse_id = $1 AND material_id = $2
            ORDER BY created_at, sequence
            "#
        ))
        .bind(warehouse_id)
        .bind(material_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn lot(&self, id: Uuid) -> StoreResult<Option<StockLot>> {
        let row = sqlx::query(&format!("SELECT {LOT_COLUMNS} FROM stock_lots WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(lot_from_row).transpose()
    }

    async fn lots_from_document(&self, document_id: Uuid) -> StoreResult<Vec<StockLot>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOT_COLUMNS}
            FROM stock_lots
            WHERE source_document_id = $1
            ORDER BY created_at, sequence
            "#
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn stock(&self, warehouse_id: Uuid, material_id: Uuid) -> StoreResult<Stock> {
        let row = sqlx::query(
            r#"
            SELECT warehouse_id, material_id, quantity, updated_at
            FROM stocks
            WHERE warehouse_id = $1 AND material_id = $2
            "#,
        )
        .bind(warehouse_id)
        .bind(material_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            Some(row) => stock_from_row(&row),
            None => Ok(Stock::empty(warehouse_id, material_id)),
        }
    }

    async fn stocks(&self, warehouse_id: Option<Uuid>) -> StoreResult<Vec<Stock>> {
        let rows = sqlx::query(
            r#"
            SELECT warehouse_id, material_id, quantity, updated_at
            FROM stocks
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
            ORDER BY warehouse_id, material_id
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(stock_from_row).collect()
    }

    async fn balances(
        &self,
        warehouse_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<StockBalance>> {
        let rows = sqlx::query(
            r#"
            SELECT warehouse_id, material_id, balance_date, quantity_in, value_in,
                   quantity_out, value_out, updated_at
            FROM stock_balances
            WHERE balance_date BETWEEN $1 AND $2
              AND ($3::uuid IS NULL OR warehouse_id = $3)
            ORDER BY warehouse_id, material_id, balance_date
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(balance_from_row).collect()
    }

    async fn allocations(&self, document_id: Uuid) -> StoreResult<Vec<IssueAllocation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM issue_allocations
            WHERE document_id = $1
            ORDER BY line_no, created_at
            "#
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(allocation_from_row).collect()
    }

    async fn allocations_for_lot(&self, lot_id: Uuid) -> StoreResult<Vec<IssueAllocation>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM issue_allocations
            WHERE lot_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(allocation_from_row).collect()
    }

    async fn commit(&self, batch: LedgerBatch) -> StoreResult<()> {
        let now = Utc::now();
        let document = &batch.transition.document;
        let expected = batch.transition.expected_status;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM stock_documents WHERE id = $1 FOR UPDATE")
                .bind(document.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let Some(status) = status else {
            return Err(StoreError::not_found("document", document.id));
        };
        let status: DocumentStatus = parse_column(&status)?;
        if status != expected {
            return Err(StoreError::conflict(format!(
                "document {} is {status} (expected {expected})",
                document.number
            )));
        }

        // Lots are updated in id order so concurrent batches lock them in the
        // same sequence.
        let mut lot_totals: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for delta in &batch.lot_deltas {
            let total = lot_totals.entry(delta.lot_id).or_default();
            *total = total
                .checked_add(delta.delta)
                .ok_or_else(|| StoreError::conflict("lot movement would overflow"))?;
        }
        for (lot_id, delta) in &lot_totals {
            let updated = sqlx::query(
                r#"
                UPDATE stock_lots
                SET remaining_quantity = remaining_quantity + $2
                WHERE id = $1
                  AND remaining_quantity + $2 >= 0
                  AND remaining_quantity + $2 <= received_quantity
                "#,
            )
            .bind(lot_id)
            .bind(delta)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            if updated.rows_affected() == 0 {
                return Err(StoreError::conflict(format!(
                    "lot {lot_id} cannot move by {delta}"
                )));
            }
        }

        for lot in &batch.new_lots {
            sqlx::query(
                r#"
                INSERT INTO stock_lots (
                    id, warehouse_id, material_id, lot_number, manufactured_on, expires_on,
                    received_quantity, remaining_quantity, unit_cost, source_document_id,
                    created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(lot.id)
            .bind(lot.warehouse_id)
            .bind(lot.material_id)
            .bind(lot.lot_number.as_deref())
            .bind(lot.manufactured_on)
            .bind(lot.expires_on)
            .bind(lot.received_quantity)
            .bind(lot.remaining_quantity)
            .bind(lot.unit_cost)
            .bind(lot.source_document_id)
            .bind(lot.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| write_error(err, &format!("lot {} rejected", lot.id)))?;
        }

        if let Some(reversed_document) = batch.reverse_allocations_of {
            sqlx::query(
                r#"
                UPDATE issue_allocations
                SET reversed_at = $2
                WHERE document_id = $1 AND reversed_at IS NULL
                "#,
            )
            .bind(reversed_document)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        for allocation in &batch.allocations {
            sqlx::query(
                r#"
                INSERT INTO issue_allocations (
                    id, document_id, line_no, lot_id, warehouse_id, material_id, quantity,
                    unit_cost, created_at, reversed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(allocation.id)
            .bind(allocation.document_id)
            .bind(allocation.line_no)
            .bind(allocation.lot_id)
            .bind(allocation.warehouse_id)
            .bind(allocation.material_id)
            .bind(allocation.quantity)
            .bind(allocation.unit_cost)
            .bind(allocation.created_at)
            .bind(allocation.reversed_at)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        for delta in &batch.stock_deltas {
            let updated = sqlx::query(
                r#"
                INSERT INTO stocks (warehouse_id, material_id, quantity, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (warehouse_id, material_id)
                DO UPDATE SET
                    quantity = stocks.quantity + EXCLUDED.quantity,
                    updated_at = EXCLUDED.updated_at
                WHERE stocks.quantity + EXCLUDED.quantity >= 0
                "#,
            )
            .bind(delta.warehouse_id)
            .bind(delta.material_id)
            .bind(delta.delta)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                write_error(
                    err,
                    &format!("stock of material {} would go negative", delta.material_id),
                )
            })?;
            if updated.rows_affected() == 0 {
                return Err(StoreError::conflict(format!(
                    "stock of material {} would go negative",
                    delta.material_id
                )));
            }
        }

        for delta in &batch.balance_deltas {
            sqlx::query(
                r#"
                INSERT INTO stock_balances (
                    warehouse_id, material_id, balance_date, quantity_in, value_in,
                    quantity_out, value_out, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (warehouse_id, material_id, balance_date)
                DO UPDATE SET
                    quantity_in = stock_balances.quantity_in + EXCLUDED.quantity_in,
                    value_in = stock_balances.value_in + EXCLUDED.value_in,
                    quantity_out = stock_balances.quantity_out + EXCLUDED.quantity_out,
                    value_out = stock_balances.value_out + EXCLUDED.value_out,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(delta.warehouse_id)
            .bind(delta.material_id)
            .bind(delta.date)
            .bind(delta.quantity_in)
            .bind(delta.value_in)
            .bind(delta.quantity_out)
            .bind(delta.value_out)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        sqlx::query(
            r#"
            UPDATE stock_documents
            SET status = $2,
                lines = $3,
                confirmed_by = $4,
                confirmed_at = $5,
                posted_at = $6,
                cancelled_by = $7,
                cancelled_at = $8,
                cancel_reason = $9
            WHERE id = $1
            "#,
        )
        .bind(document.id)
        .bind(document.status.as_str())
        .bind(Json(&document.lines))
        .bind(document.confirmed_by.as_deref())
        .bind(document.confirmed_at)
        .bind(document.posted_at)
        .bind(document.cancelled_by.as_deref())
        .bind(document.cancelled_at)
        .bind(document.cancel_reason.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        debug!(
            document_id = %document.id,
            lots = batch.new_lots.len(),
            lot_updates = lot_totals.len(),
            allocations = batch.allocations.len(),
            "ledger batch committed"
        );
        Ok(())
    }
}

/// Per (kind, warehouse) counters kept in `document_sequences`.
#[derive(Clone)]
pub struct PgDocumentNumbering {
    pool: PgPool,
}

impl PgDocumentNumbering {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentNumbering for PgDocumentNumbering {
    async fn next_number(&self, kind: DocumentKind, warehouse_code: &str) -> StoreResult<String> {
        let next: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (kind, warehouse_code, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (kind, warehouse_code)
            DO UPDATE SET last_value = document_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(kind.as_str())
        .bind(warehouse_code)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(format!("{}-{}-{:05}", kind.number_prefix(), warehouse_code, next))
    }
}
