use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use depot_core::{DomainEvent, DomainEventKind, EventEnvelope, EventStore};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Append-only event log in the `domain_events` table.
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn kind_name(kind: DomainEventKind) -> Result<String> {
    match serde_json::to_value(kind)? {
        serde_json::Value::String(name) => Ok(name),
        other => anyhow::bail!("event kind serialized as {other}"),
    }
}

fn envelope_from_row(row: &PgRow) -> Result<EventEnvelope> {
    let kind: String = row.try_get("kind")?;
    let Json(payload): Json<serde_json::Value> = row.try_get("payload")?;
    Ok(EventEnvelope {
        sequence: row.try_get("sequence")?,
        stream_id: row.try_get("stream_id")?,
        event: DomainEvent {
            id: row.try_get("event_id")?,
            aggregate_id: row.try_get("stream_id")?,
            kind: serde_json::from_value(serde_json::Value::String(kind.clone()))
                .with_context(|| format!("unknown event kind {kind}"))?,
            occurred_at: row.try_get("occurred_at")?,
            payload,
        },
        stored_at: row.try_get("stored_at")?,
    })
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> Result<EventEnvelope> {
        let stored_at = Utc::now();
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO domain_events (stream_id, event_id, kind, occurred_at, payload, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING sequence
            "#,
        )
        .bind(stream_id)
        .bind(event.id)
        .bind(kind_name(event.kind)?)
        .bind(event.occurred_at)
        .bind(Json(&event.payload))
        .bind(stored_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to append domain event")?;

        Ok(EventEnvelope {
            sequence,
            stream_id,
            event,
            stored_at,
        })
    }

    async fn stream(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, stream_id, event_id, kind, occurred_at, payload, stored_at
            FROM domain_events
            WHERE stream_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(envelope_from_row).collect()
    }

    async fn by_kind(&self, kind: DomainEventKind, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, stream_id, event_id, kind, occurred_at, payload, stored_at
            FROM domain_events
            WHERE kind = $1
            ORDER BY sequence DESC
            LIMIT $2
            "#,
        )
        .bind(kind_name(kind)?)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(envelope_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_the_serialized_variant() {
        assert_eq!(
            kind_name(DomainEventKind::NotificationFailed).unwrap(),
            "NotificationFailed"
        );
        assert_eq!(kind_name(DomainEventKind::StockIssued).unwrap(), "StockIssued");
    }
}
