use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, GlobalSequence, Result, Version,
    store::{
        AppendBatch, AppendOptions, AppendResult, EventStore, InlineProjection, OutboxMessage,
        OutboxStatus, ProjectionCommit, check_stream_type, validate_batch,
    },
};

/// Advisory lock key serialising global sequence assignment.
const APPEND_LOCK_KEY: i64 = 0x6576_656e_745f_6c6f;

const EVENT_COLUMNS: &str = "e.event_id, e.stream_id, e.stream_type, e.stream_version, \
     e.global_sequence, e.event_type, e.payload, e.metadata, e.occurred_at";

/// PostgreSQL-backed event store implementation.
///
/// Each append runs in one transaction holding a transaction-scoped advisory
/// lock, so global sequence numbers become visible in commit order.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    inline: Vec<Arc<dyn InlineProjection>>,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            inline: Vec::new(),
        }
    }

    /// Registers a projection to run inside every append transaction.
    pub fn with_inline_projection<P>(mut self, projection: P) -> Self
    where
        P: InlineProjection + 'static,
    {
        self.inline.push(Arc::new(projection));
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: &PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            stream_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
            stream_type: row.try_get("stream_type")?,
            stream_version: Version::new(row.try_get("stream_version")?),
            global_sequence: GlobalSequence::new(row.try_get("global_sequence")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            metadata,
            occurred_at: row.try_get("occurred_at")?,
        })
    }

    fn row_to_outbox(row: &PgRow) -> Result<OutboxMessage> {
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxMessage {
            envelope: Self::row_to_event(row)?,
            status: OutboxStatus::parse(&status).unwrap_or(OutboxStatus::Pending),
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
        })
    }

    async fn load_document_in(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let body = sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(body)
    }

    async fn upsert_document_in(
        tx: &mut Transaction<'_, Postgres>,
        collection: &str,
        id: Uuid,
        body: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (collection, id) DO UPDATE SET
                body = EXCLUDED.body,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, batch), fields(stream_id = %batch.stream_id, count = batch.events.len()))]
    async fn append(&self, batch: AppendBatch, options: AppendOptions) -> Result<AppendResult> {
        validate_batch(&batch)?;
        let AppendBatch {
            stream_id,
            stream_type,
            events,
        } = batch;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let existing: Option<(String, i64)> =
            sqlx::query_as("SELECT stream_type, version FROM streams WHERE stream_id = $1 FOR UPDATE")
                .bind(stream_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let current_version = match &existing {
            Some((existing_type, version)) => {
                check_stream_type(stream_id, existing_type, &stream_type)?;
                Version::new(*version)
            }
            None => Version::initial(),
        };

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current_version,
            });
        }

        let head: Option<i64> = sqlx::query_scalar("SELECT MAX(global_sequence) FROM events")
            .fetch_one(&mut *tx)
            .await?;

        let mut version = current_version;
        let mut sequence = GlobalSequence::new(head.unwrap_or(0));
        let mut publish = Vec::with_capacity(events.len());
        let envelopes: Vec<EventEnvelope> = events
            .into_iter()
            .map(|event| {
                version = version.next();
                sequence = sequence.next();
                publish.push(event.publish);
                event.into_envelope(stream_id, &stream_type, version, sequence)
            })
            .collect();

        sqlx::query(
            r#"
            INSERT INTO streams (stream_id, stream_type, version)
            VALUES ($1, $2, $3)
            ON CONFLICT (stream_id) DO UPDATE SET version = EXCLUDED.version
            "#,
        )
        .bind(stream_id.as_uuid())
        .bind(&stream_type)
        .bind(version.as_i64())
        .execute(&mut *tx)
        .await?;

        for (envelope, publish) in envelopes.iter().zip(&publish) {
            let metadata_json = serde_json::to_value(&envelope.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (global_sequence, event_id, stream_id, stream_type, stream_version, event_type, payload, metadata, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(envelope.global_sequence.as_i64())
            .bind(envelope.event_id.as_uuid())
            .bind(stream_id.as_uuid())
            .bind(&stream_type)
            .bind(envelope.stream_version.as_i64())
            .bind(&envelope.event_type)
            .bind(&envelope.payload)
            .bind(metadata_json)
            .bind(envelope.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected: options.expected_version.unwrap_or(current_version),
                        actual: envelope.stream_version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            if *publish {
                sqlx::query("INSERT INTO outbox (event_id, global_sequence) VALUES ($1, $2)")
                    .bind(envelope.event_id.as_uuid())
                    .bind(envelope.global_sequence.as_i64())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for projection in &self.inline {
            let collection = projection.collection();
            let mut current = Self::load_document_in(&mut tx, collection, stream_id.as_uuid()).await?;
            let mut changed = false;
            for envelope in &envelopes {
                let next = projection
                    .project(current.as_ref(), envelope)
                    .map_err(|e| EventStoreError::Projection {
                        projection: projection.name().to_string(),
                        message: e.to_string(),
                    })?;
                if let Some(document) = next {
                    current = Some(document);
                    changed = true;
                }
            }
            if changed && let Some(document) = &current {
                Self::upsert_document_in(&mut tx, collection, stream_id.as_uuid(), document)
                    .await?;
            }
        }

        tx.commit().await?;

        metrics::counter!("events_appended_total").increment(envelopes.len() as u64);
        tracing::debug!(new_version = %version, "appended events");

        Ok(AppendResult {
            new_version: version,
            events: envelopes,
        })
    }

    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e WHERE e.stream_id = $1 ORDER BY e.stream_version ASC"
        ))
        .bind(stream_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn read_global(
        &self,
        after: GlobalSequence,
        limit: usize,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e WHERE e.global_sequence > $1 \
             ORDER BY e.global_sequence ASC LIMIT $2"
        ))
        .bind(after.as_i64())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM streams WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn load_document(&self, collection: &str, id: Uuid) -> Result<Option<serde_json::Value>> {
        let body = sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(body)
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let bodies = sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(bodies)
    }

    async fn load_checkpoint(&self, projection: &str) -> Result<GlobalSequence> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT last_sequence FROM projection_checkpoints WHERE projection = $1",
        )
        .bind(projection)
        .fetch_optional(&self.pool)
        .await?;
        Ok(last.map(GlobalSequence::new).unwrap_or_else(GlobalSequence::start))
    }

    async fn commit_projection(&self, commit: ProjectionCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serialises the first insert of a checkpoint row as well.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&commit.projection)
            .execute(&mut *tx)
            .await?;

        let stored: Option<i64> = sqlx::query_scalar(
            "SELECT last_sequence FROM projection_checkpoints WHERE projection = $1 FOR UPDATE",
        )
        .bind(&commit.projection)
        .fetch_optional(&mut *tx)
        .await?;
        let actual = stored
            .map(GlobalSequence::new)
            .unwrap_or_else(GlobalSequence::start);
        if actual != commit.expected {
            return Err(EventStoreError::CheckpointConflict {
                projection: commit.projection,
                expected: commit.expected,
                actual,
            });
        }

        for write in &commit.documents {
            Self::upsert_document_in(&mut tx, &write.collection, write.id, &write.body).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO projection_checkpoints (projection, last_sequence, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (projection) DO UPDATE SET
                last_sequence = EXCLUDED.last_sequence,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&commit.projection)
        .bind(commit.checkpoint.as_i64())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        projection: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO projection_leases (projection, owner, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (projection) DO UPDATE SET
                owner = EXCLUDED.owner,
                expires_at = EXCLUDED.expires_at
            WHERE projection_leases.owner = EXCLUDED.owner
               OR projection_leases.expires_at <= NOW()
            "#,
        )
        .bind(projection)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, projection: &str, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM projection_leases WHERE projection = $1 AND owner = $2")
            .bind(projection)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}, o.status, o.attempts, o.last_error \
             FROM outbox o JOIN events e ON e.event_id = o.event_id \
             WHERE o.status = 'Pending' ORDER BY o.global_sequence ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_outbox).collect()
    }

    async fn ack_outbox(&self, event_id: EventId) -> Result<()> {
        sqlx::query("UPDATE outbox SET status = $2, updated_at = NOW() WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .bind(OutboxStatus::Delivered.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_outbox_attempt(
        &self,
        event_id: EventId,
        attempts: u32,
        error: &str,
    ) -> Result<u32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE outbox SET attempts = attempts + $2, last_error = $3, updated_at = NOW()
            WHERE event_id = $1
            RETURNING attempts
            "#,
        )
        .bind(event_id.as_uuid())
        .bind(i32::try_from(attempts).unwrap_or(i32::MAX))
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempts.unwrap_or(0).max(0) as u32)
    }

    async fn dead_letter_outbox(&self, event_id: EventId, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE outbox SET status = $2, last_error = $3, updated_at = NOW() WHERE event_id = $1",
        )
        .bind(event_id.as_uuid())
        .bind(OutboxStatus::DeadLettered.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS}, o.status, o.attempts, o.last_error \
             FROM outbox o JOIN events e ON e.event_id = o.event_id \
             WHERE o.status = 'DeadLettered' ORDER BY o.global_sequence ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_outbox).collect()
    }
}
