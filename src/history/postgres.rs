//! Postgres-backed history store
//!
//! Uses a lazy connection pool so the binary starts without a reachable
//! database; the schema is created on first use. Change events are emitted
//! locally after each successful write, mirroring the hosted table's
//! notification channel.

use super::{ChangeEvent, HistoryStore};
use crate::error::SessionError;
use crate::models::HistoryEntry;
use crate::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct PostgresHistoryStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl PostgresHistoryStore {
    /// Connect lazily; the pool is only exercised on the first query.
    pub fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| SessionError::Store(format!("Failed to build pool: {}", e)))?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            changes,
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS question_history (
                      id UUID PRIMARY KEY,
                      question TEXT NOT NULL,
                      category TEXT NOT NULL,
                      confidence DOUBLE PRECISION NOT NULL,
                      answer TEXT NOT NULL,
                      amount TEXT,
                      procedure TEXT,
                      approver TEXT,
                      document TEXT,
                      user_id UUID,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_question_history_created_at
                    ON question_history (created_at DESC);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                SessionError::Store(format!("Failed to initialize history schema: {}", e))
            })?;

        Ok(())
    }

    fn notify(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn fetch_all(&self) -> Result<Vec<HistoryEntry>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, question, category, confidence, answer,
                   amount, procedure, approver, document, user_id, created_at
            FROM question_history
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SessionError::Store(format!("Failed to load history: {}", e)))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(HistoryEntry {
                id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
                question: row.try_get("question").unwrap_or_default(),
                category: row.try_get("category").unwrap_or_default(),
                confidence: row.try_get("confidence").unwrap_or(0.0),
                answer: row.try_get("answer").unwrap_or_default(),
                amount: row.try_get("amount").ok(),
                procedure: row.try_get("procedure").ok(),
                approver: row.try_get("approver").ok(),
                document: row.try_get("document").ok(),
                user_id: row.try_get("user_id").ok(),
                created_at: row
                    .try_get("created_at")
                    .unwrap_or_else(|_| chrono::Utc::now()),
            });
        }

        Ok(entries)
    }

    async fn insert(&self, entry: HistoryEntry) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO question_history
              (id, question, category, confidence, answer, amount, procedure, approver, document, user_id, created_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.question)
        .bind(&entry.category)
        .bind(entry.confidence)
        .bind(&entry.answer)
        .bind(&entry.amount)
        .bind(&entry.procedure)
        .bind(&entry.approver)
        .bind(&entry.document)
        .bind(entry.user_id)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Store(format!("Failed to insert history row: {}", e)))?;

        self.notify(ChangeEvent::Inserted(entry.id));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM question_history WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to delete history row: {}", e)))?;

        self.notify(ChangeEvent::Deleted(id));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM question_history")
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to clear history: {}", e)))?;

        self.notify(ChangeEvent::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
