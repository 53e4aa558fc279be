//! Read-through cache of the history table
//!
//! Any change event triggers a full refetch; no incremental patching at this
//! scale. Store errors land in a local error slot instead of propagating into
//! the presentation layer.

use super::HistoryStore;
use crate::models::HistoryEntry;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct HistoryFeed {
    store: Arc<dyn HistoryStore>,
    entries: Arc<RwLock<Vec<HistoryEntry>>>,
    last_error: Arc<RwLock<Option<String>>>,
    listener: JoinHandle<()>,
}

async fn refresh_into(
    store: &Arc<dyn HistoryStore>,
    entries: &Arc<RwLock<Vec<HistoryEntry>>>,
    last_error: &Arc<RwLock<Option<String>>>,
) {
    match store.fetch_all().await {
        Ok(rows) => {
            *entries.write().await = rows;
            *last_error.write().await = None;
        }
        Err(e) => {
            warn!("History refetch failed: {}", e);
            *last_error.write().await = Some(e.to_string());
        }
    }
}

impl HistoryFeed {
    /// Fetch the table once and start the change-event listener.
    pub async fn start(store: Arc<dyn HistoryStore>) -> Self {
        let entries = Arc::new(RwLock::new(Vec::new()));
        let last_error = Arc::new(RwLock::new(None));

        refresh_into(&store, &entries, &last_error).await;

        let mut receiver = store.subscribe();
        let listener = tokio::spawn({
            let store = store.clone();
            let entries = entries.clone();
            let last_error = last_error.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            debug!(?event, "History change event; refetching");
                            refresh_into(&store, &entries, &last_error).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "History events lagged; refetching");
                            refresh_into(&store, &entries, &last_error).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Self {
            store,
            entries,
            last_error,
            listener,
        }
    }

    /// Current cached rows, newest first.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// Last store failure, if any. Cleared by the next successful refetch.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    pub async fn refresh(&self) {
        refresh_into(&self.store, &self.entries, &self.last_error).await;
    }

    pub async fn add(&self, entry: HistoryEntry) -> Result<()> {
        let outcome = self.store.insert(entry).await;
        if let Err(ref e) = outcome {
            *self.last_error.write().await = Some(e.to_string());
        }
        self.refresh().await;
        outcome
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let outcome = self.store.delete(id).await;
        if let Err(ref e) = outcome {
            *self.last_error.write().await = Some(e.to_string());
        }
        self.refresh().await;
        outcome
    }

    pub async fn clear(&self) -> Result<()> {
        let outcome = self.store.clear().await;
        if let Err(ref e) = outcome {
            *self.last_error.write().await = Some(e.to_string());
        }
        self.refresh().await;
        outcome
    }

}

// The listener holds no reference back to the feed, so teardown is just
// aborting the task.
impl Drop for HistoryFeed {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryStore;
    use crate::models::{AnswerRecord, Session};
    use chrono::Utc;
    use std::time::Duration;

    fn sample_entry(question: &str) -> HistoryEntry {
        let session = Session {
            question: question.to_string(),
            category: "예산 승인 절차".to_string(),
            confidence: 0.8,
            selection: None,
            answer: AnswerRecord::sentinel(),
            created_at: Utc::now(),
        };
        HistoryEntry::from_session(&session, None)
    }

    #[tokio::test]
    async fn test_add_refetches() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let feed = HistoryFeed::start(store).await;

        feed.add(sample_entry("질문")).await.unwrap();
        let entries = feed.entries().await;
        assert_eq!(entries.len(), 1);
        assert!(feed.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_external_delete_event_refetches() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let feed = HistoryFeed::start(store.clone()).await;

        let entry = sample_entry("지워질 질문");
        let id = entry.id;
        feed.add(entry).await.unwrap();
        assert!(feed.get(id).await.is_some());

        // Delete behind the feed's back; the subscription must pick it up.
        store.delete(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(feed.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_empties_cache() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let feed = HistoryFeed::start(store).await;

        feed.add(sample_entry("하나")).await.unwrap();
        feed.add(sample_entry("둘")).await.unwrap();
        feed.clear().await.unwrap();

        assert!(feed.entries().await.is_empty());
    }
}
