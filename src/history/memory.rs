//! In-memory history store for development & testing

use super::{ChangeEvent, HistoryStore};
use crate::models::HistoryEntry;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-memory history store backed by an RwLock'd vector.
pub struct InMemoryHistoryStore {
    rows: Arc<RwLock<Vec<HistoryEntry>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            rows: Arc::new(RwLock::new(Vec::new())),
            changes,
        }
    }

    fn notify(&self, event: ChangeEvent) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.changes.send(event);
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn fetch_all(&self) -> Result<Vec<HistoryEntry>> {
        let rows = self.rows.read().await;
        let mut out: Vec<HistoryEntry> = rows.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn insert(&self, entry: HistoryEntry) -> Result<()> {
        let id = entry.id;
        {
            let mut rows = self.rows.write().await;
            rows.push(entry);
        }
        self.notify(ChangeEvent::Inserted(id));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        {
            let mut rows = self.rows.write().await;
            rows.retain(|row| row.id != id);
        }
        self.notify(ChangeEvent::Deleted(id));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        {
            let mut rows = self.rows.write().await;
            rows.clear();
        }
        self.notify(ChangeEvent::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerRecord, Session};
    use chrono::Utc;

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
    async fn test_fetch_all_newest_first() {
        let store = InMemoryHistoryStore::new();
        store.insert(sample_entry("첫 번째")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.insert(sample_entry("두 번째")).await.unwrap();

        let rows = store.fetch_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].question, "두 번째");
    }

    #[tokio::test]
    async fn test_delete_emits_event() {
        let store = InMemoryHistoryStore::new();
        let entry = sample_entry("삭제 대상");
        let id = entry.id;
        store.insert(entry).await.unwrap();

        let mut rx = store.subscribe();
        store.delete(id).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Deleted(id));
        assert!(store.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = InMemoryHistoryStore::new();
        store.insert(sample_entry("하나")).await.unwrap();
        store.insert(sample_entry("둘")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.fetch_all().await.unwrap().is_empty());
    }
}
