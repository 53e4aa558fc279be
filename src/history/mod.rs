//! Question history persistence
//!
//! The history table is an appendable log of finished sessions with change
//! notification. The engine never mutates rows, only inserts and deletes.

use crate::models::HistoryEntry;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod feed;
pub mod memory;
pub mod postgres;

pub use feed::HistoryFeed;
pub use memory::InMemoryHistoryStore;
pub use postgres::PostgresHistoryStore;

/// Change notification emitted by a store after a successful write.
/// Subscribers refetch the whole table; events carry no row data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted(Uuid),
    Deleted(Uuid),
    Cleared,
}

/// Trait for history persistence
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All rows, newest first.
    async fn fetch_all(&self) -> Result<Vec<HistoryEntry>>;
    async fn insert(&self, entry: HistoryEntry) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    /// Subscribe to change events on the table.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
