//! Budget Q&A Engine
//!
//! Backend for a budget-regulation Q&A flow:
//! - Classifies free-text questions via an external webhook
//! - Collects amount + execution procedure and requests a final answer
//! - Persists finished sessions to a history store with change notification
//! - Exposes the whole flow over an HTTP API
//!
//! SESSION FLOW:
//! QUESTION → CLASSIFY → SELECTION → ANSWER → RESULT → HISTORY

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod models;
pub mod session;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use session::SessionEngine;
