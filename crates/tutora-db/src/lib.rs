//! Tutora Database Layer
//!
//! This crate provides PostgreSQL access for the Tutora backend. It includes:
//!
//! - Connection pool management and embedded migrations with sqlx
//! - [`PgStore`], a transaction store implementing every repository trait
//!   with row locks (`SELECT ... FOR UPDATE`) and a per-teacher advisory lock
//! - Identity lookups and a notification sink over the same database
//! - [`MemoryStore`], an in-process store with the same contract

pub mod directory;
pub mod memory;
pub mod notifications;
pub mod pool;
pub mod repositories;
pub mod store;

pub use directory::PgIdentityDirectory;
pub use memory::{MemoryDirectory, MemoryNotificationSink, MemoryStore, MemoryTx};
pub use notifications::PgNotificationSink;
pub use pool::{create_pool, run_migrations};
pub use store::{PgStore, PgTx};

// Re-export commonly used types
pub use sqlx::PgPool;
pub use tutora_core::{AppError, AppResult};
