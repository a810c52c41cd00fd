//! Storage traits and error types
//!
//! This module defines the sink interfaces tasks store into, the transaction
//! interface runners commit or roll back, and the storage error type.

use crate::schema::Entity;
use crate::storage::query::Query;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{source} -> {query}")]
    Query {
        query: Query,
        source: rusqlite::Error,
    },

    #[error("failed to update row: {0}")]
    StaleWrite(Query),

    #[error("Transaction already finished")]
    Finished,

    #[error("Commit lock poisoned")]
    Poisoned,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Accepts entities parsed from a response
///
/// Implementations must allow concurrent calls.
pub trait Storer: Send + Sync {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()>;
}

impl<S: Storer + ?Sized> Storer for Arc<S> {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        (**self).store(value)
    }
}

/// Accepts entities whose rows should be removed
pub trait Deleter: Send + Sync {
    fn delete(&self, value: Box<dyn Entity>) -> StorageResult<()>;
}

/// A transaction: a storer whose buffered work is committed or rolled back
///
/// Exactly one of [`commit`](Tx::commit) or [`rollback`](Tx::rollback) ends a
/// transaction. Any call after that fails with [`StorageError::Finished`].
pub trait Tx: Storer {
    fn commit(&self) -> StorageResult<()>;

    fn rollback(&self) -> StorageResult<()>;
}
