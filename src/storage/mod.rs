//! Storage module for persisting task output
//!
//! This module handles everything between a task's `store` call and the
//! database:
//! - Sink and transaction traits that tasks and runners program against
//! - Insert-if-absent, update-by-key and delete-by-key query construction
//! - The buffered SQLite transaction and its upsert protocol
//! - A printing transaction for dry runs

mod printer;
mod query;
mod sqlite;
mod traits;

pub use printer::PrinterTx;
pub use query::{delete_query, insert_ignore_query, update_query, Query};
pub use sqlite::{delete, upsert, Database, SqliteTx};
pub use traits::{Deleter, StorageError, StorageResult, Storer, Tx};

use std::path::Path;
use std::sync::Arc;

/// Opens a database file for buffered transactions
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Arc<Database>)` - Handle shared by every transaction it begins
/// * `Err(StorageError)` - Failed to open the database
pub fn open_database(path: &Path) -> StorageResult<Arc<Database>> {
    Database::open(path)
}
