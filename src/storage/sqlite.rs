//! SQLite persistence
//!
//! Tasks store into a [`SqliteTx`] buffer. Nothing touches the database until
//! commit, which replays the buffer inside one native transaction.
//!
//! Upserts are an insert-if-absent followed by an update-by-key. That pair is
//! only safe while no other writer touches the same key in between, so every
//! commit against one [`Database`] runs under that database's single commit
//! lock. Callers that need concurrent writers have to open separate databases.

use crate::schema::{db_type, non_null, Entity, Record};
use crate::storage::query::{delete_query, insert_ignore_query, update_query, Query};
use crate::storage::traits::{Deleter, StorageError, StorageResult, Storer, Tx};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// A shared database handle
///
/// The connection mutex doubles as the commit lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) a database file
    ///
    /// Tables must already exist; no schema is created here.
    pub fn open(path: &Path) -> StorageResult<Arc<Self>> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
        }))
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Arc<Self>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
        }))
    }

    /// Locks the connection for direct use
    ///
    /// Holding the guard blocks every commit on this database.
    pub fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Runs a batch of statements outside any buffered transaction
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Begins a buffered transaction
    pub fn begin(self: &Arc<Self>) -> SqliteTx {
        SqliteTx {
            db: Arc::clone(self),
            buffer: Mutex::new(Buffer::default()),
        }
    }
}

#[derive(Default)]
struct Buffer {
    stores: Vec<Box<dyn Entity>>,
    deletes: Vec<Box<dyn Entity>>,
    finished: bool,
}

/// A buffered transaction on a [`Database`]
pub struct SqliteTx {
    db: Arc<Database>,
    buffer: Mutex<Buffer>,
}

impl SqliteTx {
    fn buffer(&self) -> StorageResult<MutexGuard<'_, Buffer>> {
        self.buffer.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Takes the pending work and marks the transaction finished
    fn finish(&self) -> StorageResult<(Vec<Box<dyn Entity>>, Vec<Box<dyn Entity>>)> {
        let mut buffer = self.buffer()?;
        if buffer.finished {
            return Err(StorageError::Finished);
        }
        buffer.finished = true;
        Ok((
            std::mem::take(&mut buffer.stores),
            std::mem::take(&mut buffer.deletes),
        ))
    }
}

impl Storer for SqliteTx {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        let mut buffer = self.buffer()?;
        if buffer.finished {
            return Err(StorageError::Finished);
        }
        buffer.stores.push(value);
        Ok(())
    }
}

impl Deleter for SqliteTx {
    fn delete(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        let mut buffer = self.buffer()?;
        if buffer.finished {
            return Err(StorageError::Finished);
        }
        buffer.deletes.push(value);
        Ok(())
    }
}

impl Tx for SqliteTx {
    fn commit(&self) -> StorageResult<()> {
        let (stores, deletes) = self.finish()?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let applied = stores
            .iter()
            .try_for_each(|v| upsert(&tx, v.as_ref()))
            .and_then(|()| deletes.iter().try_for_each(|v| delete(&tx, v.as_ref())));

        match applied {
            Ok(()) => {
                tx.commit()?;
                tracing::debug!(
                    "Committed {} stores and {} deletes",
                    stores.len(),
                    deletes.len()
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!("Rollback after failed commit also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn rollback(&self) -> StorageResult<()> {
        let (stores, deletes) = self.finish()?;
        tracing::debug!(
            "Discarded {} stores and {} deletes",
            stores.len(),
            deletes.len()
        );
        Ok(())
    }
}

fn run(conn: &Connection, query: &Query) -> StorageResult<usize> {
    query.execute(conn).map_err(|source| StorageError::Query {
        query: query.clone(),
        source,
    })
}

/// Inserts a record, or updates the row with the same keys if one exists
///
/// Absent entities and records without any persistable field are skipped.
pub fn upsert(conn: &Connection, entity: &dyn Entity) -> StorageResult<()> {
    let Some(record) = entity.to_record() else {
        return Ok(());
    };
    if !has_persistable_fields(&record) {
        return Ok(());
    }

    let insert = insert_ignore_query(&record);
    if run(conn, &insert)? > 0 {
        return Ok(());
    }

    let update = update_query(&record);
    if run(conn, &update)? == 0 {
        return Err(StorageError::StaleWrite(update));
    }
    Ok(())
}

/// Deletes the rows matching a record; deleting nothing is not an error
pub fn delete(conn: &Connection, entity: &dyn Entity) -> StorageResult<()> {
    let Some(record) = entity.to_record() else {
        return Ok(());
    };
    if !has_persistable_fields(&record) {
        return Ok(());
    }

    run(conn, &delete_query(&record))?;
    Ok(())
}

fn has_persistable_fields(record: &Record) -> bool {
    !record.select(&[db_type, non_null]).is_empty()
}
