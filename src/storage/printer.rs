//! A transaction that prints stored records instead of persisting them

use crate::schema::Entity;
use crate::storage::traits::{StorageError, StorageResult, Storer, Tx};

/// Prints every stored record to stdout as pretty JSON
///
/// Useful when developing a task before any table exists for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrinterTx;

impl PrinterTx {
    /// Renders an entity the way [`Storer::store`] prints it
    pub fn render(value: &dyn Entity) -> StorageResult<Option<String>> {
        value
            .to_record()
            .map(|record| {
                serde_json::to_string_pretty(&record)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }
}

impl Storer for PrinterTx {
    fn store(&self, value: Box<dyn Entity>) -> StorageResult<()> {
        if let Some(json) = Self::render(value.as_ref())? {
            println!("{}", json);
        }
        Ok(())
    }
}

impl Tx for PrinterTx {
    fn commit(&self) -> StorageResult<()> {
        tracing::info!("Committed.");
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        tracing::info!("Rolled back.");
        Ok(())
    }
}
