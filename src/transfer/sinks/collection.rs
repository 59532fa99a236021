//! Collection sink
//!
//! Inserts each batch with one ordered `insert_many`. When clearing is
//! requested, `prepare` empties the collection once before the first batch.
//! An ordered insert stops at the first rejected document, so every document
//! before it is already stored; that count is reported with the error.

use async_trait::async_trait;
use mongodb::Collection;
use mongodb::bson::{Document, doc};
use mongodb::error::{Error as DriverError, ErrorKind};
use tracing::{debug, info, warn};

use crate::error::{Result, TransferError};

use super::RecordSink;

/// Sink inserting documents into a collection
pub struct CollectionSink {
    collection: Collection<Document>,
    clear_before: bool,
    inserted: u64,
}

impl CollectionSink {
    /// Create a sink for `collection`
    ///
    /// # Arguments
    /// * `collection` - Target collection handle
    /// * `clear_before` - Delete every document before the first insert
    pub fn new(collection: Collection<Document>, clear_before: bool) -> Self {
        Self {
            collection,
            clear_before,
            inserted: 0,
        }
    }
}

#[async_trait]
impl RecordSink for CollectionSink {
    async fn prepare(&mut self) -> Result<()> {
        if !self.clear_before {
            return Ok(());
        }

        let result = self.collection.delete_many(doc! {}).await?;
        info!(
            "Cleared {}.{}: {} documents deleted",
            self.collection.namespace().db,
            self.collection.name(),
            result.deleted_count
        );
        Ok(())
    }

    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }

        let result = match self.collection.insert_many(docs).ordered(true).await {
            Ok(result) => result,
            Err(e) => {
                let committed = committed_before_failure(&e, docs.len());
                self.inserted += committed as u64;
                warn!(
                    "Insert into {} stopped after {} of {} documents",
                    self.collection.name(),
                    committed,
                    docs.len()
                );
                return Err(TransferError::PartialBatch {
                    committed,
                    source: Box::new(e.into()),
                }
                .into());
            }
        };
        let count = result.inserted_ids.len();
        self.inserted += count as u64;
        debug!(
            "Inserted {} documents into {} (total: {})",
            count,
            self.collection.name(),
            self.inserted
        );
        Ok(count)
    }

    async fn finalize(&mut self) -> Result<()> {
        info!(
            "Import into {} finished: {} documents inserted",
            self.collection.name(),
            self.inserted
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "collection {}.{}",
            self.collection.namespace().db,
            self.collection.name()
        )
    }
}

/// Documents of an ordered batch stored before the insert failed.
///
/// The first write error's index is the number of documents ahead of it. A
/// failure with only a write concern error still applied every document;
/// any other error stored none.
fn committed_before_failure(error: &DriverError, batch_len: usize) -> usize {
    match error.kind.as_ref() {
        ErrorKind::InsertMany(failure) => match &failure.write_errors {
            Some(errors) => errors
                .iter()
                .map(|e| e.index)
                .min()
                .unwrap_or(0)
                .min(batch_len),
            None => batch_len,
        },
        _ => 0,
    }
}
