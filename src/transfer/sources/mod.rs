//! Record sources for transfer operations
//!
//! A source is a lazy, finite, non-restartable stream of documents pulled
//! one at a time. Batching is layered on top by [`RecordSource::next_batch`],
//! so no adapter ever holds more than one batch of records.

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::Result;

pub mod csv;
pub mod cursor;
pub mod directory;
pub mod json;
pub mod parquet;

pub use self::csv::CsvSource;
pub use self::parquet::ParquetSource;
pub use cursor::CursorSource;
pub use directory::DirectorySource;
pub use json::JsonSource;

/// Upper bound on the slots reserved up front for one batch
const MAX_BATCH_PREALLOCATION: usize = 4096;

/// Trait for pulling documents from a database cursor or a file
#[async_trait]
pub trait RecordSource: Send {
    /// Pull the next document, or `None` once the source is exhausted
    async fn next_document(&mut self) -> Result<Option<Document>>;

    /// Close the source and release its resources
    async fn close(&mut self) -> Result<()>;

    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Pull up to `max` documents
    ///
    /// # Returns
    /// * `Result<Option<Vec<Document>>>` - Next batch, or None if exhausted
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<Document>>> {
        let mut batch = Vec::with_capacity(max.min(MAX_BATCH_PREALLOCATION));
        while batch.len() < max {
            match self.next_document().await? {
                Some(doc) => batch.push(doc),
                None => break,
            }
        }

        if batch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(batch))
        }
    }
}

/// Options shared by file sources
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Rows decoded per read for columnar files
    pub batch_size: usize,
    /// Drop `_id` from every record read
    pub exclude_id: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            exclude_id: false,
        }
    }
}

impl SourceOptions {
    /// Apply per-record options to a freshly decoded document
    pub(crate) fn shape(&self, mut doc: Document) -> Document {
        if self.exclude_id {
            doc.remove("_id");
        }
        doc
    }
}


#[cfg(test)]
mod tests {
    use super::testing::VecSource;
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_next_batch_groups_documents() {
        let docs: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        let mut source = VecSource::new(docs);

        assert_eq!(source.next_batch(2).await.unwrap().unwrap().len(), 2);
        assert_eq!(source.next_batch(2).await.unwrap().unwrap().len(), 2);
        assert_eq!(source.next_batch(2).await.unwrap().unwrap().len(), 1);
        assert!(source.next_batch(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_huge_batch_size_reads_everything() {
        let docs: Vec<Document> = (0..3).map(|i| doc! { "i": i }).collect();
        let mut source = VecSource::new(docs.clone());

        assert_eq!(source.next_batch(usize::MAX).await.unwrap(), Some(docs));
        assert!(source.next_batch(usize::MAX).await.unwrap().is_none());
    }

    #[test]
    fn test_shape_drops_id_when_requested() {
        let options = SourceOptions {
            exclude_id: true,
            ..Default::default()
        };
        assert_eq!(options.shape(doc! { "_id": 1, "a": 2 }), doc! { "a": 2 });
        assert_eq!(
            SourceOptions::default().shape(doc! { "_id": 1 }),
            doc! { "_id": 1 }
        );
    }
}
