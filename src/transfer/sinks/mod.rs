//! Record sinks for transfer operations
//!
//! A sink consumes batches of documents and writes them to a file or a
//! collection. Sinks may do one destructive step before the first batch
//! ([`RecordSink::prepare`]) and must be finalized once the stream ends.

use std::path::Path;

use async_trait::async_trait;
use mongodb::bson::Document;
use tokio::fs::File;
use tokio::io::BufWriter;

use crate::error::{MongoieError, Result};

pub mod collection;
pub mod csv;
pub mod json;
pub mod jsonl;
pub mod parquet;
pub mod split;

pub use self::csv::CsvSink;
pub use self::parquet::ParquetSink;
pub use collection::CollectionSink;
pub use json::JsonArraySink;
pub use jsonl::JsonLinesSink;
pub use split::SplitSink;

/// Trait for writing documents to files or collections
#[async_trait]
pub trait RecordSink: Send {
    /// One-time step before the first batch (e.g. clearing the target)
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Write a batch of documents
    ///
    /// # Returns
    /// * `Result<usize>` - Number of documents written
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize>;

    /// Finalize the output (flush buffers, write footers, etc.)
    async fn finalize(&mut self) -> Result<()>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Create a buffered file writer
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).await.map_err(|e| {
        MongoieError::Generic(format!("Failed to create file {}: {e}", path.display()))
    })?;
    Ok(BufWriter::with_capacity(8 * 1024 * 1024, file)) // 8MB buffer
}

/// Fail early when the output directory does not exist
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(MongoieError::Generic(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    Ok(())
}
