//! JSON Lines sink
//!
//! One relaxed extended JSON document per line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mongodb::bson::Document;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::transfer::cell::document_to_json;

use super::{RecordSink, create_writer, validate_path};

/// Writer for JSON Lines files
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl JsonLinesSink {
    /// Create the output file
    pub async fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;
        let writer = create_writer(path).await?;

        debug!("Created JSON Lines sink for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
        })
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        let mut buf = Vec::new();
        for doc in docs {
            serde_json::to_writer(&mut buf, &document_to_json(doc))
                .map_err(|e| FormatError::Encode(e.to_string()))?;
            buf.push(b'\n');
        }
        self.writer.write_all(&buf).await?;

        self.written += docs.len();
        debug!(
            "Wrote {} documents to JSON Lines (total: {})",
            docs.len(),
            self.written
        );

        Ok(docs.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.writer.flush().await?;
        debug!(
            "Finalized JSON Lines file: {} ({} documents)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("jsonl file {}", self.path.display())
    }
}
