//! JSON array sink
//!
//! Streams documents into a single JSON array: the opening bracket goes out
//! with the first batch, elements are comma-joined, and the closing bracket
//! is written on finalize. An export with no documents produces `[]`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mongodb::bson::Document;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::transfer::cell::document_to_json;

use super::{RecordSink, create_writer, validate_path};

/// Writer for JSON array files
pub struct JsonArraySink {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
    finalized: bool,
}

impl JsonArraySink {
    /// Create the output file
    pub async fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;
        let writer = create_writer(path).await?;

        debug!("Created JSON sink for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
            finalized: false,
        })
    }
}

#[async_trait]
impl RecordSink for JsonArraySink {
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        let mut buf = Vec::new();
        for (i, doc) in docs.iter().enumerate() {
            buf.extend_from_slice(if self.written + i == 0 { b"[\n" } else { b",\n" });
            serde_json::to_writer(&mut buf, &document_to_json(doc))
                .map_err(|e| FormatError::Encode(e.to_string()))?;
        }
        self.writer.write_all(&buf).await?;

        self.written += docs.len();
        debug!("Wrote {} documents to JSON (total: {})", docs.len(), self.written);

        Ok(docs.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        let closing: &[u8] = if self.written == 0 { b"[]\n" } else { b"\n]\n" };
        self.writer.write_all(closing).await?;
        self.writer.flush().await?;
        self.finalized = true;

        debug!(
            "Finalized JSON file: {} ({} documents)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use tokio::fs;

    #[tokio::test]
    async fn test_json_sink_writes_one_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = JsonArraySink::create(&path).await.unwrap();

        sink.write_batch(&[doc! { "id": 1 }, doc! { "id": 2 }]).await.unwrap();
        sink.write_batch(&[doc! { "id": 3, "nested": { "k": "v" } }])
            .await
            .unwrap();
        sink.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([{ "id": 1 }, { "id": 2 }, { "id": 3, "nested": { "k": "v" } }])
        );
    }

    #[tokio::test]
    async fn test_json_sink_empty_export_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut sink = JsonArraySink::create(&path).await.unwrap();
        sink.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[tokio::test]
    async fn test_json_sink_database_types_as_extended_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        let mut sink = JsonArraySink::create(&path).await.unwrap();

        let oid = mongodb::bson::oid::ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        sink.write_batch(&[doc! { "_id": oid }]).await.unwrap();
        sink.finalize().await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.contains(r#"{"$oid":"65a1b2c3d4e5f60718293a4b"}"#));
    }
}
