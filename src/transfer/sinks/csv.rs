//! CSV sink
//!
//! The header is the union of keys over the whole export in first-seen
//! order, which is only known once the stream ends. Rows are therefore
//! spooled to a sibling temporary file as they arrive, each holding the
//! columns known at the time. On finalize the header is written and the
//! spooled rows are copied behind it, padded to the full header width.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ::csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transfer::cell::{BsonConverter, TextCellConverter};

use super::{RecordSink, validate_path};

/// Writer for CSV files with a union header
pub struct CsvSink {
    path: PathBuf,
    spool_path: PathBuf,
    spool: Option<Writer<BufWriter<File>>>,
    headers: Vec<String>,
    known: HashSet<String>,
    converter: TextCellConverter,
    written: usize,
}

impl CsvSink {
    /// Create the spool file next to `path`
    pub fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;

        let mut spool_name = path.file_name().unwrap_or_default().to_os_string();
        spool_name.push(".rows.tmp");
        let spool_path = path.with_file_name(spool_name);

        let spool = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(BufWriter::with_capacity(
                8 * 1024 * 1024,
                File::create(&spool_path)?,
            ));

        debug!("Created CSV sink for: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            spool_path,
            spool: Some(spool),
            headers: Vec::new(),
            known: HashSet::new(),
            converter: TextCellConverter::new(),
            written: 0,
        })
    }

    /// Append keys not seen before, keeping first-seen order
    fn collect_headers(&mut self, doc: &Document) {
        for key in doc.keys() {
            if self.known.insert(key.clone()) {
                self.headers.push(key.clone());
            }
        }
    }

    fn copy_spool(&self) -> Result<()> {
        let mut out = Writer::from_writer(BufWriter::with_capacity(
            8 * 1024 * 1024,
            File::create(&self.path)?,
        ));
        if !self.headers.is_empty() {
            out.write_record(&self.headers)?;
        }

        let mut rows = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.spool_path)?;
        let mut record = StringRecord::new();
        while rows.read_record(&mut record)? {
            let padding = self.headers.len().saturating_sub(record.len());
            out.write_record(record.iter().chain(std::iter::repeat_n("", padding)))?;
        }

        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        for doc in docs {
            self.collect_headers(doc);
        }

        let Some(spool) = self.spool.as_mut() else {
            return Ok(0);
        };
        for doc in docs {
            let row = self
                .headers
                .iter()
                .map(|name| self.converter.convert_optional(doc.get(name)));
            spool.write_record(row)?;
        }

        self.written += docs.len();
        debug!("Spooled {} CSV rows (total: {})", docs.len(), self.written);
        Ok(docs.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        let Some(mut spool) = self.spool.take() else {
            return Ok(());
        };
        spool.flush()?;
        drop(spool);

        let copied = self.copy_spool();
        if let Err(e) = fs::remove_file(&self.spool_path) {
            warn!("Could not remove {}: {e}", self.spool_path.display());
        }
        copied?;

        debug!(
            "Finalized CSV file: {} ({} rows, {} columns)",
            self.path.display(),
            self.written,
            self.headers.len()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if self.spool.take().is_some() {
            let _ = fs::remove_file(&self.spool_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_csv_sink_union_header_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).unwrap();

        sink.write_batch(&[doc! { "name": "a", "address.city": "London" }])
            .await
            .unwrap();
        sink.write_batch(&[doc! { "name": "b", "age": 3 }, doc! { "zip": "N1" }])
            .await
            .unwrap();
        sink.finalize().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "name,address.city,age,zip\na,London,,\nb,,3,\n,,,N1\n"
        );
        assert!(!dir.path().join("out.csv.rows.tmp").exists());
    }

    #[tokio::test]
    async fn test_csv_sink_quotes_and_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::create(&path).unwrap();

        sink.write_batch(&[doc! { "text": "a, \"b\"", "tags": ["x", "y"], "none": null }])
            .await
            .unwrap();
        sink.finalize().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "text,tags,none\n\"a, \"\"b\"\"\",\"[\"\"x\"\",\"\"y\"\"]\",\n"
        );
    }

    #[tokio::test]
    async fn test_csv_sink_empty_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let mut sink = CsvSink::create(&path).unwrap();
        sink.finalize().await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_csv_sink_dropped_without_finalize_removes_spool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::create(&path).unwrap();
        assert!(dir.path().join("out.csv.rows.tmp").exists());

        drop(sink);
        assert!(!dir.path().join("out.csv.rows.tmp").exists());
    }
}
