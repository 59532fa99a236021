//! CSV file source
//!
//! The first row is the header. Each following row becomes one flat record
//! keyed by header name; empty cells are left out and every other cell is
//! typed with [`parse_cell`].

use std::fs::File;
use std::path::Path;

use ::csv::{Reader, ReaderBuilder, StringRecord};
use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::debug;

use crate::error::{FormatError, MongoieError, Result};
use crate::transfer::cell::parse_cell;

use super::{RecordSource, SourceOptions};

/// Lazy row reader for CSV files
pub struct CsvSource {
    reader: Option<Reader<File>>,
    headers: Vec<String>,
    record: StringRecord,
    path: String,
    options: SourceOptions,
    rows: u64,
}

impl CsvSource {
    /// Open a CSV file and read its header row
    pub fn open(path: &Path, options: SourceOptions) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_path(path)?;

        let headers = reader
            .headers()
            .map_err(|e| malformed(path, 1, e))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        debug!("Opened CSV source {} with {} columns", path.display(), headers.len());

        Ok(Self {
            reader: Some(reader),
            headers,
            record: StringRecord::new(),
            path: path.display().to_string(),
            options,
            rows: 0,
        })
    }
}

fn malformed(path: impl AsRef<Path>, row: u64, err: impl ToString) -> MongoieError {
    FormatError::Malformed {
        location: format!("{} (row {})", path.as_ref().display(), row),
        detail: err.to_string(),
    }
    .into()
}

#[async_trait]
impl RecordSource for CsvSource {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        // Header is row 1
        let row = self.rows + 2;
        let more = reader
            .read_record(&mut self.record)
            .map_err(|e| malformed(&self.path, row, e))?;
        if !more {
            self.reader = None;
            return Ok(None);
        }

        let mut doc = Document::new();
        for (name, cell) in self.headers.iter().zip(self.record.iter()) {
            if let Some(value) = parse_cell(cell) {
                doc.insert(name.clone(), value);
            }
        }

        self.rows += 1;
        Ok(Some(self.options.shape(doc)))
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!("Closed CSV source {} after {} rows", self.path, self.rows);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.path)
    }
}
