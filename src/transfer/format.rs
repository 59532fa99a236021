//! Format strategy selection
//!
//! Maps a file path (by extension) or an explicit format token onto the
//! source and sink adapters for that format. Unknown formats are rejected
//! here, before any connection is opened or any file is touched.

use std::fmt;
use std::path::Path;

use crate::error::{FormatError, Result};

use super::sinks::{CsvSink, JsonArraySink, JsonLinesSink, ParquetSink, RecordSink};
use super::sources::{CsvSource, JsonSource, ParquetSource, RecordSource, SourceOptions};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// JSON array of documents
    Json,
    /// One JSON document per line
    JsonLines,
    /// Comma-separated values with a header row
    Csv,
    /// Columnar Parquet
    Parquet,
}

impl FileFormat {
    /// Parse a format token or extension, with or without a leading dot
    pub fn from_token(token: &str) -> Result<Self> {
        let normalized = token.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "json" => Ok(FileFormat::Json),
            "jsonl" | "ndjson" => Ok(FileFormat::JsonLines),
            "csv" => Ok(FileFormat::Csv),
            "parquet" | "pq" => Ok(FileFormat::Parquet),
            _ => Err(FormatError::Unsupported(token.to_string()).into()),
        }
    }

    /// Detect the format from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension() {
            Some(ext) => Self::from_token(&ext.to_string_lossy()),
            None => Err(FormatError::MissingExtension(path.display().to_string()).into()),
        }
    }

    /// Canonical file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::JsonLines => "jsonl",
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }

    /// Whether records must be flat to be represented faithfully
    pub fn is_tabular(&self) -> bool {
        matches!(self, FileFormat::Csv | FileFormat::Parquet)
    }

    /// Open a lazy source over `path`
    pub async fn open_source(
        &self,
        path: &Path,
        options: SourceOptions,
    ) -> Result<Box<dyn RecordSource>> {
        Ok(match self {
            FileFormat::Json | FileFormat::JsonLines => {
                Box::new(JsonSource::open(path, options).await?)
            }
            FileFormat::Csv => Box::new(CsvSource::open(path, options)?),
            FileFormat::Parquet => Box::new(ParquetSource::open(path, options)?),
        })
    }

    /// Create a sink writing `path`
    pub async fn create_sink(&self, path: &Path) -> Result<Box<dyn RecordSink>> {
        Ok(match self {
            FileFormat::Json => Box::new(JsonArraySink::create(path).await?),
            FileFormat::JsonLines => Box::new(JsonLinesSink::create(path).await?),
            FileFormat::Csv => Box::new(CsvSink::create(path)?),
            FileFormat::Parquet => Box::new(ParquetSink::create(path)?),
        })
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Pick the format for a file path or an explicit format token.
///
/// A value with an extension is judged by that extension; a bare value is
/// taken as a token (`csv`, `.parquet`, ...).
pub fn select(path_or_token: &str) -> Result<FileFormat> {
    let path = Path::new(path_or_token);
    if path.extension().is_some() {
        return FileFormat::from_path(path);
    }

    FileFormat::from_token(path_or_token).map_err(|_| {
        let value = path_or_token.to_string();
        let err = if path_or_token.contains(std::path::MAIN_SEPARATOR) || path_or_token.contains('/') {
            FormatError::MissingExtension(value)
        } else {
            FormatError::Unsupported(value)
        };
        err.into()
    })
}
