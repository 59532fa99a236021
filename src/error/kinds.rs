use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;
use crate::transfer::flatten::StructureConflict;

/// Crate-wide `Result` type using [`MongoieError`] as the error.
pub type Result<T> = std::result::Result<T, MongoieError>;

/// Top-level error type for mongoie operations.
#[derive(Debug)]
pub enum MongoieError {
    /// Connection-related errors.
    Connection(ConnectionError),

    /// File format errors (selection, decoding, encoding).
    Format(FormatError),

    /// Streaming pipeline errors.
    Transfer(TransferError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    ConnectionFailed(String),

    /// Invalid connection URI.
    InvalidUri(String),

    /// Not currently connected to MongoDB.
    NotConnected,

    /// Ping command failed.
    PingFailed(String),
}

/// File format errors.
#[derive(Debug)]
pub enum FormatError {
    /// The extension or format token is not one of the recognized formats.
    Unsupported(String),

    /// The path carries no extension to select a format from.
    MissingExtension(String),

    /// A source record could not be decoded.
    Malformed { location: String, detail: String },

    /// A columnar sink received a column (or a column type) outside the
    /// schema fixed by the first batch.
    SchemaDrift { column: String, detail: String },

    /// Encoding a batch into the output format failed.
    Encode(String),
}

/// Streaming pipeline errors.
#[derive(Debug)]
pub enum TransferError {
    /// Denormalizing a flat record found a path that is both a value and a
    /// nested document.
    StructureConflict(StructureConflict),

    /// The sink rejected a batch. `batch_index` counts from 1; `written`
    /// counts records successfully written, including any the failing batch
    /// committed before it stopped.
    WriteFailed {
        batch_index: usize,
        written: u64,
        source: Box<MongoieError>,
    },

    /// A sink stored the first `committed` records of a batch, then failed
    /// on the next one.
    PartialBatch {
        committed: usize,
        source: Box<MongoieError>,
    },

    /// Batch size must be at least one.
    InvalidBatchSize(usize),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl MongoieError {
    /// Innermost error, looking through batch write wrappers.
    pub fn root_cause(&self) -> &MongoieError {
        match self {
            MongoieError::Transfer(
                TransferError::WriteFailed { source, .. } | TransferError::PartialBatch { source, .. },
            ) => source.root_cause(),
            other => other,
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for MongoieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MongoieError::Connection(e) => write!(f, "Connection error: {e}"),
            MongoieError::Format(e) => write!(f, "Format error: {e}"),
            MongoieError::Transfer(e) => write!(f, "Transfer error: {e}"),
            MongoieError::Config(e) => write!(f, "Configuration error: {e}"),
            MongoieError::Io(e) => write!(f, "I/O error: {e}"),
            MongoieError::MongoDb(e) => format_mongodb_error(f, e),
            MongoieError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(uri) => write!(f, "Invalid connection URI: {uri}"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
            ConnectionError::PingFailed(msg) => write!(f, "Ping failed: {msg}"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Unsupported(ext) => {
                write!(f, "Unsupported format '{ext}' (expected json, jsonl, csv or parquet)")
            }
            FormatError::MissingExtension(path) => {
                write!(f, "Cannot determine format of '{path}': no file extension")
            }
            FormatError::Malformed { location, detail } => {
                write!(f, "Malformed record at {location}: {detail}")
            }
            FormatError::SchemaDrift { column, detail } => {
                write!(f, "Schema drift on column '{column}': {detail}")
            }
            FormatError::Encode(msg) => write!(f, "Encoding failed: {msg}"),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::StructureConflict(conflict) => write!(f, "{conflict}"),
            TransferError::WriteFailed {
                batch_index,
                written,
                source,
            } => write!(
                f,
                "Batch #{batch_index} was rejected after {written} records were written: {source}"
            ),
            TransferError::PartialBatch { committed, source } => {
                write!(f, "Stopped after {committed} records of the batch: {source}")
            }
            TransferError::InvalidBatchSize(size) => {
                write!(f, "Invalid batch size {size}: must be at least 1")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for MongoieError {}
impl std::error::Error for ConnectionError {}
impl std::error::Error for FormatError {}
impl std::error::Error for TransferError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to MongoieError ========================= */

impl From<io::Error> for MongoieError {
    fn from(err: io::Error) -> Self {
        MongoieError::Io(err)
    }
}

impl From<mongodb::error::Error> for MongoieError {
    fn from(err: mongodb::error::Error) -> Self {
        MongoieError::MongoDb(err)
    }
}

impl From<ConnectionError> for MongoieError {
    fn from(err: ConnectionError) -> Self {
        MongoieError::Connection(err)
    }
}

impl From<FormatError> for MongoieError {
    fn from(err: FormatError) -> Self {
        MongoieError::Format(err)
    }
}

impl From<TransferError> for MongoieError {
    fn from(err: TransferError) -> Self {
        MongoieError::Transfer(err)
    }
}

impl From<StructureConflict> for MongoieError {
    fn from(err: StructureConflict) -> Self {
        MongoieError::Transfer(TransferError::StructureConflict(err))
    }
}

impl From<ConfigError> for MongoieError {
    fn from(err: ConfigError) -> Self {
        MongoieError::Config(err)
    }
}

impl From<csv::Error> for MongoieError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            if let csv::ErrorKind::Io(io) = err.into_kind() {
                return MongoieError::Io(io);
            }
            return MongoieError::Generic("CSV I/O error".to_string());
        }
        MongoieError::Format(FormatError::Encode(format!("CSV: {err}")))
    }
}

impl From<arrow::error::ArrowError> for MongoieError {
    fn from(err: arrow::error::ArrowError) -> Self {
        MongoieError::Format(FormatError::Encode(format!("Arrow: {err}")))
    }
}

impl From<parquet::errors::ParquetError> for MongoieError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        MongoieError::Format(FormatError::Encode(format!("Parquet: {err}")))
    }
}

impl From<String> for MongoieError {
    fn from(msg: String) -> Self {
        MongoieError::Generic(msg)
    }
}

impl From<&str> for MongoieError {
    fn from(msg: &str) -> Self {
        MongoieError::Generic(msg.to_owned())
    }
}
