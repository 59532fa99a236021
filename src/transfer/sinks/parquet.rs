//! Parquet sink
//!
//! The column schema is inferred from the first batch and then fixed for the
//! whole file. A later batch bringing a new column, or a value that cannot be
//! stored in its column's type, fails with a schema drift error instead of
//! rewriting earlier row groups.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::parquet::arrow::ArrowWriter;
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::transfer::cell::{BsonConverter, TextCellConverter};

use super::{RecordSink, validate_path};

const UTC: &str = "UTC";

/// Column type chosen for a flat key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Timestamp,
    Text,
}

impl ColumnKind {
    fn of(value: &Bson) -> Option<Self> {
        match value {
            Bson::Null | Bson::Undefined => None,
            Bson::Int32(_) | Bson::Int64(_) => Some(ColumnKind::Int),
            Bson::Double(_) => Some(ColumnKind::Float),
            Bson::Boolean(_) => Some(ColumnKind::Bool),
            Bson::DateTime(_) => Some(ColumnKind::Timestamp),
            _ => Some(ColumnKind::Text),
        }
    }

    /// Widen to hold both kinds, if possible
    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (ColumnKind::Int, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Int) => {
                Some(ColumnKind::Float)
            }
            _ => None,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, Some(UTC.into())),
            ColumnKind::Text => DataType::Utf8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ColumnKind::Int => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Bool => "boolean",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Text => "string",
        }
    }
}

/// Writer for Parquet files with a schema fixed by the first batch
pub struct ParquetSink {
    path: PathBuf,
    writer: Option<ArrowWriter<File>>,
    columns: Vec<(String, ColumnKind)>,
    schema: Option<SchemaRef>,
    converter: TextCellConverter,
    written: usize,
    finalized: bool,
}

impl ParquetSink {
    /// Prepare a sink writing to `path`
    pub fn create(path: &Path) -> Result<Self> {
        validate_path(path)?;
        debug!("Created Parquet sink for: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: None,
            columns: Vec::new(),
            schema: None,
            converter: TextCellConverter::new(),
            written: 0,
            finalized: false,
        })
    }

    fn infer_schema(&mut self, docs: &[Document]) -> Result<SchemaRef> {
        let mut kinds: Vec<(String, Option<ColumnKind>)> = Vec::new();
        for doc in docs {
            for (key, value) in doc {
                let seen = ColumnKind::of(value);
                match kinds.iter_mut().find(|(name, _)| name == key) {
                    Some((_, kind)) => {
                        *kind = match (*kind, seen) {
                            (Some(a), Some(b)) => Some(a.merge(b).ok_or_else(|| {
                                drift(key, format!("holds both {} and {} values", a.name(), b.name()))
                            })?),
                            (a, b) => a.or(b),
                        };
                    }
                    None => kinds.push((key.clone(), seen)),
                }
            }
        }

        // All-null columns are stored as strings
        self.columns = kinds
            .into_iter()
            .map(|(name, kind)| (name, kind.unwrap_or(ColumnKind::Text)))
            .collect();

        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|(name, kind)| Field::new(name, kind.data_type(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));
        debug!(
            "Inferred Parquet schema with {} columns from first batch",
            self.columns.len()
        );
        Ok(schema)
    }

    fn check_columns(&self, docs: &[Document]) -> Result<()> {
        for doc in docs {
            for key in doc.keys() {
                if !self.columns.iter().any(|(name, _)| name == key) {
                    return Err(drift(key, "column not present in the first batch".to_string()));
                }
            }
        }
        Ok(())
    }

    fn build_column(&self, name: &str, kind: ColumnKind, docs: &[Document]) -> Result<ArrayRef> {
        let cells = docs.iter().map(|doc| doc.get(name).filter(|v| ColumnKind::of(v).is_some()));

        let mismatch = |value: &Bson| {
            drift(
                name,
                format!(
                    "{} column cannot hold {:?} value",
                    kind.name(),
                    value.element_type()
                ),
            )
        };

        let array: ArrayRef = match kind {
            ColumnKind::Int => Arc::new(
                cells
                    .map(|cell| match cell {
                        None => Ok(None),
                        Some(Bson::Int32(n)) => Ok(Some(i64::from(*n))),
                        Some(Bson::Int64(n)) => Ok(Some(*n)),
                        Some(other) => Err(mismatch(other)),
                    })
                    .collect::<Result<Int64Array>>()?,
            ),
            ColumnKind::Float => Arc::new(
                cells
                    .map(|cell| match cell {
                        None => Ok(None),
                        Some(Bson::Double(f)) => Ok(Some(*f)),
                        Some(Bson::Int32(n)) => Ok(Some(f64::from(*n))),
                        Some(Bson::Int64(n)) => Ok(Some(*n as f64)),
                        Some(other) => Err(mismatch(other)),
                    })
                    .collect::<Result<Float64Array>>()?,
            ),
            ColumnKind::Bool => Arc::new(
                cells
                    .map(|cell| match cell {
                        None => Ok(None),
                        Some(Bson::Boolean(b)) => Ok(Some(*b)),
                        Some(other) => Err(mismatch(other)),
                    })
                    .collect::<Result<BooleanArray>>()?,
            ),
            ColumnKind::Timestamp => Arc::new(
                cells
                    .map(|cell| match cell {
                        None => Ok(None),
                        Some(Bson::DateTime(dt)) => Ok(Some(dt.timestamp_millis())),
                        Some(other) => Err(mismatch(other)),
                    })
                    .collect::<Result<TimestampMillisecondArray>>()?
                    .with_timezone(UTC),
            ),
            ColumnKind::Text => Arc::new(
                cells
                    .map(|cell| cell.map(|v| self.converter.convert(v)))
                    .collect::<StringArray>(),
            ),
        };
        Ok(array)
    }
}

fn drift(column: &str, detail: String) -> crate::error::MongoieError {
    FormatError::SchemaDrift {
        column: column.to_string(),
        detail,
    }
    .into()
}

#[async_trait]
impl RecordSink for ParquetSink {
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }

        let schema = match self.schema.clone() {
            Some(schema) => {
                self.check_columns(docs)?;
                schema
            }
            None => {
                let schema = self.infer_schema(docs)?;
                let file = File::create(&self.path)?;
                self.writer = Some(ArrowWriter::try_new(file, schema.clone(), None)?);
                self.schema = Some(schema.clone());
                schema
            }
        };

        let arrays = self
            .columns
            .iter()
            .map(|(name, kind)| self.build_column(name, *kind, docs))
            .collect::<Result<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(docs.len()));
        let batch = RecordBatch::try_new_with_options(schema, arrays, &options)?;

        if let Some(writer) = self.writer.as_mut() {
            writer.write(&batch)?;
        }

        self.written += docs.len();
        debug!("Wrote {} rows to Parquet (total: {})", docs.len(), self.written);
        Ok(docs.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                // Nothing written: still leave a valid, empty file behind
                let file = File::create(&self.path)?;
                ArrowWriter::try_new(file, Arc::new(Schema::empty()), None)?
            }
        };
        writer.close()?;

        debug!(
            "Finalized Parquet file: {} ({} rows, {} columns)",
            self.path.display(),
            self.written,
            self.columns.len()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("parquet file {}", self.path.display())
    }
}
