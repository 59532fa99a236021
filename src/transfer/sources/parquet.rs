//! Parquet file source
//!
//! Decodes one record batch at a time and hands its rows out as flat
//! documents. Nulls are left out of the record; string cells holding a JSON
//! array become sequences again, matching what the Parquet sink writes.

use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use ::parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Float64Type, Int32Type, Int64Type, TimeUnit, TimestampMillisecondType,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use async_trait::async_trait;
use mongodb::bson::{Bson, DateTime, Document};
use tracing::debug;

use crate::error::{FormatError, MongoieError, Result};
use crate::transfer::cell::parse_json_array;

use super::{RecordSource, SourceOptions};

/// Lazy row reader for Parquet files
pub struct ParquetSource {
    reader: Option<ParquetRecordBatchReader>,
    pending: VecDeque<Document>,
    path: String,
    options: SourceOptions,
    rows: u64,
}

impl ParquetSource {
    /// Open a Parquet file, decoding `options.batch_size` rows per read
    pub fn open(path: &Path, options: SourceOptions) -> Result<Self> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(options.batch_size.max(1))
            .build()?;
        debug!("Opened Parquet source: {}", path.display());

        Ok(Self {
            reader: Some(reader),
            pending: VecDeque::new(),
            path: path.display().to_string(),
            options,
            rows: 0,
        })
    }

    fn malformed(&self, detail: impl ToString) -> MongoieError {
        FormatError::Malformed {
            location: format!("{} (row {})", self.path, self.rows + 1),
            detail: detail.to_string(),
        }
        .into()
    }

    /// Decode the next record batch into pending rows; false when exhausted.
    fn fill(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };

        let batch = match reader.next() {
            Some(Ok(batch)) => batch,
            Some(Err(e)) => {
                self.reader = None;
                return Err(self.malformed(e));
            }
            None => {
                self.reader = None;
                return Ok(false);
            }
        };

        self.pending.extend(batch_to_documents(&batch)?);
        Ok(true)
    }
}

/// Convert a record batch into one flat document per row.
pub fn batch_to_documents(batch: &RecordBatch) -> Result<Vec<Document>> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(normalize_column)
        .collect::<Result<Vec<_>>>()?;

    let mut docs = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut doc = Document::new();
        for (field, column) in schema.fields().iter().zip(&columns) {
            if let Some(value) = cell_value(column, row)? {
                doc.insert(field.name().clone(), value);
            }
        }
        docs.push(doc);
    }
    Ok(docs)
}

// Collapse the many arrow integer/float/timestamp widths onto the few
// representations `cell_value` understands.
fn normalize_column(column: &ArrayRef) -> Result<ArrayRef> {
    let target = match column.data_type() {
        DataType::Int8 | DataType::Int16 | DataType::UInt8 | DataType::UInt16 => {
            DataType::Int32
        }
        DataType::UInt32 | DataType::UInt64 => DataType::Int64,
        DataType::Float16 | DataType::Float32 => DataType::Float64,
        DataType::Timestamp(unit, tz) if *unit != TimeUnit::Millisecond => {
            DataType::Timestamp(TimeUnit::Millisecond, tz.clone())
        }
        DataType::Date32 | DataType::Date64 => DataType::Timestamp(TimeUnit::Millisecond, None),
        _ => return Ok(Arc::clone(column)),
    };
    Ok(cast(column.as_ref(), &target)?)
}

fn cell_value(column: &ArrayRef, row: usize) -> Result<Option<Bson>> {
    if column.is_null(row) {
        return Ok(None);
    }

    let value = match column.data_type() {
        DataType::Boolean => Bson::Boolean(column.as_boolean().value(row)),
        DataType::Int32 => Bson::Int32(column.as_primitive::<Int32Type>().value(row)),
        DataType::Int64 => {
            let n = column.as_primitive::<Int64Type>().value(row);
            match i32::try_from(n) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(n),
            }
        }
        DataType::Float64 => Bson::Double(column.as_primitive::<Float64Type>().value(row)),
        DataType::Timestamp(TimeUnit::Millisecond, _) => Bson::DateTime(DateTime::from_millis(
            column.as_primitive::<TimestampMillisecondType>().value(row),
        )),
        DataType::Utf8 => text_value(column.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => text_value(column.as_string::<i64>().value(row)),
        _ => Bson::String(array_value_to_string(column.as_ref(), row)?),
    };
    Ok(Some(value))
}

fn text_value(text: &str) -> Bson {
    parse_json_array(text).unwrap_or_else(|| Bson::String(text.to_string()))
}

#[async_trait]
impl RecordSource for ParquetSource {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        while self.pending.is_empty() {
            if !self.fill()? {
                return Ok(None);
            }
        }

        match self.pending.pop_front() {
            Some(doc) => {
                self.rows += 1;
                Ok(Some(self.options.shape(doc)))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        if self.reader.take().is_some() {
            debug!("Closed Parquet source {} after {} rows", self.path, self.rows);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("parquet file {}", self.path)
    }
}
