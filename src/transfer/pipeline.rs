//! Streaming pipeline
//!
//! Pulls batches from a [`RecordSource`], applies an optional per-record
//! [`Transform`], and pushes each batch to a [`RecordSink`] before pulling
//! the next one. At most one batch is held at a time and records keep their
//! source order. Any error aborts the run: nothing is retried and nothing
//! is resumable, a rerun starts again from the beginning of the source.

use std::collections::BTreeSet;
use std::time::Instant;

use mongodb::bson::Document;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, MongoieError, Result, TransferError};

use super::flatten::{FlattenReport, flatten_with_report, unflatten};
use super::progress::ProgressTracker;
use super::sinks::RecordSink;
use super::sources::RecordSource;

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-record reshaping applied between source and sink
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Transform {
    /// Pass records through unchanged
    #[default]
    None,
    /// Nested documents to path-keyed flat records
    Flatten { separator: String },
    /// Path-keyed flat records back to nested documents
    Unflatten { separator: String },
}

impl Transform {
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Transform::Flatten { separator } | Transform::Unflatten { separator }
                if separator.is_empty() =>
            {
                Err(ConfigError::InvalidValue {
                    field: "separator".to_string(),
                    value: String::new(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

/// Statistics of a completed transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Where records came from
    pub origin: String,
    /// Where records went
    pub destination: String,
    /// Records pulled from the source
    pub records_read: u64,
    /// Records accepted by the sink
    pub records_written: u64,
    /// Batches written
    pub batches: u64,
    /// Key paths dropped because they led to an empty nested document
    pub dropped_empty_paths: BTreeSet<String>,
    /// Key paths whose original key contained the separator
    pub ambiguous_keys: BTreeSet<String>,
    /// Flat keys produced by two different paths; only the first value was kept
    pub colliding_keys: BTreeSet<String>,
    /// Wall-clock duration
    pub elapsed_ms: u64,
}

impl TransferSummary {
    /// Whether flattening lost or blurred any information
    pub fn is_lossless(&self) -> bool {
        self.dropped_empty_paths.is_empty()
            && self.ambiguous_keys.is_empty()
            && self.colliding_keys.is_empty()
    }

    fn absorb(&mut self, report: FlattenReport) {
        for path in report.dropped_empty {
            if self.dropped_empty_paths.insert(path.clone()) {
                warn!("Empty nested document at '{path}' has no flat representation and is dropped");
            }
        }
        for path in report.ambiguous_keys {
            if self.ambiguous_keys.insert(path.clone()) {
                warn!("Key path '{path}' contains the separator and will not round-trip");
            }
        }
        for key in report.collisions {
            if self.colliding_keys.insert(key.clone()) {
                warn!("Flat key '{key}' is produced by more than one path; later values are dropped");
            }
        }
    }
}

/// Batch-at-a-time transfer from a source to a sink
pub struct Pipeline {
    source: Box<dyn RecordSource>,
    sink: Box<dyn RecordSink>,
    batch_size: usize,
    transform: Transform,
    tracker: ProgressTracker,
}

impl Pipeline {
    /// Create a pipeline with the default batch size and no transform
    pub fn new(source: Box<dyn RecordSource>, sink: Box<dyn RecordSink>) -> Self {
        Self {
            source,
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
            transform: Transform::None,
            tracker: ProgressTracker::hidden(),
        }
    }

    /// Set the maximum number of records per batch
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the per-record transform
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Report progress through `tracker`
    pub fn with_progress(mut self, tracker: ProgressTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Run the transfer to completion
    ///
    /// The sink's one-time `prepare` step runs before the first pull. The
    /// source is closed on every exit path. On success the sink is finalized
    /// before the source is closed and both run; the first error is returned.
    pub async fn run(mut self) -> Result<TransferSummary> {
        if self.batch_size == 0 {
            return Err(TransferError::InvalidBatchSize(0).into());
        }
        self.transform.validate()?;

        info!(
            "Transferring from {} to {} (batch size {})",
            self.source.describe(),
            self.sink.describe(),
            self.batch_size
        );

        let result = self.drive().await;
        self.tracker.finish();

        if result.is_err() {
            if let Err(e) = self.source.close().await {
                warn!("Failed to close {} after error: {e}", self.source.describe());
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<TransferSummary> {
        let start_time = Instant::now();
        let mut summary = TransferSummary {
            origin: self.source.describe(),
            destination: self.sink.describe(),
            ..Default::default()
        };

        self.sink.prepare().await?;

        while let Some(batch) = self.source.next_batch(self.batch_size).await? {
            let batch_index = summary.batches as usize + 1;
            summary.records_read += batch.len() as u64;
            debug!("Received batch #{} of {} records", batch_index, batch.len());

            let batch = self.apply(batch, batch_index, &mut summary)?;

            let written = match self.sink.write_batch(&batch).await {
                Ok(count) => count,
                Err(e) => {
                    error!("Batch #{batch_index} rejected by {}: {e}", self.sink.describe());
                    let (committed, cause) = match e {
                        MongoieError::Transfer(TransferError::PartialBatch { committed, source }) => {
                            (committed as u64, *source)
                        }
                        other => (0, other),
                    };
                    return Err(TransferError::WriteFailed {
                        batch_index,
                        written: summary.records_written + committed,
                        source: Box::new(cause),
                    }
                    .into());
                }
            };

            summary.records_written += written as u64;
            summary.batches += 1;
            self.tracker.update(summary.records_written);

            if summary.batches % 10 == 0 {
                info!(
                    "Progress: {} records written ({} batches)",
                    summary.records_written, summary.batches
                );
            }
        }

        // Finalize even when closing the source fails, so output files are complete
        let finalized = self.sink.finalize().await;
        let closed = self.source.close().await;
        finalized?;
        closed?;

        summary.elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Transfer completed: {} records in {} batches, {} ms",
            summary.records_written, summary.batches, summary.elapsed_ms
        );
        Ok(summary)
    }

    fn apply(
        &self,
        batch: Vec<Document>,
        batch_index: usize,
        summary: &mut TransferSummary,
    ) -> Result<Vec<Document>> {
        match &self.transform {
            Transform::None => Ok(batch),
            Transform::Flatten { separator } => Ok(batch
                .into_iter()
                .map(|doc| {
                    let (flat, report) = flatten_with_report(doc, separator);
                    if !report.is_lossless() {
                        summary.absorb(report);
                    }
                    flat
                })
                .collect()),
            Transform::Unflatten { separator } => batch
                .into_iter()
                .map(|doc| {
                    unflatten(doc, separator).map_err(|conflict| {
                        error!("Batch #{batch_index} cannot be denormalized: {conflict}");
                        MongoieError::from(conflict)
                    })
                })
                .collect(),
        }
    }
}
