//! Top-level transfer operations
//!
//! `export` streams a collection (or an aggregation result) into a file,
//! `import` streams a file or a directory of files into a collection. Both
//! settle the file format before a connection is opened, and both hold a
//! single client that is shut down on every exit path.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use mongodb::bson::doc;
use tracing::{info, warn};

use crate::config::{Config, ConnectionConfig};
use crate::connection::ConnectionManager;
use crate::error::{Result, TransferError};

use super::format::FileFormat;
use super::pipeline::{Pipeline, Transform, TransferSummary};
use super::progress::ProgressTracker;
use super::query::ExportQuery;
use super::sinks::{CollectionSink, RecordSink, SplitSink};
use super::sources::directory::DirectoryScan;
use super::sources::{CursorSource, DirectorySource, RecordSource, SourceOptions};

/// Everything `export` needs
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub uri: String,
    pub db: String,
    pub collection: String,
    pub query: ExportQuery,
    /// Output file; a timestamped name in the working directory when absent
    pub file_path: Option<PathBuf>,
    /// Format token overriding the file extension
    pub format: Option<String>,
    /// Flatten documents; defaults to on for CSV and Parquet
    pub normalize: Option<bool>,
    pub separator: String,
    pub batch_size: usize,
    /// Maximum records per output file
    pub file_size: Option<u64>,
    pub exclude_id: bool,
    /// Format used when neither a path nor a token is given
    pub default_format: String,
    pub progress: bool,
    pub connection: ConnectionConfig,
}

impl ExportOptions {
    /// Options for exporting `db.collection`, defaults taken from `config`
    pub fn new(config: &Config, uri: &str, db: &str, collection: &str) -> Self {
        Self {
            uri: uri.to_string(),
            db: db.to_string(),
            collection: collection.to_string(),
            query: ExportQuery::default(),
            file_path: None,
            format: None,
            normalize: None,
            separator: config.transfer.separator.clone(),
            batch_size: config.transfer.batch_size,
            file_size: None,
            exclude_id: config.transfer.exclude_id,
            default_format: config.transfer.default_format.clone(),
            progress: config.transfer.progress,
            connection: config.connection.clone(),
        }
    }

    /// Decide output path and format without touching the database
    pub fn resolve_target(&self, now: NaiveDateTime) -> Result<(PathBuf, FileFormat)> {
        let format = match (&self.format, &self.file_path) {
            (Some(token), _) => FileFormat::from_token(token)?,
            (None, Some(path)) => FileFormat::from_path(path)?,
            (None, None) => FileFormat::from_token(&self.default_format)?,
        };

        let path = match &self.file_path {
            Some(path) => path.clone(),
            None => {
                let path = PathBuf::from(default_file_name(
                    &self.db,
                    &self.collection,
                    format,
                    now,
                ));
                warn!("No output file given, writing to {}", path.display());
                path
            }
        };
        Ok((path, format))
    }

    /// Whether documents get flattened for `format`
    pub fn normalizes(&self, format: FileFormat) -> bool {
        self.normalize.unwrap_or(format.is_tabular())
    }
}

/// `<db>_<collection>_<timestamp>.<ext>`
pub fn default_file_name(
    db: &str,
    collection: &str,
    format: FileFormat,
    now: NaiveDateTime,
) -> String {
    format!(
        "{db}_{collection}_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Export a collection to a file
pub async fn export(options: ExportOptions) -> Result<TransferSummary> {
    let (path, format) = options.resolve_target(Local::now().naive_local())?;
    let normalize = options.normalizes(format);
    let transform = if normalize {
        Transform::Flatten {
            separator: options.separator.clone(),
        }
    } else {
        Transform::None
    };
    check_batch_size(options.batch_size)?;
    transform.validate()?;

    if format.is_tabular() && !normalize {
        warn!("Writing {format} without normalization, nested documents become JSON text");
    }

    let mut manager = ConnectionManager::new(options.uri.clone(), options.connection.clone());
    manager.connect().await?;

    let result = run_export(&manager, &options, &path, format, transform).await;
    release(&mut manager).await;
    result
}

async fn run_export(
    manager: &ConnectionManager,
    options: &ExportOptions,
    path: &Path,
    format: FileFormat,
    transform: Transform,
) -> Result<TransferSummary> {
    let collection = manager.get_collection(&options.db, &options.collection)?;
    let cursor_batch = u32::try_from(options.batch_size).unwrap_or(u32::MAX);

    let source: Box<dyn RecordSource> = match &options.query {
        ExportQuery::Filter(filter) => {
            let mut find = collection.find(filter.clone()).batch_size(cursor_batch);
            if options.exclude_id {
                find = find.projection(doc! { "_id": 0 });
            }
            Box::new(CursorSource::find(find.await?))
        }
        ExportQuery::Pipeline(stages) => {
            let stages = if options.exclude_id {
                ExportQuery::pipeline_without_id(stages)
            } else {
                stages.clone()
            };
            let cursor = collection.aggregate(stages).batch_size(cursor_batch).await?;
            Box::new(CursorSource::aggregate(cursor))
        }
    };

    let sink: Box<dyn RecordSink> = match options.file_size {
        Some(max_records) => Box::new(SplitSink::new(format, path, max_records)?),
        None => format.create_sink(path).await?,
    };

    Pipeline::new(source, sink)
        .batch_size(options.batch_size)
        .transform(transform)
        .with_progress(ProgressTracker::new(None, options.progress))
        .run()
        .await
}

/// Where imported records come from
#[derive(Debug, Clone)]
pub enum ImportInput {
    /// A single file, format taken from its extension
    File(PathBuf),
    /// Every matching file of a directory, in file name order
    Directory { path: PathBuf, scan: DirectoryScan },
}

/// Everything `import` needs
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub uri: String,
    pub db: String,
    pub collection: String,
    pub input: ImportInput,
    /// Empty the collection before the first batch
    pub clear_before: bool,
    /// Rebuild nested documents from path-keyed records
    pub denormalize: bool,
    pub separator: String,
    pub batch_size: usize,
    pub exclude_id: bool,
    pub progress: bool,
    pub connection: ConnectionConfig,
}

impl ImportOptions {
    /// Options for importing `input` into `db.collection`, defaults taken from `config`
    pub fn new(config: &Config, uri: &str, db: &str, collection: &str, input: ImportInput) -> Self {
        Self {
            uri: uri.to_string(),
            db: db.to_string(),
            collection: collection.to_string(),
            input,
            clear_before: config.transfer.clear_before_import,
            denormalize: config.transfer.denormalize_import,
            separator: config.transfer.separator.clone(),
            batch_size: config.transfer.batch_size,
            exclude_id: config.transfer.exclude_id,
            progress: config.transfer.progress,
            connection: config.connection.clone(),
        }
    }

    async fn open_source(&self) -> Result<Box<dyn RecordSource>> {
        let options = SourceOptions {
            batch_size: self.batch_size,
            exclude_id: self.exclude_id,
        };
        match &self.input {
            ImportInput::File(path) => {
                let format = FileFormat::from_path(path)?;
                format.open_source(path, options).await
            }
            ImportInput::Directory { path, scan } => {
                Ok(Box::new(DirectorySource::discover(path, scan, options)?))
            }
        }
    }
}

/// Import a file or directory into a collection
pub async fn import(options: ImportOptions) -> Result<TransferSummary> {
    let transform = if options.denormalize {
        info!(
            "Denormalizing imported records on separator '{}'",
            options.separator
        );
        Transform::Unflatten {
            separator: options.separator.clone(),
        }
    } else {
        Transform::None
    };
    check_batch_size(options.batch_size)?;
    transform.validate()?;

    let source = options.open_source().await?;

    let mut manager = ConnectionManager::new(options.uri.clone(), options.connection.clone());
    manager.connect().await?;

    let result = async {
        let collection = manager.get_collection(&options.db, &options.collection)?;
        let sink = CollectionSink::new(collection, options.clear_before);
        Pipeline::new(source, Box::new(sink))
            .batch_size(options.batch_size)
            .transform(transform)
            .with_progress(ProgressTracker::new(None, options.progress))
            .run()
            .await
    }
    .await;

    release(&mut manager).await;
    result
}

/// Sorted database names
pub async fn list_databases(uri: &str, config: &ConnectionConfig) -> Result<Vec<String>> {
    let mut manager = ConnectionManager::new(uri.to_string(), config.clone());
    manager.connect().await?;
    let result = manager.list_databases().await;
    release(&mut manager).await;
    result
}

/// Sorted collection names of `db`, optionally filtered by a server-side regex
pub async fn list_collections(
    uri: &str,
    db: &str,
    name_regex: Option<&str>,
    config: &ConnectionConfig,
) -> Result<Vec<String>> {
    let mut manager = ConnectionManager::new(uri.to_string(), config.clone());
    manager.connect().await?;
    let result = manager.list_collections(db, name_regex).await;
    release(&mut manager).await;
    result
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(TransferError::InvalidBatchSize(batch_size).into());
    }
    Ok(())
}

async fn release(manager: &mut ConnectionManager) {
    if let Err(e) = manager.disconnect().await {
        warn!("Failed to disconnect cleanly: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormatError, MongoieError};
    use chrono::NaiveDate;

    // Port 1 is never served; anything that reaches connect fails.
    const DEAD_URI: &str = "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200";

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .unwrap()
    }

    fn export_options() -> ExportOptions {
        ExportOptions::new(&Config::default(), DEAD_URI, "shop", "orders")
    }

    #[test]
    fn test_default_file_name() {
        assert_eq!(
            default_file_name("shop", "orders", FileFormat::Csv, at()),
            "shop_orders_20240309_140507.csv"
        );
    }

    #[test]
    fn test_resolve_target_from_path() {
        let mut options = export_options();
        options.file_path = Some(PathBuf::from("out/orders.parquet"));
        let (path, format) = options.resolve_target(at()).unwrap();
        assert_eq!(path, PathBuf::from("out/orders.parquet"));
        assert_eq!(format, FileFormat::Parquet);
        assert!(options.normalizes(format));
    }

    #[test]
    fn test_resolve_target_token_overrides_extension() {
        let mut options = export_options();
        options.file_path = Some(PathBuf::from("orders.txt"));
        options.format = Some("jsonl".to_string());
        let (_, format) = options.resolve_target(at()).unwrap();
        assert_eq!(format, FileFormat::JsonLines);
        assert!(!options.normalizes(format));
    }

    #[test]
    fn test_resolve_target_without_path_uses_default_format() {
        let options = export_options();
        let (path, format) = options.resolve_target(at()).unwrap();
        assert_eq!(format, FileFormat::Json);
        assert_eq!(path, PathBuf::from("shop_orders_20240309_140507.json"));
    }

    #[test]
    fn test_explicit_normalize_wins() {
        let mut options = export_options();
        options.normalize = Some(false);
        assert!(!options.normalizes(FileFormat::Csv));
        options.normalize = Some(true);
        assert!(options.normalizes(FileFormat::Json));
    }

    #[tokio::test]
    async fn test_export_unsupported_format_fails_before_connecting() {
        let mut options = export_options();
        options.file_path = Some(PathBuf::from("orders.xlsx"));
        let err = export(options).await.unwrap_err();
        assert!(matches!(
            err,
            MongoieError::Format(FormatError::Unsupported(ref ext)) if ext == "xlsx"
        ));
    }

    #[tokio::test]
    async fn test_export_zero_batch_size_fails_before_connecting() {
        let mut options = export_options();
        options.batch_size = 0;
        let err = export(options).await.unwrap_err();
        assert!(matches!(
            err,
            MongoieError::Transfer(TransferError::InvalidBatchSize(0))
        ));
    }

    #[tokio::test]
    async fn test_import_missing_file_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let input = ImportInput::File(dir.path().join("absent.json"));
        let options = ImportOptions::new(&Config::default(), DEAD_URI, "shop", "orders", input);
        let err = import(options).await.unwrap_err();
        assert!(matches!(err, MongoieError::Io(_)));
    }

    #[tokio::test]
    async fn test_import_directory_with_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let input = ImportInput::Directory {
            path: dir.path().to_path_buf(),
            scan: DirectoryScan {
                extension: "xml".to_string(),
                ..Default::default()
            },
        };
        let options = ImportOptions::new(&Config::default(), DEAD_URI, "shop", "orders", input);
        let err = import(options).await.unwrap_err();
        assert!(matches!(
            err,
            MongoieError::Format(FormatError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_import_empty_separator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, "[]").unwrap();
        let mut options = ImportOptions::new(
            &Config::default(),
            DEAD_URI,
            "shop",
            "orders",
            ImportInput::File(path),
        );
        options.denormalize = true;
        options.separator = String::new();
        assert!(matches!(
            import(options).await.unwrap_err(),
            MongoieError::Config(_)
        ));
    }

    #[tokio::test]
    async fn test_import_unreachable_server_is_a_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"a": 1}]"#).unwrap();
        let mut options = ImportOptions::new(
            &Config::default(),
            DEAD_URI,
            "shop",
            "orders",
            ImportInput::File(path),
        );
        options.connection.timeout = 1;
        assert!(matches!(
            import(options).await.unwrap_err(),
            MongoieError::Connection(_)
        ));
    }
}
