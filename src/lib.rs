//! mongoie library
//!
//! Streaming conversion between MongoDB collections and JSON, JSON Lines,
//! CSV and Parquet files. Documents move one bounded batch at a time; nested
//! documents can be flattened into path-keyed records for tabular formats
//! and rebuilt on the way back.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `transfer`: Flattening, sources, sinks, the batch pipeline and the
//!   top-level export/import operations
//!
//! # Example
//!
//! ```no_run
//! use mongoie::config::Config;
//! use mongoie::transfer::{ExportOptions, export};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let mut options =
//!         ExportOptions::new(&config, "mongodb://localhost:27017", "shop", "orders");
//!     options.file_path = Some(PathBuf::from("orders.csv"));
//!
//!     let summary = export(options).await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{MongoieError, Result};
pub use transfer::flatten::{flatten, unflatten};
pub use transfer::{FileFormat, Pipeline, TransferSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
