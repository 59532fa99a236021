//! Error handling module for mongoie.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`MongoieError`] wraps a more specific kind:
//! - [`ConnectionError`]: the database could not be reached
//! - [`FormatError`]: unsupported file formats, malformed source records,
//!   columnar schema drift
//! - [`TransferError`]: pipeline failures (structure conflicts while
//!   denormalizing, rejected batch writes)
//! - [`ConfigError`]: invalid configuration or arguments
//!
//! Driver errors are kept as-is and rendered through [`mongo::extract_error_info`].
//!
//! # Example
//!
//! ```rust,no_run
//! use mongoie::error::{FormatError, MongoieError, Result};
//!
//! fn pick(ext: &str) -> Result<()> {
//!     Err(FormatError::Unsupported(ext.to_string()).into())
//! }
//!
//! match pick("xml") {
//!     Err(MongoieError::Format(FormatError::Unsupported(ext))) => assert_eq!(ext, "xml"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ConnectionError, FormatError, MongoieError, Result, TransferError,
};
pub use mongo::{ErrorInfo, extract_error_info};
