//! Database cursor source
//!
//! Wraps a driver cursor from `find` or `aggregate`. The driver fetches from
//! the server in its own batches; this source hands documents out one by one.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Cursor;
use mongodb::bson::Document;
use tracing::{debug, info};

use crate::error::Result;

use super::RecordSource;

/// Cursor-based source for both find and aggregate queries
pub struct CursorSource {
    cursor: Option<Cursor<Document>>,
    total_fetched: u64,
    query_type: &'static str,
}

impl CursorSource {
    /// Create a new cursor source
    ///
    /// # Arguments
    /// * `cursor` - MongoDB cursor from find or aggregate operation
    /// * `query_type` - Type of query for logging ("Find" or "Aggregate")
    pub fn new(cursor: Cursor<Document>, query_type: &'static str) -> Self {
        Self {
            cursor: Some(cursor),
            total_fetched: 0,
            query_type,
        }
    }

    /// Create a source over a find cursor
    pub fn find(cursor: Cursor<Document>) -> Self {
        Self::new(cursor, "Find")
    }

    /// Create a source over an aggregate cursor
    pub fn aggregate(cursor: Cursor<Document>) -> Self {
        Self::new(cursor, "Aggregate")
    }
}

#[async_trait]
impl RecordSource for CursorSource {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        match cursor.try_next().await {
            Ok(Some(doc)) => {
                self.total_fetched += 1;
                Ok(Some(doc))
            }
            Ok(None) => {
                debug!(
                    "{} cursor exhausted after {} documents",
                    self.query_type, self.total_fetched
                );
                self.cursor = None;
                Ok(None)
            }
            Err(e) => {
                // Release the server-side cursor before surfacing the error
                self.cursor = None;
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.cursor.take().is_some() {
            info!(
                "Closed {} cursor after fetching {} documents",
                self.query_type, self.total_fetched
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} cursor", self.query_type.to_lowercase())
    }
}

