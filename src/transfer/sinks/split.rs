//! Size-capped output
//!
//! Rotates to a new file every `max_records` documents. Parts are named
//! `<stem>_<n><ext>` with `n` counting from 1, and each part is a complete
//! file of the selected format. A batch straddling the cap is split.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::info;

use crate::error::{MongoieError, Result};
use crate::transfer::format::FileFormat;

use super::RecordSink;

/// Sink writing consecutive parts of at most `max_records` documents
pub struct SplitSink {
    format: FileFormat,
    base: PathBuf,
    max_records: u64,
    current: Option<Box<dyn RecordSink>>,
    in_current: u64,
    parts: Vec<PathBuf>,
}

impl SplitSink {
    /// Create a rotating sink; no file is opened until the first write
    pub fn new(format: FileFormat, base: &Path, max_records: u64) -> Result<Self> {
        if max_records == 0 {
            return Err(MongoieError::Generic(
                "file size must be at least one record".to_string(),
            ));
        }

        Ok(Self {
            format,
            base: base.to_path_buf(),
            max_records,
            current: None,
            in_current: 0,
            parts: Vec::new(),
        })
    }

    /// Files written so far, in order
    pub fn parts(&self) -> &[PathBuf] {
        &self.parts
    }

    async fn rotate(&mut self) -> Result<()> {
        if let Some(mut done) = self.current.take() {
            done.finalize().await?;
        }

        let path = part_path(&self.base, self.parts.len() + 1);
        info!("Writing part {}: {}", self.parts.len() + 1, path.display());
        self.current = Some(self.format.create_sink(&path).await?);
        self.parts.push(path);
        self.in_current = 0;
        Ok(())
    }
}

/// `<stem>_<n><ext>` next to `base`
pub fn part_path(base: &Path, n: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    base.with_file_name(name)
}

#[async_trait]
impl RecordSink for SplitSink {
    async fn write_batch(&mut self, docs: &[Document]) -> Result<usize> {
        let mut offset = 0;
        while offset < docs.len() {
            if self.current.is_none() || self.in_current >= self.max_records {
                self.rotate().await?;
            }

            let room = (self.max_records - self.in_current) as usize;
            let end = docs.len().min(offset + room);
            if let Some(sink) = self.current.as_mut() {
                sink.write_batch(&docs[offset..end]).await?;
            }
            self.in_current += (end - offset) as u64;
            offset = end;
        }
        Ok(docs.len())
    }

    async fn finalize(&mut self) -> Result<()> {
        // An empty export still produces one valid (empty) part
        if self.parts.is_empty() {
            self.rotate().await?;
        }
        if let Some(mut last) = self.current.take() {
            last.finalize().await?;
        }
        info!("Wrote {} file(s) from {}", self.parts.len(), self.base.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "{} files {} (max {} records each)",
            self.format,
            self.base.display(),
            self.max_records
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_part_path_naming() {
        assert_eq!(
            part_path(Path::new("/tmp/out/users.json"), 1),
            PathBuf::from("/tmp/out/users_1.json")
        );
        assert_eq!(part_path(Path::new("users"), 12), PathBuf::from("users_12"));
    }

    #[tokio::test]
    async fn test_split_sink_rotates_and_splits_batches() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("users.jsonl");
        let mut sink = SplitSink::new(FileFormat::JsonLines, &base, 2).unwrap();

        let docs: Vec<Document> = (0..5).map(|i| doc! { "i": i }).collect();
        sink.write_batch(&docs[..3]).await.unwrap();
        sink.write_batch(&docs[3..]).await.unwrap();
        sink.finalize().await.unwrap();

        assert_eq!(sink.parts().len(), 3);
        let lines = |n: usize| {
            std::fs::read_to_string(dir.path().join(format!("users_{n}.jsonl")))
                .unwrap()
                .lines()
                .count()
        };
        assert_eq!((lines(1), lines(2), lines(3)), (2, 2, 1));
        assert!(!base.exists());
    }

    #[tokio::test]
    async fn test_split_sink_empty_export_writes_one_part() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("empty.json");
        let mut sink = SplitSink::new(FileFormat::Json, &base, 10).unwrap();
        sink.finalize().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("empty_1.json")).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[test]
    fn test_zero_cap_is_rejected() {
        assert!(SplitSink::new(FileFormat::Csv, Path::new("x.csv"), 0).is_err());
    }
}
