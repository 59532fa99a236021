//! Directory source
//!
//! Concatenates the records of every matching file in a directory into one
//! logical source. Files are filtered by extension and a glob on the file
//! name, sorted by file name, and opened one at a time as the previous file
//! runs out.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::Pattern;
use mongodb::bson::Document;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{MongoieError, Result};
use crate::transfer::format::FileFormat;

use super::{RecordSource, SourceOptions};

/// Which files of a directory to read
#[derive(Debug, Clone)]
pub struct DirectoryScan {
    /// Required file extension, leading dot optional
    pub extension: String,
    /// Glob matched against the file name
    pub pattern: String,
    /// Descend into subdirectories
    pub recursive: bool,
}

impl Default for DirectoryScan {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
            pattern: "*".to_string(),
            recursive: false,
        }
    }
}

impl DirectoryScan {
    /// List matching files, sorted by file name, then by path for equal names
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(MongoieError::Generic(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let pattern = Pattern::new(&self.pattern).map_err(|e| {
            MongoieError::Generic(format!("Invalid file pattern '{}': {e}", self.pattern))
        })?;
        let wanted = self.extension.trim_start_matches('.');

        let mut walker = WalkDir::new(dir).min_depth(1);
        if !self.recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| MongoieError::Generic(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let ext_matches = path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(wanted));
            let name_matches = pattern.matches(&entry.file_name().to_string_lossy());
            if ext_matches && name_matches {
                files.push(path.to_path_buf());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));

        Ok(files)
    }
}

/// Source reading every matching file of a directory in turn
pub struct DirectorySource {
    root: PathBuf,
    format: FileFormat,
    options: SourceOptions,
    pending: VecDeque<PathBuf>,
    current: Option<Box<dyn RecordSource>>,
    files_read: usize,
}

impl DirectorySource {
    /// Find the files to read; none are opened yet
    pub fn discover(dir: &Path, scan: &DirectoryScan, options: SourceOptions) -> Result<Self> {
        let format = FileFormat::from_token(&scan.extension)?;
        let files = scan.discover(dir)?;

        if files.is_empty() {
            warn!(
                "No *.{} files matching '{}' in {}",
                scan.extension.trim_start_matches('.'),
                scan.pattern,
                dir.display()
            );
        } else {
            info!("Found {} file(s) to import in {}", files.len(), dir.display());
        }

        Ok(Self {
            root: dir.to_path_buf(),
            format,
            options,
            pending: files.into(),
            current: None,
            files_read: 0,
        })
    }
}

#[async_trait]
impl RecordSource for DirectorySource {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        loop {
            if let Some(source) = self.current.as_mut() {
                if let Some(doc) = source.next_document().await? {
                    return Ok(Some(doc));
                }
                source.close().await?;
                self.current = None;
            }

            let Some(path) = self.pending.pop_front() else {
                return Ok(None);
            };
            debug!("Reading {}", path.display());
            self.current = Some(self.format.open_source(&path, self.options.clone()).await?);
            self.files_read += 1;
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut source) = self.current.take() {
            source.close().await?;
        }
        self.pending.clear();
        debug!("Closed directory source {} after {} file(s)", self.root.display(), self.files_read);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} files in {}", self.format, self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::sources::testing::drain;
    use mongodb::bson::doc;
    use std::fs;

    fn scan(extension: &str, pattern: &str, recursive: bool) -> DirectoryScan {
        DirectoryScan {
            extension: extension.to_string(),
            pattern: pattern.to_string(),
            recursive,
        }
    }

    #[tokio::test]
    async fn test_pattern_selects_matching_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_logs.json"), r#"[{"src": "a"}]"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"[{"src": "b"}]"#).unwrap();

        let mut source = DirectorySource::discover(
            dir.path(),
            &scan("json", "*logs*", false),
            SourceOptions::default(),
        )
        .unwrap();

        let docs = drain(&mut source).await.unwrap();
        assert_eq!(docs, vec![doc! { "src": "a" }]);
    }

    #[tokio::test]
    async fn test_files_are_read_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "n\n3\n4\n").unwrap();
        fs::write(dir.path().join("a.csv"), "n\n1\n2\n").unwrap();

        let mut source =
            DirectorySource::discover(dir.path(), &scan(".csv", "*", false), SourceOptions::default())
                .unwrap();

        let docs = drain(&mut source).await.unwrap();
        let ns: Vec<i32> = docs.iter().map(|d| d.get_i32("n").unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_recursion_and_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("top.JSON"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("nested").join("deep.json"), "[]").unwrap();

        let flat = scan("json", "*", false).discover(dir.path()).unwrap();
        assert_eq!(flat, vec![dir.path().join("top.JSON")]);

        let deep = scan("json", "*", true).discover(dir.path()).unwrap();
        assert_eq!(
            deep,
            vec![dir.path().join("nested").join("deep.json"), dir.path().join("top.JSON")]
        );
    }

    #[test]
    fn test_recursive_scan_orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("z")).unwrap();
        fs::write(dir.path().join("b.json"), "[]").unwrap();
        fs::write(dir.path().join("z").join("a.json"), "[]").unwrap();
        fs::write(dir.path().join("z").join("b.json"), "[]").unwrap();

        let files = scan("json", "*", true).discover(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("z").join("a.json"),
                dir.path().join("b.json"),
                dir.path().join("z").join("b.json"),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_matching_files_is_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut source =
            DirectorySource::discover(dir.path(), &DirectoryScan::default(), SourceOptions::default())
                .unwrap();
        assert!(source.next_document().await.unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = DirectoryScan::default().discover(Path::new("/nonexistent/import/dir"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            DirectorySource::discover(dir.path(), &scan("xml", "*", false), SourceOptions::default());
        assert!(result.is_err());
    }
}
