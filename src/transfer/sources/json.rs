//! JSON file source
//!
//! Reads either a JSON array of objects or one object per line, detected
//! from the first significant byte. Objects are cut out of the byte stream
//! one at a time and parsed individually, so the file is never loaded whole.
//! Extended JSON (`{"$oid": ...}`, `{"$date": ...}`) is turned back into the
//! corresponding BSON types.

use std::path::Path;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::error::{FormatError, MongoieError, Result};

use super::{RecordSource, SourceOptions};

/// Position of the scanner within the file's framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// Nothing significant read yet
    Start,
    /// Just after `[`: an object or `]`
    ArrayOpen,
    /// Just after `,`: an object
    ArrayElement,
    /// Just after an element: `,` or `]`
    ArraySeparator,
    /// `{...}\n{...}\n`
    Lines,
    /// The stream is over; nothing more will be read
    Done,
}
/// Lazy reader for JSON and JSON Lines files
pub struct JsonSource {
    reader: Option<BufReader<File>>,
    path: String,
    options: SourceOptions,
    framing: Framing,
    records: u64,
}

impl JsonSource {
    /// Open a JSON file for lazy reading
    pub async fn open(path: &Path, options: SourceOptions) -> Result<Self> {
        let file = File::open(path).await?;
        debug!("Opened JSON source: {}", path.display());

        Ok(Self {
            reader: Some(BufReader::new(file)),
            path: path.display().to_string(),
            options,
            framing: Framing::Start,
            records: 0,
        })
    }

    fn malformed(&self, detail: impl Into<String>) -> MongoieError {
        FormatError::Malformed {
            location: format!("{} (record {})", self.path, self.records + 1),
            detail: detail.into(),
        }
        .into()
    }

    async fn next_byte(&mut self) -> Result<Option<u8>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let byte = {
            let available = reader.fill_buf().await?;
            match available.first() {
                Some(b) => *b,
                None => return Ok(None),
            }
        };
        reader.consume(1);
        Ok(Some(byte))
    }

    /// Skip to the start of the next object; false once the stream is done.
    async fn seek_object(&mut self) -> Result<bool> {
        loop {
            if self.framing == Framing::Done {
                return Ok(false);
            }

            let Some(byte) = self.next_byte().await? else {
                return match self.framing {
                    Framing::Start | Framing::Lines => {
                        self.framing = Framing::Done;
                        Ok(false)
                    }
                    _ => Err(self.malformed("unterminated JSON array")),
                };
            };

            match (byte, self.framing) {
                (b, _) if b.is_ascii_whitespace() => continue,
                (b'[', Framing::Start) => self.framing = Framing::ArrayOpen,
                (b'{', Framing::Start | Framing::Lines) => {
                    self.framing = Framing::Lines;
                    return Ok(true);
                }
                (b'{', Framing::ArrayOpen | Framing::ArrayElement) => {
                    self.framing = Framing::ArraySeparator;
                    return Ok(true);
                }
                (b',', Framing::ArraySeparator) => self.framing = Framing::ArrayElement,
                (b']', Framing::ArrayOpen | Framing::ArraySeparator) => {
                    self.expect_end().await?;
                    return Ok(false);
                }
                (b'{', Framing::ArraySeparator) => {
                    return Err(self.malformed("missing ',' between array elements"));
                }
                (other, _) => {
                    return Err(self.malformed(format!(
                        "expected a JSON object, found '{}'",
                        char::from(other)
                    )));
                }
            }
        }
    }

    /// After the closing `]` only whitespace may follow.
    async fn expect_end(&mut self) -> Result<()> {
        while let Some(byte) = self.next_byte().await? {
            if !byte.is_ascii_whitespace() {
                return Err(self.malformed(format!(
                    "unexpected '{}' after the closing ']'",
                    char::from(byte)
                )));
            }
        }
        self.framing = Framing::Done;
        self.reader = None;
        Ok(())
    }

    /// Collect the bytes of one object whose opening brace was just read.
    async fn read_object(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![b'{'];
        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;

        while depth > 0 {
            let Some(byte) = self.next_byte().await? else {
                return Err(self.malformed("unexpected end of file inside an object"));
            };
            buf.push(byte);

            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth -= 1,
                _ => {}
            }
        }

        Ok(buf)
    }
}

#[async_trait]
impl RecordSource for JsonSource {
    async fn next_document(&mut self) -> Result<Option<Document>> {
        if !self.seek_object().await? {
            return Ok(None);
        }

        let bytes = self.read_object().await?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| self.malformed(e.to_string()))?;
        let doc = match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => doc,
            Ok(other) => {
                return Err(self.malformed(format!(
                    "extended JSON object decoded to {:?}, not a document",
                    other.element_type()
                )));
            }
            Err(e) => return Err(self.malformed(e.to_string())),
        };

        self.records += 1;
        Ok(Some(self.options.shape(doc)))
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!("Closed JSON source {} after {} records", self.path, self.records);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::sources::testing::drain;
    use mongodb::bson::{doc, oid::ObjectId};
    use tempfile::TempDir;

    async fn source_for(contents: &str, options: SourceOptions) -> (TempDir, JsonSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        tokio::fs::write(&path, contents).await.unwrap();
        let source = JsonSource::open(&path, options).await.unwrap();
        (dir, source)
    }

    #[tokio::test]
    async fn test_reads_array_of_objects() {
        let (_dir, mut source) = source_for(
            r#"[ {"name": "a", "address": {"city": "London"}}, {"name": "b, \"quoted\" }"} ]"#,
            SourceOptions::default(),
        )
        .await;

        let docs = drain(&mut source).await.unwrap();
        assert_eq!(
            docs,
            vec![
                doc! { "name": "a", "address": { "city": "London" } },
                doc! { "name": "b, \"quoted\" }" },
            ]
        );
    }

    #[tokio::test]
    async fn test_reads_one_object_per_line() {
        let (_dir, mut source) = source_for(
            "{\"i\": 1}\n{\"i\": 2, \"tags\": [\"x\", {\"y\": [1]}]}\n\n",
            SourceOptions::default(),
        )
        .await;

        let docs = drain(&mut source).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].get_array("tags").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_array_yields_nothing() {
        let (_dir, mut source) = source_for(" [ ] ", SourceOptions::default()).await;
        assert!(source.next_document().await.unwrap().is_none());
        assert!(source.next_document().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extended_json_restores_types() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        let (_dir, mut source) = source_for(
            r#"[{"_id": {"$oid": "65a1b2c3d4e5f60718293a4b"}, "at": {"$date": "2024-01-01T00:00:00Z"}}]"#,
            SourceOptions::default(),
        )
        .await;

        let doc = source.next_document().await.unwrap().unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), oid);
        assert!(doc.get_datetime("at").is_ok());
    }

    #[tokio::test]
    async fn test_exclude_id_strips_identifier() {
        let options = SourceOptions {
            exclude_id: true,
            ..Default::default()
        };
        let (_dir, mut source) = source_for(r#"[{"_id": 1, "v": 2}]"#, options).await;

        let doc = source.next_document().await.unwrap().unwrap();
        assert_eq!(doc, doc! { "v": 2 });
    }

    #[tokio::test]
    async fn test_non_object_element_is_malformed() {
        let (_dir, mut source) = source_for(r#"[{"a": 1}, 42]"#, SourceOptions::default()).await;

        assert!(source.next_document().await.unwrap().is_some());
        let err = source.next_document().await.unwrap_err();
        assert!(matches!(
            err,
            MongoieError::Format(FormatError::Malformed { ref location, .. }) if location.contains("record 2")
        ));
    }

    #[tokio::test]
    async fn test_truncated_file_is_malformed() {
        let (_dir, mut source) = source_for(r#"[{"a": 1}, {"b": "#, SourceOptions::default()).await;

        assert!(source.next_document().await.unwrap().is_some());
        assert!(source.next_document().await.is_err());
    }

    #[tokio::test]
    async fn test_partial_last_batch_through_pipeline() {
        use crate::transfer::pipeline::Pipeline;
        use crate::transfer::sinks::testing::{VecSink, batch_sizes};

        let (_dir, source) =
            source_for(r#"[{"a":1},{"a":2},{"a":3}]"#, SourceOptions::default()).await;
        let (sink, log) = VecSink::new();

        let summary = Pipeline::new(Box::new(source), Box::new(sink))
            .batch_size(1000)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.records_written, 3);
        assert_eq!(batch_sizes(&log), vec![3]);
    }

    #[tokio::test]
    async fn test_lines_file_stays_exhausted() {
        let (_dir, mut source) = source_for("{\"a\": 1}\n", SourceOptions::default()).await;

        assert!(source.next_document().await.unwrap().is_some());
        assert!(source.next_document().await.unwrap().is_none());
        assert!(source.next_document().await.unwrap().is_none());
    }

    async fn framing_error(contents: &str) -> String {
        let (_dir, mut source) = source_for(contents, SourceOptions::default()).await;
        drain(&mut source).await.unwrap_err().to_string()
    }

    #[tokio::test]
    async fn test_leading_comma_is_malformed() {
        let msg = framing_error(r#"[,, {"a":1}]"#).await;
        assert!(msg.contains("found ','"), "{msg}");
    }

    #[tokio::test]
    async fn test_missing_comma_is_malformed() {
        let msg = framing_error(r#"[{"a":1} {"b":2}]"#).await;
        assert!(msg.contains("missing ','"), "{msg}");
        assert!(msg.contains("record 2"), "{msg}");
    }

    #[tokio::test]
    async fn test_trailing_comma_is_malformed() {
        let msg = framing_error(r#"[{"a":1},]"#).await;
        assert!(msg.contains("found ']'"), "{msg}");
    }

    #[tokio::test]
    async fn test_content_after_array_is_malformed() {
        let msg = framing_error("[{\"a\":1}] trailing garbage").await;
        assert!(msg.contains("after the closing ']'"), "{msg}");
    }

    #[tokio::test]
    async fn test_unterminated_array_is_malformed() {
        let (_dir, mut source) = source_for(r#"[{"a": 1}"#, SourceOptions::default()).await;

        assert!(source.next_document().await.unwrap().is_some());
        assert!(source.next_document().await.is_err());
    }
}
