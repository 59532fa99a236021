//! Export query parsing
//!
//! An export query is either a filter document (run with `find`) or an
//! array of aggregation stages (run with `aggregate`). It can be given
//! inline as (extended) JSON or as the path of a `.json` file holding it.

use std::path::Path;

use mongodb::bson::{Bson, Document, doc};

use crate::error::{ConfigError, MongoieError, Result};

/// Query selecting the documents to export
#[derive(Debug, Clone, PartialEq)]
pub enum ExportQuery {
    /// Filter document for `find`
    Filter(Document),
    /// Stages for `aggregate`
    Pipeline(Vec<Document>),
}

impl Default for ExportQuery {
    fn default() -> Self {
        ExportQuery::Filter(Document::new())
    }
}

impl ExportQuery {
    /// Parse inline JSON, or read it from a `.json` file when `input` names one
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let path = Path::new(trimmed);
        let is_file = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            && path.is_file();
        if is_file {
            let text = std::fs::read_to_string(path)?;
            return Self::from_json(&text, &path.display().to_string());
        }

        Self::from_json(trimmed, "query")
    }

    fn from_json(text: &str, origin: &str) -> Result<Self> {
        let invalid = |detail: String| -> MongoieError {
            ConfigError::InvalidValue {
                field: origin.to_string(),
                value: detail,
            }
            .into()
        };

        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| invalid(format!("not valid JSON ({e})")))?;
        match Bson::try_from(value).map_err(|e| invalid(e.to_string()))? {
            Bson::Document(filter) => Ok(ExportQuery::Filter(filter)),
            Bson::Array(stages) => stages
                .into_iter()
                .map(|stage| match stage {
                    Bson::Document(stage) => Ok(stage),
                    other => Err(invalid(format!(
                        "pipeline stage must be a document, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(ExportQuery::Pipeline),
            other => Err(invalid(format!(
                "expected a filter document or an array of stages, got {other}"
            ))),
        }
    }

    /// Whether the query runs through `aggregate`
    pub fn is_pipeline(&self) -> bool {
        matches!(self, ExportQuery::Pipeline(_))
    }

    /// Stages with `_id` projected out at the end
    pub fn pipeline_without_id(stages: &[Document]) -> Vec<Document> {
        let mut stages = stages.to_vec();
        stages.push(doc! { "$project": { "_id": 0 } });
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_document() {
        let query = ExportQuery::parse(r#"{"age": {"$gt": 30}}"#).unwrap();
        assert_eq!(query, ExportQuery::Filter(doc! { "age": { "$gt": 30 } }));
        assert!(!query.is_pipeline());
    }

    #[test]
    fn test_pipeline_array() {
        let query = ExportQuery::parse(r#"[{"$match": {"a": 1}}, {"$limit": 5}]"#).unwrap();
        assert_eq!(
            query,
            ExportQuery::Pipeline(vec![doc! { "$match": { "a": 1 } }, doc! { "$limit": 5 }])
        );
        assert!(query.is_pipeline());
    }

    #[test]
    fn test_empty_input_matches_everything() {
        assert_eq!(ExportQuery::parse("  ").unwrap(), ExportQuery::default());
    }

    #[test]
    fn test_extended_json_values() {
        let query = ExportQuery::parse(r#"{"_id": {"$oid": "65a1b2c3d4e5f60718293a4b"}}"#).unwrap();
        match query {
            ExportQuery::Filter(filter) => assert!(filter.get_object_id("_id").is_ok()),
            other => panic!("unexpected query: {other:?}"),
        }
    }

    #[test]
    fn test_query_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"[{"$match": {"x": true}}]"#).unwrap();

        let query = ExportQuery::parse(&path.display().to_string()).unwrap();
        assert!(query.is_pipeline());
    }

    #[test]
    fn test_invalid_query_is_an_error() {
        assert!(ExportQuery::parse("{not json").is_err());
        assert!(ExportQuery::parse("42").is_err());
        assert!(ExportQuery::parse(r#"[{"$match": {}}, 3]"#).is_err());
    }

    #[test]
    fn test_pipeline_without_id_appends_projection() {
        let stages = ExportQuery::pipeline_without_id(&[doc! { "$match": {} }]);
        assert_eq!(stages.last(), Some(&doc! { "$project": { "_id": 0 } }));
        assert_eq!(stages.len(), 2);
    }
}
