//! Streaming transfer between collections and files
//!
//! Records move from a [`sources::RecordSource`] to a [`sinks::RecordSink`]
//! one batch at a time through the [`pipeline::Pipeline`], optionally
//! flattened or rebuilt by [`flatten`] on the way. [`format`] picks the
//! file adapters from an extension or token, and [`api`] wires everything
//! to a database connection.

pub mod api;
pub mod cell;
pub mod flatten;
pub mod format;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod sinks;
pub mod sources;

pub use api::{ExportOptions, ImportInput, ImportOptions, export, import};
pub use format::FileFormat;
pub use pipeline::{Pipeline, Transform, TransferSummary};

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;
    use crate::transfer::sinks::testing::{VecSink, written};
    use crate::transfer::sources::SourceOptions;
    use crate::transfer::sources::testing::VecSource;

    #[tokio::test]
    async fn test_nested_json_through_csv_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("people.json");
        let csv_path = dir.path().join("people.csv");
        std::fs::write(
            &json_path,
            r#"[
                {"name": "x", "address": {"city": "London", "country": "GB"}, "age": 30, "tags": ["a", "b"], "active": true},
                {"name": "y", "address": {"city": "Paris"}}
            ]"#,
        )
        .unwrap();

        let separator = ".".to_string();
        let source = FileFormat::Json
            .open_source(&json_path, SourceOptions::default())
            .await
            .unwrap();
        let sink = FileFormat::Csv.create_sink(&csv_path).await.unwrap();
        let exported = Pipeline::new(source, sink)
            .batch_size(1)
            .transform(Transform::Flatten {
                separator: separator.clone(),
            })
            .run()
            .await
            .unwrap();
        assert_eq!(exported.records_written, 2);
        assert!(exported.is_lossless());

        let header = std::fs::read_to_string(&csv_path).unwrap();
        assert!(header.starts_with("name,address.city,address.country,age,tags,active\n"));

        let source = FileFormat::Csv
            .open_source(&csv_path, SourceOptions::default())
            .await
            .unwrap();
        let (sink, log) = VecSink::new();
        Pipeline::new(source, Box::new(sink))
            .transform(Transform::Unflatten { separator })
            .run()
            .await
            .unwrap();

        assert_eq!(
            written(&log),
            vec![
                doc! {
                    "name": "x",
                    "address": { "city": "London", "country": "GB" },
                    "age": 30,
                    "tags": ["a", "b"],
                    "active": true,
                },
                doc! { "name": "y", "address": { "city": "Paris" } },
            ]
        );
    }

    #[tokio::test]
    async fn test_csv_keeps_whole_doubles_and_zero_padded_codes() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("prices.csv");
        let original = vec![doc! { "price": 2.0, "code": "007" }];

        let sink = FileFormat::Csv.create_sink(&csv_path).await.unwrap();
        Pipeline::new(Box::new(VecSource::new(original.clone())), sink)
            .run()
            .await
            .unwrap();

        let source = FileFormat::Csv
            .open_source(&csv_path, SourceOptions::default())
            .await
            .unwrap();
        let (sink, log) = VecSink::new();
        Pipeline::new(source, Box::new(sink)).run().await.unwrap();

        assert_eq!(written(&log), original);
    }
}
