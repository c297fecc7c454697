/// Arrow schema and batch conversion for the applied-changes manifest.
pub mod manifest {
    use std::sync::Arc;

    use arrow::array::{
        ListBuilder, RecordBatch, StringArray, TimestampNanosecondArray, UInt32Array,
        UInt64Array, UInt64Builder,
    };
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

    use crate::ModelError;
    use crate::manifest::Manifest;

    /// One row per applied change.
    pub fn manifest_schema() -> Schema {
        Schema::new(vec![
            Field::new("act_id", DataType::Utf8, false),
            Field::new("base_version", DataType::UInt32, false),
            Field::new("new_version", DataType::UInt32, false),
            Field::new("changeset_id", DataType::Utf8, false),
            Field::new("change_id", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("range_start", DataType::UInt64, false),
            Field::new("range_end", DataType::UInt64, false),
            Field::new("section_path", DataType::Utf8, false),
            Field::new("citation", DataType::Utf8, false),
            Field::new("reviewer_id", DataType::Utf8, false),
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "new_line_ids",
                DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
                false,
            ),
        ])
    }

    /// Convert a manifest into a single batch matching [`manifest_schema`].
    pub fn manifest_to_record_batch(manifest: &Manifest) -> Result<RecordBatch, ModelError> {
        let n = manifest.entries.len();
        let entries = &manifest.entries;

        let mut new_ids = ListBuilder::new(UInt64Builder::new());
        for e in entries {
            for id in &e.new_line_ids {
                new_ids.values().append_value(id.0);
            }
            new_ids.append(true);
        }

        let batch = RecordBatch::try_new(
            Arc::new(manifest_schema()),
            vec![
                Arc::new(StringArray::from(vec![manifest.act_id.as_str(); n])),
                Arc::new(UInt32Array::from(vec![manifest.base_version; n])),
                Arc::new(UInt32Array::from(vec![manifest.new_version; n])),
                Arc::new(StringArray::from(vec![manifest.changeset_id.as_str(); n])),
                Arc::new(StringArray::from_iter_values(
                    entries.iter().map(|e| e.change_id.0.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    entries.iter().map(|e| e.kind.as_str()),
                )),
                Arc::new(UInt64Array::from_iter_values(
                    entries.iter().map(|e| e.resolved_range.start.0),
                )),
                Arc::new(UInt64Array::from_iter_values(
                    entries.iter().map(|e| e.resolved_range.end.0),
                )),
                Arc::new(StringArray::from_iter_values(
                    entries.iter().map(|e| e.section_path.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    entries.iter().map(|e| e.citation.as_str()),
                )),
                Arc::new(StringArray::from_iter_values(
                    entries.iter().map(|e| e.reviewer_id.as_str()),
                )),
                Arc::new(
                    TimestampNanosecondArray::from_iter_values(
                        entries
                            .iter()
                            .map(|e| e.timestamp.timestamp_nanos_opt().unwrap_or_default()),
                    )
                    .with_timezone("UTC"),
                ),
                Arc::new(new_ids.finish()),
            ],
        )?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, ListArray, StringArray};
    use chrono::Utc;

    use super::manifest::*;
    use crate::change::ChangeKind;
    use crate::document::{LineId, LineRange};
    use crate::manifest::{AppliedChange, Manifest};

    fn sample() -> Manifest {
        Manifest {
            act_id: "act-1".into(),
            base_version: 1,
            new_version: 2,
            changeset_id: "amd@act-1v1".into(),
            entries: vec![
                AppliedChange {
                    change_id: "amd@act-1v1#001".into(),
                    kind: ChangeKind::Insertion,
                    resolved_range: LineRange::new(LineId(4), LineId(6)),
                    section_path: "15(2)".into(),
                    citation: "After clause (b), insert '(c) ...'".into(),
                    reviewer_id: "alice".into(),
                    timestamp: Utc::now(),
                    new_line_ids: vec![LineId(8)],
                },
                AppliedChange {
                    change_id: "amd@act-1v1#000".into(),
                    kind: ChangeKind::Substitution,
                    resolved_range: LineRange::single(LineId(4)),
                    section_path: "15(2)".into(),
                    citation: "for the words 'thirty days', substitute 'forty-five days'".into(),
                    reviewer_id: "bob".into(),
                    timestamp: Utc::now(),
                    new_line_ids: vec![],
                },
            ],
        }
    }

    #[test]
    fn manifest_schema_has_expected_fields() {
        let schema = manifest_schema();
        assert_eq!(schema.fields().len(), 13);
        assert!(schema.field_with_name("citation").is_ok());
        assert!(schema.field_with_name("new_line_ids").is_ok());
    }

    #[test]
    fn batch_matches_manifest() {
        let batch = manifest_to_record_batch(&sample()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let kinds = batch
            .column_by_name("kind")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(kinds.value(0), "insertion");
        let ids = batch
            .column_by_name("new_line_ids")
            .unwrap()
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        assert_eq!(ids.value(0).len(), 1);
        assert_eq!(ids.value(1).len(), 0);
    }
}
