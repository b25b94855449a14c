//! Metadata batch updater (C3): groups per-segment metadata mutations into
//! a single vector-side upsert.

use crate::backends::{MetadataUpdate, VectorAdapter};
use crate::error::{CoreError, CoreResult};
use crate::types::{get_collection_ids, Metadata};
use std::collections::HashMap;

/// One `{segment_id, metadata_key, value}` assignment. `value = None`
/// signals removal of `metadata_key` from the segment's metadata.
#[derive(Debug, Clone)]
pub struct MetadataAssignment {
    pub segment_id: String,
    pub metadata_key: String,
    pub value: Option<crate::types::MetadataValue>,
}

/// `UpdateSegmentMetadataBatch(ctx, docID, updates)`.
///
/// Resolves the vector collection from `doc_id`, groups `updates` by
/// `segment_id` merging multiple key assignments into one metadata map per
/// segment, and issues a single batched `update_metadata` call. Fails with
/// `NotFound` if the vector collection does not exist.
pub async fn update_segment_metadata_batch(
    vector: &dyn VectorAdapter,
    doc_id: &str,
    updates: Vec<MetadataAssignment>,
) -> CoreResult<()> {
    if updates.is_empty() {
        return Ok(());
    }

    let collection = get_collection_ids(&crate::types::extract_collection_id_from_doc_id(doc_id)).vector;

    if !vector
        .collection_exists(&collection)
        .await
        .map_err(CoreError::BackendFailure)?
    {
        return Err(CoreError::not_found("vector collection", collection));
    }

    let mut grouped: HashMap<String, Metadata> = HashMap::new();
    let mut mask: Vec<String> = Vec::new();
    for update in updates {
        let entry = grouped.entry(update.segment_id).or_default();
        let value = update.value.unwrap_or(crate::types::MetadataValue::Null);
        entry.insert(update.metadata_key.clone(), value);
        if !mask.contains(&update.metadata_key) {
            mask.push(update.metadata_key);
        }
    }

    let batch: Vec<MetadataUpdate> = grouped
        .into_iter()
        .map(|(segment_id, metadata)| MetadataUpdate { segment_id, metadata })
        .collect();

    vector
        .update_metadata(&collection, batch, &mask)
        .await
        .map_err(CoreError::BackendFailure)?;

    tracing::debug!(doc_id, collection = %collection, "applied metadata batch update");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryVectorAdapter;
    use crate::backends::vector::VectorDocument;
    use crate::types::MetadataValue;

    async fn seeded_adapter() -> MemoryVectorAdapter {
        let adapter = MemoryVectorAdapter::new();
        let mut doc = VectorDocument::default();
        doc.id = "s1".into();
        adapter.add_documents("default", vec![doc], true, 10).await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn merges_multiple_keys_for_same_segment() {
        let adapter = seeded_adapter().await;
        update_segment_metadata_batch(
            &adapter,
            "d1",
            vec![
                MetadataAssignment {
                    segment_id: "s1".into(),
                    metadata_key: "vote".into(),
                    value: Some(MetadataValue::Str("positive".into())),
                },
                MetadataAssignment {
                    segment_id: "s1".into(),
                    metadata_key: "hit".into(),
                    value: Some(MetadataValue::Int(3)),
                },
            ],
        )
        .await
        .unwrap();

        let meta = adapter.get_metadata("default", "s1").await.unwrap().unwrap();
        assert_eq!(meta.get("vote").and_then(|v| v.as_str()), Some("positive"));
        assert_eq!(meta.get("hit").and_then(|v| v.as_i64()), Some(3));
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let adapter = MemoryVectorAdapter::new();
        let err = update_segment_metadata_batch(
            &adapter,
            "missing-doc",
            vec![MetadataAssignment {
                segment_id: "s1".into(),
                metadata_key: "vote".into(),
                value: Some(MetadataValue::Str("positive".into())),
            }],
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn empty_updates_is_a_noop() {
        let adapter = MemoryVectorAdapter::new();
        update_segment_metadata_batch(&adapter, "d1", vec![]).await.unwrap();
    }

    #[tokio::test]
    async fn null_value_removes_metadata_key() {
        let adapter = seeded_adapter().await;
        update_segment_metadata_batch(
            &adapter,
            "d1",
            vec![MetadataAssignment {
                segment_id: "s1".into(),
                metadata_key: "vote".into(),
                value: Some(MetadataValue::Str("positive".into())),
            }],
        )
        .await
        .unwrap();
        update_segment_metadata_batch(
            &adapter,
            "d1",
            vec![MetadataAssignment {
                segment_id: "s1".into(),
                metadata_key: "vote".into(),
                value: None,
            }],
        )
        .await
        .unwrap();
        let meta = adapter.get_metadata("default", "s1").await.unwrap().unwrap();
        assert!(!meta.contains_key("vote"));
    }
}
