use super::{apply_default_reaction, dual_write, remove_from_list, FeedbackEngine, ScrollOptions, ScrollResult};
use crate::error::{CoreError, CoreResult};
use crate::keys::{hit_count_key, hits_key};
use crate::metadata_batch::{update_segment_metadata_batch, MetadataAssignment};
use crate::types::{get_collection_ids, extract_collection_id_from_doc_id, MetadataValue, SegmentHit, SegmentReaction};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HitInput {
    pub segment_id: String,
    pub hit_id: Option<String>,
    pub reaction: Option<SegmentReaction>,
}

impl HitInput {
    pub fn new(segment_id: impl Into<String>) -> Self {
        Self {
            segment_id: segment_id.into(),
            hit_id: None,
            reaction: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HitRemoval {
    pub segment_id: String,
    pub hit_id: String,
}

#[derive(Default, Clone)]
pub struct UpdateHitsOptions {
    pub default_reaction: Option<SegmentReaction>,
}

impl FeedbackEngine {
    /// `UpdateHits(ctx, docID, segments, options?)` — spec §4.3.2. The
    /// vector-side projection is the list length (`ArrayLen`), read back
    /// after `Push`, not an incremented counter, to preserve
    /// `vector_meta["hit"] == len(KV hits list)`.
    pub async fn update_hits(
        &self,
        doc_id: &str,
        mut inputs: Vec<HitInput>,
        options: Option<UpdateHitsOptions>,
    ) -> CoreResult<usize> {
        if inputs.is_empty() {
            return Ok(0);
        }
        if doc_id.is_empty() {
            return Err(CoreError::invalid_argument("doc_id must not be empty"));
        }

        let options = options.unwrap_or_default();
        for input in &mut inputs {
            input.reaction = apply_default_reaction(input.reaction.take(), &options.default_reaction);
            if input.hit_id.is_none() {
                input.hit_id = Some(Uuid::new_v4().to_string());
            }
        }

        let hits: Vec<SegmentHit> = inputs
            .iter()
            .map(|i| SegmentHit {
                id: i.segment_id.clone(),
                hit_id: i.hit_id.clone().unwrap(),
                reaction: i.reaction.clone(),
            })
            .collect();

        match &self.kv {
            None => {
                // Without KV, the hit counter lives only in vector metadata;
                // increment it directly by reading the current value.
                let collection = get_collection_ids(&extract_collection_id_from_doc_id(doc_id)).vector;
                let mut assignments = Vec::with_capacity(hits.len());
                for hit in &hits {
                    let current = self
                        .vector
                        .get_metadata(&collection, &hit.id)
                        .await
                        .ok()
                        .flatten()
                        .and_then(|m| m.get("hit").and_then(|v| v.as_i64()))
                        .unwrap_or(0);
                    assignments.push(MetadataAssignment {
                        segment_id: hit.id.clone(),
                        metadata_key: "hit".to_string(),
                        value: Some(MetadataValue::Int(current + 1)),
                    });
                }
                update_segment_metadata_batch(self.vector.as_ref(), doc_id, assignments).await?;
            }
            Some(kv) => {
                let kv = Arc::clone(kv);
                let hits_for_kv = hits.clone();
                let doc_id_owned = doc_id.to_string();
                let vector = Arc::clone(&self.vector);

                let kv_branch = async move {
                    for hit in &hits_for_kv {
                        let key = hits_key(&doc_id_owned, &hit.id);
                        let serialized = serde_json::to_string(hit)?;
                        kv.push(&key, std::slice::from_ref(&serialized)).await?;
                        let count = kv.array_len(&key).await?;
                        kv.set(&hit_count_key(&doc_id_owned, &hit.id), &count.to_string(), 0).await?;
                    }
                    Ok(())
                };

                let hits_for_vector = hits.clone();
                let doc_id_owned = doc_id.to_string();
                let kv_for_count = Arc::clone(self.kv.as_ref().unwrap());
                let vector_branch = async move {
                    let mut assignments = Vec::with_capacity(hits_for_vector.len());
                    for hit in &hits_for_vector {
                        // ArrayLen after Push, matching the invariant that the
                        // vector projection mirrors KV list length, not an
                        // independently incremented counter.
                        let key = hits_key(&doc_id_owned, &hit.id);
                        let count = kv_for_count.array_len(&key).await?;
                        assignments.push(MetadataAssignment {
                            segment_id: hit.id.clone(),
                            metadata_key: "hit".to_string(),
                            value: Some(MetadataValue::Int(count)),
                        });
                    }
                    update_segment_metadata_batch(vector.as_ref(), &doc_id_owned, assignments)
                        .await
                        .map_err(anyhow::Error::from)
                };

                dual_write(doc_id, "update_hits", kv_branch, vector_branch).await?;
            }
        }

        Ok(inputs.len())
    }

    /// `RemoveHits(ctx, docID, removals)` — spec §4.3.2.
    pub async fn remove_hits(&self, doc_id: &str, removals: Vec<HitRemoval>) -> CoreResult<usize> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        if removals.is_empty() {
            return Ok(0);
        }

        let mut by_segment: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for removal in removals {
            by_segment.entry(removal.segment_id).or_default().push(removal.hit_id);
        }

        let mut total_removed = 0usize;
        for (segment_id, hit_ids) in by_segment {
            let list_key = hits_key(doc_id, &segment_id);
            let counter_key = hit_count_key(doc_id, &segment_id);
            let removed = remove_from_list::<SegmentHit, _, _>(
                kv.as_ref(),
                &list_key,
                &hit_ids,
                |h| h.hit_id.clone(),
                |_| vec![counter_key.clone()],
            )
            .await
            .map_err(CoreError::BackendFailure)?;
            total_removed += removed;

            if removed > 0 {
                let remaining = kv.array_len(&list_key).await.map_err(CoreError::BackendFailure)?;
                let assignments = vec![MetadataAssignment {
                    segment_id: segment_id.clone(),
                    metadata_key: "hit".to_string(),
                    value: Some(MetadataValue::Int(remaining)),
                }];
                if let Err(e) = update_segment_metadata_batch(self.vector.as_ref(), doc_id, assignments).await {
                    tracing::warn!(segment_id, error = %e, "failed to rewrite hit counter projection after removal");
                }
            }
        }
        Ok(total_removed)
    }

    /// `RemoveHitsBySegmentID(ctx, docID, segmentID)` — spec §4.3.2.
    pub async fn remove_hits_by_segment_id(&self, doc_id: &str, segment_id: &str) -> CoreResult<usize> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        let list_key = hits_key(doc_id, segment_id);
        let count = kv.array_len(&list_key).await.map_err(CoreError::BackendFailure)? as usize;

        kv.del(&list_key).await.map_err(CoreError::BackendFailure)?;
        kv.del(&hit_count_key(doc_id, segment_id)).await.map_err(CoreError::BackendFailure)?;

        let assignments = vec![MetadataAssignment {
            segment_id: segment_id.to_string(),
            metadata_key: "hit".to_string(),
            value: Some(MetadataValue::Int(0)),
        }];
        if let Err(e) = update_segment_metadata_batch(self.vector.as_ref(), doc_id, assignments).await {
            tracing::warn!(segment_id, error = %e, "failed to zero hit counter projection after bulk removal");
        }
        Ok(count)
    }

    /// `ScrollHits(ctx, docID, opts)` — spec §4.3.2.
    pub async fn scroll_hits(
        &self,
        doc_id: &str,
        segment_id: &str,
        opts: ScrollOptions,
    ) -> CoreResult<ScrollResult<SegmentHit>> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        let list_key = hits_key(doc_id, segment_id);
        let raw = kv.array_all(&list_key).await.map_err(CoreError::BackendFailure)?;

        let mut all: Vec<SegmentHit> = raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect();

        if let Some(source) = &opts.source {
            all.retain(|h| h.reaction.as_ref().map(|r| &r.source) == Some(source));
        }
        if let Some(scenario) = &opts.scenario {
            all.retain(|h| h.reaction.as_ref().map(|r| &r.scenario) == Some(scenario));
        }

        let total = all.len();
        let page_size = self.config.clamp_page_size(opts.limit);

        let start = match &opts.cursor {
            None => 0,
            Some(cursor) => all
                .iter()
                .position(|h| &h.hit_id == cursor)
                .map(|idx| idx + 1)
                .unwrap_or(0),
        };

        let end = (start + page_size).min(total);
        let items: Vec<SegmentHit> = if start >= total {
            Vec::new()
        } else {
            all[start..end].to_vec()
        };
        let has_more = end < total;
        let next_cursor = items.last().map(|h| h.hit_id.clone());

        Ok(ScrollResult {
            items,
            total,
            has_more,
            next_cursor,
        })
    }

    /// `GetHit(ctx, docID, segmentID, hitID)` — point lookup, spec §4.3.2.
    pub async fn get_hit(&self, doc_id: &str, segment_id: &str, hit_id: &str) -> CoreResult<SegmentHit> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        let list_key = hits_key(doc_id, segment_id);
        let raw = kv.array_all(&list_key).await.map_err(CoreError::BackendFailure)?;
        raw.iter()
            .filter_map(|s| serde_json::from_str::<SegmentHit>(s).ok())
            .find(|h| h.hit_id == hit_id)
            .ok_or_else(|| CoreError::not_found("hit", hit_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryKvAdapter, MemoryVectorAdapter};
    use crate::backends::vector::VectorDocument;
    use crate::config::CoordinatorConfig;

    fn engine_with_kv() -> FeedbackEngine {
        FeedbackEngine::new(
            Arc::new(MemoryVectorAdapter::new()),
            Some(Arc::new(MemoryKvAdapter::new())),
            CoordinatorConfig::default(),
        )
    }

    async fn seed_segment(engine: &FeedbackEngine, segment_id: &str) {
        let mut doc = VectorDocument::default();
        doc.id = segment_id.to_string();
        engine.vector.add_documents("default", vec![doc], true, 10).await.unwrap();
    }

    #[tokio::test]
    async fn hit_count_is_derived_from_list_length() {
        let engine = engine_with_kv();
        seed_segment(&engine, "s1").await;
        for _ in 0..5 {
            engine.update_hits("d1", vec![HitInput::new("s1")], None).await.unwrap();
        }
        let meta = engine.vector.get_metadata("default", "s1").await.unwrap().unwrap();
        assert_eq!(meta.get("hit").and_then(|v| v.as_i64()), Some(5));
    }

    #[tokio::test]
    async fn remove_hits_drains_both_list_and_counter() {
        let engine = engine_with_kv();
        seed_segment(&engine, "s1").await;
        engine.update_hits("d1", vec![HitInput::new("s1")], None).await.unwrap();
        let hit_id = {
            let kv = engine.kv.as_ref().unwrap();
            let raw = kv.array_all(&hits_key("d1", "s1")).await.unwrap();
            let hit: SegmentHit = serde_json::from_str(&raw[0]).unwrap();
            hit.hit_id
        };

        engine
            .remove_hits("d1", vec![HitRemoval { segment_id: "s1".into(), hit_id }])
            .await
            .unwrap();

        let kv = engine.kv.as_ref().unwrap();
        assert!(!kv.has(&hits_key("d1", "s1")).await.unwrap());
        assert!(!kv.has(&hit_count_key("d1", "s1")).await.unwrap());
    }

    #[tokio::test]
    async fn get_hit_not_found_for_unknown_id() {
        let engine = engine_with_kv();
        seed_segment(&engine, "s1").await;
        engine.update_hits("d1", vec![HitInput::new("s1")], None).await.unwrap();
        let err = engine.get_hit("d1", "s1", "unknown-hit-id").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
