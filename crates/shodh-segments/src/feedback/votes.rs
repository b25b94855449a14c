use super::{apply_default_reaction, dual_write, merged_context, remove_from_list, FeedbackEngine, ScrollOptions, ScrollResult, VoteComputeHook};
use crate::error::{CoreError, CoreResult};
use crate::keys::{negative_key, positive_key, votes_key};
use crate::metadata_batch::{update_segment_metadata_batch, MetadataAssignment};
use crate::types::{MetadataValue, SegmentReaction, SegmentVote, VotePolarity};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VoteInput {
    pub segment_id: String,
    pub vote_id: Option<String>,
    pub vote: Option<VotePolarity>,
    pub reaction: Option<SegmentReaction>,
}

impl VoteInput {
    pub fn new(segment_id: impl Into<String>, vote: VotePolarity) -> Self {
        Self {
            segment_id: segment_id.into(),
            vote_id: None,
            vote: Some(vote),
            reaction: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoteRemoval {
    pub segment_id: String,
    pub vote_id: String,
}

#[derive(Default, Clone)]
pub struct UpdateVotesOptions {
    pub default_reaction: Option<SegmentReaction>,
    pub compute: Option<Arc<dyn VoteComputeHook>>,
}

impl FeedbackEngine {
    /// `UpdateVotes(ctx, docID, segments, options?)` — see spec §4.3.2.
    pub async fn update_votes(
        &self,
        doc_id: &str,
        mut inputs: Vec<VoteInput>,
        options: Option<UpdateVotesOptions>,
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
            if input.vote_id.is_none() {
                input.vote_id = Some(Uuid::new_v4().to_string());
            }
        }

        let compute = options.compute.as_ref().filter(|_| self.config.features.enable_compute_hooks);
        let resolved_votes: Vec<Option<VotePolarity>> = if let Some(hook) = compute {
            let segment_ids: Vec<String> = inputs.iter().map(|i| i.segment_id.clone()).collect();
            let context = merged_context(&inputs.iter().map(|i| i.reaction.clone()).collect::<Vec<_>>());
            let raw = hook
                .compute(doc_id, &segment_ids, &context)
                .await
                .map_err(CoreError::BackendFailure)?;
            if raw.len() != inputs.len() {
                return Err(CoreError::invalid_argument(format!(
                    "compute hook returned {} polarities for {} inputs",
                    raw.len(),
                    inputs.len()
                )));
            }
            raw.into_iter()
                .zip(inputs.iter())
                .map(|(polarity, input)| {
                    let parsed = VotePolarity::parse(&polarity);
                    if parsed.is_none() {
                        tracing::warn!(segment_id = %input.segment_id, polarity, "unknown vote polarity, skipping");
                    }
                    parsed
                })
                .collect()
        } else {
            let mut out = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let Some(vote) = input.vote else {
                    return Err(CoreError::invalid_argument(format!(
                        "vote is required for segment {} when no compute hook is configured",
                        input.segment_id
                    )));
                };
                out.push(Some(vote));
            }
            out
        };

        let votes: Vec<SegmentVote> = inputs
            .iter()
            .zip(resolved_votes.iter())
            .filter_map(|(input, vote)| {
                vote.map(|v| SegmentVote {
                    id: input.segment_id.clone(),
                    vote_id: input.vote_id.clone().unwrap(),
                    vote: v,
                    reaction: input.reaction.clone(),
                })
            })
            .collect();

        let metadata_assignments = |votes: &[SegmentVote]| -> Vec<MetadataAssignment> {
            votes
                .iter()
                .map(|v| MetadataAssignment {
                    segment_id: v.id.clone(),
                    metadata_key: "vote".to_string(),
                    value: Some(MetadataValue::Str(v.vote.as_str().to_string())),
                })
                .collect()
        };

        match &self.kv {
            None => {
                update_segment_metadata_batch(self.vector.as_ref(), doc_id, metadata_assignments(&votes)).await?;
            }
            Some(kv) => {
                let kv = Arc::clone(kv);
                let votes_for_kv = votes.clone();
                let doc_id_owned = doc_id.to_string();
                let kv_branch = async move {
                    for vote in &votes_for_kv {
                        let key = votes_key(&doc_id_owned, &vote.id);
                        let serialized = serde_json::to_string(vote)?;
                        kv.push(&key, std::slice::from_ref(&serialized)).await?;

                        let counter_key = match vote.vote {
                            VotePolarity::Positive => positive_key(&doc_id_owned, &vote.id),
                            VotePolarity::Negative => negative_key(&doc_id_owned, &vote.id),
                        };
                        let current: i64 = kv
                            .get(&counter_key)
                            .await?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        kv.set(&counter_key, &(current + 1).to_string(), 0).await?;
                    }
                    Ok(())
                };

                let vector = Arc::clone(&self.vector);
                let mut assignments = metadata_assignments(&votes);
                let mut segment_ids: Vec<String> = votes.iter().map(|v| v.id.clone()).collect();
                segment_ids.sort();
                segment_ids.dedup();
                let doc_id_owned = doc_id.to_string();
                let kv_for_counters = Arc::clone(self.kv.as_ref().unwrap());
                let vector_branch = async move {
                    // Rederive positive/negative from the KV counters rather than
                    // trusting the caller's polarity alone, mirroring update_hits's
                    // counter-read-after-push.
                    for segment_id in segment_ids {
                        let positive: i64 = kv_for_counters
                            .get(&positive_key(&doc_id_owned, &segment_id))
                            .await?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        let negative: i64 = kv_for_counters
                            .get(&negative_key(&doc_id_owned, &segment_id))
                            .await?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        assignments.push(MetadataAssignment {
                            segment_id: segment_id.clone(),
                            metadata_key: "positive".to_string(),
                            value: Some(MetadataValue::Int(positive)),
                        });
                        assignments.push(MetadataAssignment {
                            segment_id,
                            metadata_key: "negative".to_string(),
                            value: Some(MetadataValue::Int(negative)),
                        });
                    }
                    update_segment_metadata_batch(vector.as_ref(), &doc_id_owned, assignments)
                        .await
                        .map_err(anyhow::Error::from)
                };

                dual_write(doc_id, "update_votes", kv_branch, vector_branch).await?;
            }
        }

        Ok(inputs.len())
    }

    /// `RemoveVotes(ctx, docID, removals)` — spec §4.3.2.
    pub async fn remove_votes(&self, doc_id: &str, removals: Vec<VoteRemoval>) -> CoreResult<usize> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        if removals.is_empty() {
            return Ok(0);
        }

        let mut by_segment: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for removal in removals {
            by_segment.entry(removal.segment_id).or_default().push(removal.vote_id);
        }

        let mut total_removed = 0usize;
        for (segment_id, vote_ids) in by_segment {
            let list_key = votes_key(doc_id, &segment_id);
            let removed = remove_from_list::<SegmentVote, _, _>(
                kv.as_ref(),
                &list_key,
                &vote_ids,
                |v| v.vote_id.clone(),
                |v| {
                    vec![match v.vote {
                        VotePolarity::Positive => positive_key(doc_id, &segment_id),
                        VotePolarity::Negative => negative_key(doc_id, &segment_id),
                    }]
                },
            )
            .await
            .map_err(CoreError::BackendFailure)?;
            total_removed += removed;

            if removed > 0 {
                let positive: i64 = kv
                    .get(&positive_key(doc_id, &segment_id))
                    .await
                    .map_err(CoreError::BackendFailure)?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let negative: i64 = kv
                    .get(&negative_key(doc_id, &segment_id))
                    .await
                    .map_err(CoreError::BackendFailure)?
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let assignments = vec![
                    MetadataAssignment {
                        segment_id: segment_id.clone(),
                        metadata_key: "positive".to_string(),
                        value: Some(MetadataValue::Int(positive)),
                    },
                    MetadataAssignment {
                        segment_id: segment_id.clone(),
                        metadata_key: "negative".to_string(),
                        value: Some(MetadataValue::Int(negative)),
                    },
                ];
                if let Err(e) = update_segment_metadata_batch(self.vector.as_ref(), doc_id, assignments).await {
                    tracing::warn!(segment_id, error = %e, "failed to rewrite vote counter projection after removal");
                }
            }
        }
        Ok(total_removed)
    }

    /// `RemoveVotesBySegmentID(ctx, docID, segmentID)` — spec §4.3.2.
    pub async fn remove_votes_by_segment_id(&self, doc_id: &str, segment_id: &str) -> CoreResult<usize> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        let list_key = votes_key(doc_id, segment_id);
        let count = kv
            .array_len(&list_key)
            .await
            .map_err(CoreError::BackendFailure)? as usize;

        kv.del(&list_key).await.map_err(CoreError::BackendFailure)?;
        kv.del(&positive_key(doc_id, segment_id)).await.map_err(CoreError::BackendFailure)?;
        kv.del(&negative_key(doc_id, segment_id)).await.map_err(CoreError::BackendFailure)?;

        let assignments = vec![
            MetadataAssignment {
                segment_id: segment_id.to_string(),
                metadata_key: "positive".to_string(),
                value: Some(MetadataValue::Int(0)),
            },
            MetadataAssignment {
                segment_id: segment_id.to_string(),
                metadata_key: "negative".to_string(),
                value: Some(MetadataValue::Int(0)),
            },
        ];
        if let Err(e) = update_segment_metadata_batch(self.vector.as_ref(), doc_id, assignments).await {
            tracing::warn!(segment_id, error = %e, "failed to zero vote counter projection after bulk removal");
        }
        Ok(count)
    }

    /// `ScrollVotes(ctx, docID, opts)` — spec §4.3.2.
    pub async fn scroll_votes(
        &self,
        doc_id: &str,
        segment_id: &str,
        opts: ScrollOptions,
    ) -> CoreResult<ScrollResult<SegmentVote>> {
        let Some(kv) = &self.kv else {
            return Err(CoreError::not_configured("kv store"));
        };
        let list_key = votes_key(doc_id, segment_id);
        let raw = kv.array_all(&list_key).await.map_err(CoreError::BackendFailure)?;

        let mut all: Vec<SegmentVote> = raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect();

        if let Some(vote_type) = opts.vote_type {
            all.retain(|v| v.vote == vote_type);
        }
        if let Some(source) = &opts.source {
            all.retain(|v| v.reaction.as_ref().map(|r| &r.source) == Some(source));
        }
        if let Some(scenario) = &opts.scenario {
            all.retain(|v| v.reaction.as_ref().map(|r| &r.scenario) == Some(scenario));
        }

        let total = all.len();
        let page_size = self.config.clamp_page_size(opts.limit);

        let start = match &opts.cursor {
            None => 0,
            Some(cursor) => all
                .iter()
                .position(|v| &v.vote_id == cursor)
                .map(|idx| idx + 1)
                .unwrap_or(0),
        };

        let end = (start + page_size).min(total);
        let items: Vec<SegmentVote> = if start >= total {
            Vec::new()
        } else {
            all[start..end].to_vec()
        };
        let has_more = end < total;
        let next_cursor = items.last().map(|v| v.vote_id.clone());

        Ok(ScrollResult {
            items,
            total,
            has_more,
            next_cursor,
        })
    }
}
