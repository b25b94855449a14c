//! Feedback engine (C4): votes, hits, scores and weights, each with a
//! dual-write strategy between an optional KV store and the vector store's
//! metadata projection.

mod hits;
mod scores;
mod votes;
mod weights;

use crate::backends::{KvAdapter, VectorAdapter};
use crate::config::CoordinatorConfig;
use crate::error::{join_errors, CoreError, CoreResult};
use crate::types::{SegmentReaction, VotePolarity};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub use hits::{HitInput, HitRemoval, UpdateHitsOptions};
pub use scores::{ScoreInput, UpdateScoresOptions};
pub use votes::{UpdateVotesOptions, VoteInput, VoteRemoval};
pub use weights::{UpdateWeightsOptions, WeightInput};

/// Page of reaction history returned by `scroll_votes` / `scroll_hits`.
/// Not a stable cursor under concurrent removals (spec §4.3.2): the
/// cursor is the id of the last item of the previous page, and if that
/// item is removed between pages, the next page silently restarts from
/// offset 0.
#[derive(Debug, Clone)]
pub struct ScrollResult<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// Shared pagination/filter request for `scroll_votes` / `scroll_hits`.
#[derive(Debug, Clone, Default)]
pub struct ScrollOptions {
    pub limit: i64,
    pub cursor: Option<String>,
    pub vote_type: Option<VotePolarity>,
    pub source: Option<String>,
    pub scenario: Option<String>,
}

/// Compute hook for `update_votes`: given the doc id, the segment ids in
/// the batch and the (possibly merged) reaction context, return one raw
/// polarity string per input segment. Strings that don't parse to a known
/// [`VotePolarity`] are logged and skipped rather than failing the call.
#[async_trait]
pub trait VoteComputeHook: Send + Sync {
    async fn compute(
        &self,
        doc_id: &str,
        segment_ids: &[String],
        context: &crate::types::Metadata,
    ) -> anyhow::Result<Vec<String>>;
}

/// Compute hook for `update_scores` / `update_weights`: given the doc id
/// and segment ids, return one freshly computed scalar per input segment.
#[async_trait]
pub trait ScalarComputeHook: Send + Sync {
    async fn compute(&self, doc_id: &str, segment_ids: &[String]) -> anyhow::Result<Vec<f64>>;
}

/// The feedback engine (C4): owns the vector adapter (always present) and
/// an optional KV adapter. When KV is configured it is the system of
/// record for reaction history; otherwise the vector store's metadata
/// projection is the only source of truth.
pub struct FeedbackEngine {
    pub(crate) vector: Arc<dyn VectorAdapter>,
    pub(crate) kv: Option<Arc<dyn KvAdapter>>,
    pub(crate) config: CoordinatorConfig,
}

impl FeedbackEngine {
    pub fn new(vector: Arc<dyn VectorAdapter>, kv: Option<Arc<dyn KvAdapter>>, config: CoordinatorConfig) -> Self {
        Self { vector, kv, config }
    }

    pub fn has_kv(&self) -> bool {
        self.kv.is_some()
    }
}

/// Run two branches concurrently (the dual-write idiom, C4 §4.3.1): both
/// succeeding is the common case; one failing degrades to a logged
/// warning and an overall success; both failing is a combined error.
pub(crate) async fn dual_write<KvFut, VecFut>(
    segment_id: &str,
    operation: &str,
    kv_branch: KvFut,
    vector_branch: VecFut,
) -> CoreResult<()>
where
    KvFut: Future<Output = anyhow::Result<()>>,
    VecFut: Future<Output = anyhow::Result<()>>,
{
    let (kv_result, vector_result) = tokio::join!(kv_branch, vector_branch);
    match (kv_result, vector_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(e)) => {
            tracing::warn!(segment_id, operation, error = %e, "vector branch failed, kv branch succeeded");
            Ok(())
        }
        (Err(e), Ok(())) => {
            tracing::warn!(segment_id, operation, error = %e, "kv branch failed, vector branch succeeded");
            Ok(())
        }
        (Err(e1), Err(e2)) => Err(CoreError::BackendFailure(join_errors(vec![e1, e2]))),
    }
}

/// Apply `default_reaction` to any input missing one.
pub(crate) fn apply_default_reaction(
    reaction: Option<SegmentReaction>,
    default_reaction: &Option<SegmentReaction>,
) -> Option<SegmentReaction> {
    reaction.or_else(|| default_reaction.clone())
}

/// Merge per-segment reaction contexts into one map, used as the context
/// argument passed to compute hooks (last-write-wins per key).
pub(crate) fn merged_context(reactions: &[Option<SegmentReaction>]) -> crate::types::Metadata {
    let mut merged = crate::types::Metadata::new();
    for reaction in reactions.iter().flatten() {
        for (k, v) in &reaction.context {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Generic read-filter-rewrite-adjust-counter removal used by both
/// `remove_votes` and `remove_hits` (spec §4.3.2, `RemoveVotes`/`RemoveHits`).
///
/// `id_of` extracts the removable id (`vote_id` / `hit_id`) from a decoded
/// list entry; `counter_keys` returns the (possibly several) counter keys
/// whose value must be decremented by the count actually removed for that
/// entry (votes have two, keyed by polarity; hits have one).
pub(crate) async fn remove_from_list<T, IdOf, CounterKeysOf>(
    kv: &dyn KvAdapter,
    list_key: &str,
    removal_ids: &[String],
    id_of: IdOf,
    counter_keys_of: CounterKeysOf,
) -> anyhow::Result<usize>
where
    T: serde::de::DeserializeOwned,
    IdOf: Fn(&T) -> String,
    CounterKeysOf: Fn(&T) -> Vec<String>,
{
    let raw = kv.array_all(list_key).await?;
    let mut kept_raw = Vec::with_capacity(raw.len());
    let mut removed_counter_deltas: HashMap<String, i64> = HashMap::new();
    let mut removed = 0usize;

    for entry in raw {
        let decoded: T = match serde_json::from_str(&entry) {
            Ok(v) => v,
            Err(_) => {
                // Keep entries we can't decode rather than silently dropping data.
                kept_raw.push(entry);
                continue;
            }
        };
        if removal_ids.iter().any(|id| id == &id_of(&decoded)) {
            removed += 1;
            for key in counter_keys_of(&decoded) {
                *removed_counter_deltas.entry(key).or_insert(0) += 1;
            }
        } else {
            kept_raw.push(entry);
        }
    }

    if removed == 0 {
        return Ok(0);
    }

    kv.del(list_key).await?;
    if !kept_raw.is_empty() {
        kv.push(list_key, &kept_raw).await?;
    }

    for (counter_key, delta) in removed_counter_deltas {
        let current: i64 = kv
            .get(&counter_key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let new_value = (current - delta).max(0);
        if new_value == 0 {
            kv.del(&counter_key).await?;
        } else {
            kv.set(&counter_key, &new_value.to_string(), 0).await?;
        }
    }

    Ok(removed)
}
