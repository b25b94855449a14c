//! KV key schema. All per-segment reaction/scalar state is addressed by a
//! deterministic, collision-free key composed from `{doc_id, segment_id,
//! kind}` alone, so a document's full per-segment state can be enumerated
//! and deleted without a backend scan.

/// The distinct kinds of per-segment state stored under the `doc:{doc_id}:
/// segment:{kind}:{segment_id}` schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKeyKind {
    Votes,
    Positive,
    Negative,
    Hits,
    HitCount,
    Score,
    ScoreDimensions,
    Weight,
}

impl SegmentKeyKind {
    fn segment(self) -> &'static str {
        match self {
            SegmentKeyKind::Votes => "votes",
            SegmentKeyKind::Positive => "positive",
            SegmentKeyKind::Negative => "negative",
            SegmentKeyKind::Hits => "hits",
            SegmentKeyKind::HitCount => "hit:count",
            SegmentKeyKind::Score => "score",
            SegmentKeyKind::ScoreDimensions => "score:dimensions",
            SegmentKeyKind::Weight => "weight",
        }
    }
}

/// `doc:{doc_id}:segment:{kind}:{segment_id}`
pub fn segment_key(doc_id: &str, kind: SegmentKeyKind, segment_id: &str) -> String {
    format!("doc:{doc_id}:segment:{}:{segment_id}", kind.segment())
}

pub fn votes_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Votes, segment_id)
}

pub fn positive_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Positive, segment_id)
}

pub fn negative_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Negative, segment_id)
}

pub fn hits_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Hits, segment_id)
}

pub fn hit_count_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::HitCount, segment_id)
}

pub fn score_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Score, segment_id)
}

pub fn score_dimensions_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::ScoreDimensions, segment_id)
}

pub fn weight_key(doc_id: &str, segment_id: &str) -> String {
    segment_key(doc_id, SegmentKeyKind::Weight, segment_id)
}

/// `origin:{doc_id}` — the origin document blob key.
pub fn origin_key(doc_id: &str) -> String {
    format!("origin:{doc_id}")
}

/// All per-segment key kinds a segment may have state under, in the order
/// the removal coordinator deletes them.
pub const ALL_SEGMENT_KEY_KINDS: [SegmentKeyKind; 8] = [
    SegmentKeyKind::Votes,
    SegmentKeyKind::Positive,
    SegmentKeyKind::Negative,
    SegmentKeyKind::Hits,
    SegmentKeyKind::HitCount,
    SegmentKeyKind::Score,
    SegmentKeyKind::ScoreDimensions,
    SegmentKeyKind::Weight,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_collision_free_across_kinds() {
        let doc = "d1";
        let seg = "s1";
        let keys: Vec<String> = ALL_SEGMENT_KEY_KINDS
            .iter()
            .map(|k| segment_key(doc, *k, seg))
            .collect();
        let mut deduped = keys.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(keys.len(), deduped.len(), "no two kinds should collide");
    }

    #[test]
    fn keys_are_collision_free_across_segments() {
        let a = votes_key("d1", "s1");
        let b = votes_key("d1", "s2");
        assert_ne!(a, b);
    }

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(votes_key("d1", "s1"), votes_key("d1", "s1"));
        assert_eq!(votes_key("d1", "s1"), "doc:d1:segment:votes:s1");
        assert_eq!(hit_count_key("d1", "s1"), "doc:d1:segment:hit:count:s1");
        assert_eq!(origin_key("d1"), "origin:d1");
    }
}
