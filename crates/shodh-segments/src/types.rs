//! Core data model: segments, reactions, feedback records and the opaque
//! metadata value type they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque, closed algebraic metadata value. Used instead of a dynamically
/// typed `Any` so the core can serialize/deserialize metadata with `serde`
/// while still tolerating mixed-type arrays (e.g. a `parents` list that
/// mixes string and integer entries across ingestion runs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<MetadataValue>),
    Map(HashMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            MetadataValue::Float(f) => Some(*f as i64),
            MetadataValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            MetadataValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, MetadataValue>> {
        match self {
            MetadataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Coerce a list of mixed int/float/string entries into a list of
    /// strings, dropping entries that cannot be coerced. Tolerates both a
    /// homogeneous `[string]` list and a mixed-type list produced by a
    /// backend that round-trips numbers as JSON numbers.
    pub fn safe_string_list(&self) -> Vec<String> {
        match self {
            MetadataValue::List(items) => items
                .iter()
                .filter_map(|v| match v {
                    MetadataValue::Str(s) => Some(s.clone()),
                    MetadataValue::Int(i) => Some(i.to_string()),
                    MetadataValue::Float(f) => Some(f.to_string()),
                    _ => None,
                })
                .collect(),
            MetadataValue::Str(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(v: Vec<T>) -> Self {
        MetadataValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Opaque per-segment metadata mapping.
pub type Metadata = HashMap<String, MetadataValue>;

/// The `{source, scenario, context}` envelope around a user feedback event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegmentReaction {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub context: Metadata,
}

/// Vote polarity. Serialized lower-case to match the KV wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotePolarity {
    Positive,
    Negative,
}

impl VotePolarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotePolarity::Positive => "positive",
            VotePolarity::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// A single vote cast on a segment. Immutable once created; never mutated
/// in place, only appended or removed wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentVote {
    /// The segment this vote is cast on.
    pub id: String,
    pub vote_id: String,
    pub vote: VotePolarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<SegmentReaction>,
}

/// A single hit (view/impression) recorded on a segment. No polarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentHit {
    pub id: String,
    pub hit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<SegmentReaction>,
}

/// A scalar relevance score for a segment, overwritten on update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentScore {
    pub id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<HashMap<String, f64>>,
}

/// A scalar importance weight for a segment, overwritten on update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentWeight {
    pub id: String,
    pub weight: f64,
}

/// A graph node or relationship attached to a segment on search enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphObject {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Metadata,
    pub source_chunks: Vec<String>,
}

/// The atomic retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub collection_id: String,
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub positive: i64,
    #[serde(default)]
    pub negative: i64,
    #[serde(default)]
    pub hit: i64,
    #[serde(default)]
    pub score_dimensions: Option<HashMap<String, f64>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub nodes: Vec<GraphObject>,
    #[serde(default)]
    pub relationships: Vec<GraphObject>,
}

impl Segment {
    pub fn new(id: impl Into<String>, collection_id: impl Into<String>, document_id: impl Into<String>, text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            collection_id: collection_id.into(),
            document_id: document_id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            parents: Vec::new(),
            weight: 0.0,
            score: 0.0,
            positive: 0,
            negative: 0,
            hit: 0,
            score_dimensions: None,
            created_at: now,
            updated_at: now,
            version: 1,
            nodes: Vec::new(),
            relationships: Vec::new(),
        }
    }
}

/// The three backend-local identifiers a logical collection maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIds {
    pub vector: String,
    pub graph: String,
    pub store: String,
}

/// Deterministic, pure mapping from a logical `collection_id` to the
/// `{vector, graph, store}` identifier triple. Never fails: an empty
/// `collection_id` maps to the `default` triple.
pub fn get_collection_ids(collection_id: &str) -> CollectionIds {
    let base = if collection_id.is_empty() {
        "default"
    } else {
        collection_id
    };
    CollectionIds {
        vector: base.to_string(),
        graph: format!("{base}_graph"),
        store: format!("{base}_kv"),
    }
}

/// Decode the `collection_id` a `document_id` belongs to. Document ids are
/// formatted `{collection_id}:{rest}`; on any other shape (or an empty
/// collection segment) the identifier `default` is substituted.
pub fn extract_collection_id_from_doc_id(document_id: &str) -> String {
    match document_id.split_once(':') {
        Some((collection_id, _rest)) if !collection_id.is_empty() => collection_id.to_string(),
        _ => "default".to_string(),
    }
}
