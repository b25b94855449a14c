//! Backend adapter traits and their in-memory reference implementations.
//!
//! Production code plugs in real clients (a vector DB, a graph DB, a KV
//! store) behind these traits; the `memory` module ships zero-dependency
//! stand-ins used by the crate's own tests and suitable as a starting
//! point for small deployments.

pub mod collaborators;
pub mod graph;
pub mod kv;
pub mod memory;
pub mod vector;

pub use collaborators::{Embedder, Extractor, ExtractionResult, Reranker};
pub use graph::{GraphAdapter, GraphQueryResult, GraphRelationship, GraphReturnType, GraphStats};
pub use kv::KvAdapter;
pub use vector::{
    DeleteSelector, GetDocumentsOptions, ListOptions, MetadataUpdate, SearchSimilarOptions,
    VectorAdapter, VectorDocument, VectorFilter,
};
