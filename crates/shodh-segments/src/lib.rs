pub mod backends;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feedback;
pub mod keys;
pub mod metadata_batch;
pub mod removal;
pub mod search;
pub mod types;

// Re-export the coordination layer's primary API.
pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{CoreError, CoreResult};
pub use types::{
    GraphObject, Metadata, MetadataValue, Segment, SegmentHit, SegmentReaction, SegmentScore, SegmentVote,
    SegmentWeight, VotePolarity,
};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
