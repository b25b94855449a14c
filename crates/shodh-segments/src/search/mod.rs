mod pipeline;
mod progress;

pub use pipeline::{HistoryMessage, SearchOptions, SearchPipeline};
pub(crate) use pipeline::materialize_segment;
pub use progress::{ProgressCallback, ProgressPayload, ProgressStatus};
