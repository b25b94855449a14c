//! Error types for the segment coordination layer.

/// Result type alias for coordinator operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Error kinds raised by the feedback engine, search pipeline and removal
/// coordinator. Backend-adapter errors are wrapped via `anyhow::Error` so
/// any adapter implementation can propagate its own error type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller passed a structurally invalid argument (empty id, missing
    /// query, arity mismatch between inputs and computed results, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation requires a backend that was not configured on the
    /// coordinator (e.g. `scroll_votes` without a KV adapter).
    #[error("operation requires {0} but none is configured")]
    NotConfigured(String),

    /// A named resource could not be found.
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// A backend adapter call failed.
    #[error("backend failure: {0}")]
    BackendFailure(#[from] anyhow::Error),

    /// A conflicting resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// One branch of a dual-write fan-out failed while the other
    /// succeeded. Carried as an error variant so callers who want to
    /// inspect degraded writes can match on it, but the coordinator
    /// itself only logs this, it does not return it from a public
    /// entry point that also had a successful branch.
    #[error("partial failure: {0}")]
    PartialFailure(String),
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_configured(what: impl Into<String>) -> Self {
        Self::NotConfigured(what.into())
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn partial_failure(msg: impl Into<String>) -> Self {
        Self::PartialFailure(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }

    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::BackendFailure(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::BackendFailure(anyhow::Error::new(e))
    }
}

/// Join multiple errors from a best-effort batch operation (e.g. per-input
/// `compute` hooks) into a single error, so a caller sees one failure
/// instead of having to inspect a vector of results.
pub fn join_errors(errors: Vec<anyhow::Error>) -> anyhow::Error {
    debug_assert!(!errors.is_empty());
    let joined = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    anyhow::anyhow!("{} error(s): {}", errors.len(), joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_variants() {
        let e = CoreError::not_found("segment", "s1");
        assert!(e.is_not_found());
        assert!(!e.is_invalid_argument());

        let e = CoreError::invalid_argument("empty docID");
        assert!(e.is_invalid_argument());

        let e = CoreError::not_configured("kv store");
        assert!(e.is_not_configured());
    }

    #[test]
    fn join_errors_combines_messages() {
        let errs = vec![anyhow::anyhow!("a"), anyhow::anyhow!("b")];
        let joined = join_errors(errs);
        assert!(joined.to_string().contains("2 error(s)"));
        assert!(joined.to_string().contains('a'));
        assert!(joined.to_string().contains('b'));
    }
}
