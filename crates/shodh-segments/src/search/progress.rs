//! Progress reporter (C7): a synchronous callback invoked from the search
//! pipeline at fixed, monotonic checkpoints.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressPayload {
    pub status: ProgressStatus,
    pub message: String,
    /// In `[0, 100]`.
    pub progress: f64,
}

/// Invoked synchronously from the pipeline thread. Implementations must not
/// block — a slow callback degrades pipeline latency linearly since there
/// is no buffering between checkpoints.
pub type ProgressCallback = Arc<dyn Fn(ProgressPayload) + Send + Sync>;

pub(crate) fn report(
    callback: &Option<ProgressCallback>,
    status: ProgressStatus,
    message: impl Into<String>,
    progress: f64,
) {
    if let Some(cb) = callback {
        cb(ProgressPayload {
            status,
            message: message.into(),
            progress,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn report_invokes_callback_with_payload() {
        let seen: Arc<Mutex<Vec<(ProgressStatus, f64)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |p| seen_clone.lock().push((p.status, p.progress)));
        let cb = Some(cb);

        report(&cb, ProgressStatus::Pending, "starting", 0.0);
        report(&cb, ProgressStatus::Success, "done", 100.0);

        let recorded = seen.lock();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0], (ProgressStatus::Pending, 0.0));
        assert_eq!(recorded[1], (ProgressStatus::Success, 100.0));
    }

    #[test]
    fn report_is_a_noop_without_a_callback() {
        report(&None, ProgressStatus::Pending, "ignored", 50.0);
    }
}
