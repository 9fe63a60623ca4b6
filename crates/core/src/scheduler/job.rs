use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a scheduler and one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both tokens belong to the same submission.
    pub fn same(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A cancellable unit of work run by a [`ScheduleUnit`](super::ScheduleUnit).
///
/// Jobs are identified by [`key`](Self::key) while queued or running; a
/// unit refuses a second job with a key that is still active.
pub trait Job: Send + Sync {
    fn key(&self) -> &str;

    /// Higher values run first. Jobs of equal priority run in submission order.
    fn priority(&self) -> u8 {
        0
    }

    /// Do the work. Long-running jobs should poll `cancel` and return once
    /// it is set.
    fn run(&self, cancel: &CancelToken);

    /// Called once when the job is stopped while queued or running, after
    /// its token has been cancelled.
    fn cancel(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(token.same(&clone));
        assert!(!token.same(&CancelToken::new()));
    }
}
