use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Hands out increasing request ids so callers can drop results of superseded requests.
///
/// Nothing is cancelled: a stale request still runs to completion, its caller just checks
/// [`RequestTicket::is_current`] before using the result.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    latest: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestTicket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.latest() == id
    }
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        assert!(first.is_current());
        let second = tracker.begin();
        assert!(first.is_stale());
        assert!(second.is_current());
        assert!(tracker.is_current(second.id()));
        assert!(!tracker.is_current(first.id()));
    }

    #[test]
    fn clones_share_the_counter() {
        let tracker = RequestTracker::new();
        let ticket = tracker.begin();
        let other_handle = tracker.clone();
        other_handle.begin();
        assert!(ticket.is_stale());
    }
}
