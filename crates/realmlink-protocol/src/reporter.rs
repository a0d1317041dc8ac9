//! Error reporting sink with a bounded history.
//!
//! Every layer reports failures here. The reporter logs each record at a
//! level matching its severity, keeps the last [`DEFAULT_HISTORY_CAPACITY`]
//! records, and fans them out to subscribers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::classify::classify;
use crate::{ErrorCategory, ErrorRecord, ErrorSeverity};

/// Records kept before the oldest is evicted.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

const EVENT_CAPACITY: usize = 64;

struct Inner {
    history: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
    events: broadcast::Sender<ErrorRecord>,
}

/// Shared handle to the error history. Clones see the same history.
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Arc<Inner>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A capacity of 0 is bumped to 1 so `last()` stays meaningful.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                history: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                events,
            }),
        }
    }

    /// Logs, stores, and broadcasts a record.
    pub fn report(&self, record: ErrorRecord) {
        log_record(&record);

        {
            let mut history = self.inner.history.lock();
            if history.len() == self.inner.capacity {
                history.pop_front();
            }
            history.push_back(record.clone());
        }

        // No subscribers is fine.
        let _ = self.inner.events.send(record);
    }

    /// Builds a record with derived severity and reports it.
    pub fn report_simple(&self, code: i32, message: impl Into<String>, category: ErrorCategory) {
        self.report(ErrorRecord::new(code, message, category));
    }

    /// Up to `count` most recent records, oldest first.
    pub fn recent(&self, count: usize) -> Vec<ErrorRecord> {
        let history = self.inner.history.lock();
        let start = history.len().saturating_sub(count);
        history.iter().skip(start).cloned().collect()
    }

    pub fn last(&self) -> Option<ErrorRecord> {
        self.inner.history.lock().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.history.lock().clear();
    }

    /// Whether the classifier considers this failure retryable.
    pub fn should_retry(&self, record: &ErrorRecord) -> bool {
        classify(record.code, record.category).retryable
    }

    /// Receives every record reported after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorRecord> {
        self.inner.events.subscribe()
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

fn log_record(record: &ErrorRecord) {
    let context = record.context.as_deref().unwrap_or("");
    match record.severity {
        ErrorSeverity::Info => info!(
            code = record.code,
            category = %record.category,
            context,
            "{}",
            record.message
        ),
        ErrorSeverity::Warning => warn!(
            code = record.code,
            category = %record.category,
            context,
            "{}",
            record.message
        ),
        ErrorSeverity::Error | ErrorSeverity::Critical => error!(
            code = record.code,
            category = %record.category,
            severity = %record.severity,
            context,
            "{}",
            record.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    #[test]
    fn test_report_appends_to_history() {
        let reporter = ErrorReporter::new();
        reporter.report_simple(codes::NO_RESPONSE, "no response", ErrorCategory::Network);
        reporter.report_simple(codes::INVALID_CREDENTIALS, "bad creds", ErrorCategory::Auth);

        assert_eq!(reporter.len(), 2);
        assert_eq!(reporter.last().unwrap().code, codes::INVALID_CREDENTIALS);
    }

    #[test]
    fn test_history_evicts_oldest_at_capacity() {
        let reporter = ErrorReporter::new();
        for code in 0..(DEFAULT_HISTORY_CAPACITY as i32 + 5) {
            reporter.report_simple(code, "x", ErrorCategory::System);
        }

        assert_eq!(reporter.len(), DEFAULT_HISTORY_CAPACITY);
        let all = reporter.recent(usize::MAX);
        assert_eq!(all.first().unwrap().code, 5);
        assert_eq!(all.last().unwrap().code, DEFAULT_HISTORY_CAPACITY as i32 + 4);
    }

    #[test]
    fn test_recent_returns_newest_tail_in_order() {
        let reporter = ErrorReporter::new();
        for code in [1, 2, 3, 4] {
            reporter.report_simple(code, "x", ErrorCategory::System);
        }

        let codes: Vec<i32> = reporter.recent(2).iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![3, 4]);
        assert_eq!(reporter.recent(10).len(), 4);
        assert!(reporter.recent(0).is_empty());
    }

    #[test]
    fn test_clones_share_history_and_clear() {
        let reporter = ErrorReporter::new();
        let other = reporter.clone();
        other.report_simple(codes::INTERNAL, "boom", ErrorCategory::System);
        assert_eq!(reporter.len(), 1);

        reporter.clear();
        assert!(other.is_empty());
        assert!(other.last().is_none());
    }

    #[test]
    fn test_should_retry_delegates_to_classifier() {
        let reporter = ErrorReporter::new();
        let timeout = ErrorRecord::new(codes::TIMEOUT, "timed out", ErrorCategory::Network);
        let expired = ErrorRecord::new(codes::TOKEN_EXPIRED, "expired", ErrorCategory::Auth);
        let rejected = ErrorRecord::new(codes::REQUEST_REJECTED, "bad", ErrorCategory::Protocol);

        assert!(reporter.should_retry(&timeout));
        assert!(reporter.should_retry(&expired));
        assert!(!reporter.should_retry(&rejected));
    }

    #[tokio::test]
    async fn test_subscribe_receives_reported_records() {
        let reporter = ErrorReporter::new();
        let mut rx = reporter.subscribe();

        reporter.report_simple(codes::SOCKET_ERROR, "socket", ErrorCategory::Network);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.code, codes::SOCKET_ERROR);
    }
}
