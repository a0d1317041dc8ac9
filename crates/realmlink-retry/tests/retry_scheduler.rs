//! Integration tests for the retry scheduler.
//!
//! All tests run on a paused Tokio clock: sleeps resolve as soon as the
//! runtime is otherwise idle, and `Instant::now()` differences are exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use realmlink_retry::{RetryPolicy, RetryScheduler};
use tokio::sync::oneshot;
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

/// Records the offset (from `origin`) of every attempt.
#[derive(Clone)]
struct AttemptLog {
    origin: Instant,
    times: Arc<Mutex<Vec<Duration>>>,
}

impl AttemptLog {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self) {
        self.times.lock().push(self.origin.elapsed());
    }

    fn times(&self) -> Vec<Duration> {
        self.times.lock().clone()
    }
}

fn secs(v: &[u64]) -> Vec<Duration> {
    v.iter().map(|s| Duration::from_secs(*s)).collect()
}

fn completion() -> (impl FnOnce(bool) + Send + 'static, oneshot::Receiver<bool>) {
    let (tx, rx) = oneshot::channel();
    (move |ok| {
        let _ = tx.send(ok);
    }, rx)
}

/// An action that fails `failures` times, then succeeds.
fn failing_then_ok(
    log: AttemptLog,
    failures: u32,
) -> impl FnMut() -> std::future::Ready<bool> + Send + 'static {
    let calls = Arc::new(AtomicU32::new(0));
    move || {
        log.record();
        let n = calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(n >= failures)
    }
}

// =========================================================================
// Backoff timing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_always_failing_waits_two_then_four_seconds() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(3, Duration::from_secs(2)));
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    assert!(scheduler.start(failing_then_ok(log.clone(), u32::MAX), on_complete));

    assert!(!rx.await.unwrap());
    assert_eq!(log.times(), secs(&[0, 2, 6]));
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.attempt_count(), 0);
    assert_eq!(scheduler.armed_delay(), None);
}

#[tokio::test(start_paused = true)]
async fn test_start_success_on_first_attempt_completes_true() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::default());
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    scheduler.start(failing_then_ok(log.clone(), 0), on_complete);

    assert!(rx.await.unwrap());
    assert_eq!(log.times(), secs(&[0]));
}

#[tokio::test(start_paused = true)]
async fn test_start_success_after_retry_stops_retrying() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(5, Duration::from_secs(1)));
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    scheduler.start(failing_then_ok(log.clone(), 2), on_complete);

    assert!(rx.await.unwrap());
    assert_eq!(log.times(), secs(&[0, 1, 3]));
}

#[tokio::test(start_paused = true)]
async fn test_start_after_continues_backoff_from_step_one() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(2, Duration::from_secs(1)));
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    scheduler.start_after(Duration::from_secs(1), failing_then_ok(log.clone(), u32::MAX), on_complete);

    assert!(!rx.await.unwrap());
    assert_eq!(log.times(), secs(&[1, 3]));
}

#[tokio::test(start_paused = true)]
async fn test_single_shot_fires_once_after_delay() {
    let scheduler = RetryScheduler::new("refresh", RetryPolicy::single_shot());
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    scheduler.start_after(Duration::from_secs(3540), failing_then_ok(log.clone(), u32::MAX), on_complete);
    tokio::task::yield_now().await;
    assert_eq!(scheduler.armed_delay(), Some(Duration::from_secs(3540)));

    assert!(!rx.await.unwrap());
    assert_eq!(log.times(), secs(&[3540]));
}

// =========================================================================
// Single cycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_start_while_active_is_rejected() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(3, Duration::from_secs(2)));
    let first = AttemptLog::new();
    let second = AttemptLog::new();
    let (on_complete, rx) = completion();
    let (on_complete2, rx2) = completion();

    assert!(scheduler.start(failing_then_ok(first.clone(), u32::MAX), on_complete));
    assert!(!scheduler.start(failing_then_ok(second.clone(), 0), on_complete2));

    assert!(!rx.await.unwrap());
    assert_eq!(first.times().len(), 3);
    assert!(second.times().is_empty());
    // The rejected completion was dropped without being called.
    assert!(rx2.await.is_err());
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_completes_false_and_stops() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(3, Duration::from_secs(2)));
    let log = AttemptLog::new();
    let (on_complete, rx) = completion();

    scheduler.start(failing_then_ok(log.clone(), u32::MAX), on_complete);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.attempt_count(), 1);
    assert_eq!(scheduler.armed_delay(), Some(Duration::from_secs(2)));

    scheduler.cancel();

    assert!(!rx.await.unwrap());
    assert!(!scheduler.is_active());
    assert_eq!(scheduler.attempt_count(), 0);
    assert_eq!(scheduler.armed_delay(), None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(log.times(), secs(&[0]));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_when_idle_is_noop() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::default());
    scheduler.cancel();
    assert!(!scheduler.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_in_flight_attempt_result() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::default());
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
    let completions = Arc::new(Mutex::new(Vec::new()));

    let rx_slot = Arc::clone(&release_rx);
    let seen = Arc::clone(&completions);
    scheduler.start(
        move || {
            let rx_slot = Arc::clone(&rx_slot);
            async move {
                if let Some(rx) = rx_slot.lock().await.take() {
                    let _ = rx.await;
                }
                true
            }
        },
        move |ok| seen.lock().push(ok),
    );
    tokio::task::yield_now().await;
    assert_eq!(scheduler.attempt_count(), 1);

    scheduler.cancel();
    let _ = release_tx.send(());
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Only the cancel's completion; the late `true` was ignored.
    assert_eq!(*completions.lock(), vec![false]);
    assert!(!scheduler.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_cancel_runs_new_cycle() {
    let scheduler = RetryScheduler::new("test", RetryPolicy::exponential(3, Duration::from_secs(2)));
    let log = AttemptLog::new();
    let (on_complete, _rx) = completion();
    scheduler.start_after(Duration::from_secs(10), failing_then_ok(log.clone(), u32::MAX), on_complete);
    scheduler.cancel();

    let (on_complete, rx) = completion();
    assert!(scheduler.start(failing_then_ok(log.clone(), 0), on_complete));
    assert!(rx.await.unwrap());
    assert_eq!(log.times(), secs(&[0]));
}
