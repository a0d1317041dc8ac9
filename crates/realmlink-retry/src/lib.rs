//! Timer-driven retry scheduler for Realmlink.
//!
//! One primitive serves two very different jobs:
//!
//! - **Scheduled token refresh**: a single-shot timer, armed for a fixed
//!   delay before the access token expires.
//! - **Reconnection**: an exponential-backoff retry loop with an attempt cap.
//!
//! Both are a [`RetryScheduler`] with a different [`RetryPolicy`]. Each
//! component owns its own scheduler, so their attempt counters never
//! interfere.
//!
//! # Cycle
//!
//! ```text
//! start ──→ attempt 1 ──ok──→ on_complete(true)
//!               │ fail
//!               ▼
//!          sleep delay_for(0) ──→ attempt 2 ──ok──→ on_complete(true)
//!                                     │ fail
//!                                     ▼
//!                               sleep delay_for(1) ──→ ... attempt N fail ──→ on_complete(false)
//! ```
//!
//! Timers are `tokio::time` sleeps, so tests drive the scheduler with a
//! paused clock. Starting a cycle requires a running Tokio runtime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per cycle, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor per retry when `exponential` is set.
    pub backoff_multiplier: f64,
    /// When off, every delay is `initial_delay`.
    pub exponential: bool,
    /// Random extra delay (0..=jitter) added to each wait. Zero disables it.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            exponential: true,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff doubling from `initial_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    /// One attempt, no retries. Used for deferred single-shot timers.
    pub fn single_shot() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the policy is safe to use.
    ///
    /// Called automatically by [`RetryScheduler::new`]. Rules:
    /// - `max_attempts` is at least 1.
    /// - `backoff_multiplier` below 1.0 (or NaN) becomes 1.0.
    /// - `max_delay` is at least `initial_delay`.
    pub fn validated(mut self) -> Self {
        if self.max_attempts == 0 {
            warn!("retry policy max_attempts is 0, using 1");
            self.max_attempts = 1;
        }
        if !(self.backoff_multiplier >= 1.0) {
            warn!(
                multiplier = self.backoff_multiplier,
                "retry backoff multiplier below 1.0, using 1.0"
            );
            self.backoff_multiplier = 1.0;
        }
        if self.max_delay < self.initial_delay {
            self.max_delay = self.initial_delay;
        }
        self
    }

    /// Delay before the retry that follows `step` earlier waits (0-based).
    ///
    /// `min(max_delay, initial_delay * multiplier^step)`, or a flat
    /// `initial_delay` when exponential backoff is off. Jitter is not
    /// included.
    pub fn delay_for(&self, step: u32) -> Duration {
        if !self.exponential {
            return self.initial_delay.min(self.max_delay);
        }
        let exponent = i32::try_from(step).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        delay.saturating_add(Duration::from_millis(rand::rng().random_range(0..=max_ms)))
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

type Completion = Box<dyn FnOnce(bool) + Send>;

#[derive(Default)]
struct CycleState {
    /// Bumped on every start and cancel; tasks from older cycles see a
    /// mismatch and stop.
    generation: u64,
    active: bool,
    attempts: u32,
    armed: Option<Duration>,
    cancel_tx: Option<oneshot::Sender<()>>,
    on_complete: Option<Completion>,
}

/// Runs an async action until it succeeds or the policy gives up.
///
/// Cloning yields another handle to the same scheduler.
///
/// ## Closure bounds explained
///
/// [`start`](Self::start) takes an `action` and an `on_complete`:
///
/// - `action: FnMut() -> Fut` is called once per attempt. It is `FnMut`
///   rather than `Fn` so it may keep its own state between attempts, and
///   each call returns a fresh future whose `bool` says whether the
///   attempt worked.
/// - `on_complete: FnOnce(bool)` runs exactly once per cycle, with
///   `true` on success and `false` when attempts run out or the cycle is
///   cancelled. It is `FnOnce` because a cycle only ends once.
///
/// Both carry `Send + 'static` bounds. The cycle runs on a spawned Tokio
/// task, which may hop threads and may outlive the caller's stack frame,
/// so the closures must own what they capture.
///
/// ## One cycle at a time
///
/// A scheduler runs at most one cycle. Starting while a cycle is active
/// returns `false` and leaves the running cycle untouched. Callers that
/// need a new cycle after the current one should start it from
/// `on_complete`, which runs after the scheduler has already marked
/// itself idle.
///
/// ## Cancellation
///
/// [`cancel`](Self::cancel) bumps an internal generation counter. A
/// waiting timer is dropped at once. An attempt already in flight is not
/// interrupted, but when it finishes it sees the newer generation and
/// its result goes nowhere. `on_complete(false)` runs synchronously
/// inside `cancel`, so do not call `cancel` while holding a lock that
/// `on_complete` also takes.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use realmlink_retry::{RetryPolicy, RetryScheduler};
///
/// # async fn demo() {
/// let scheduler = RetryScheduler::new(
///     "example",
///     RetryPolicy::exponential(3, Duration::from_millis(100)),
/// );
/// let mut tries = 0;
/// scheduler.start(
///     move || {
///         tries += 1;
///         let ok = tries == 2;
///         async move { ok }
///     },
///     |ok| println!("finished, success = {ok}"),
/// );
/// # }
/// ```
#[derive(Clone)]
pub struct RetryScheduler {
    label: &'static str,
    policy: RetryPolicy,
    state: Arc<Mutex<CycleState>>,
}

impl RetryScheduler {
    /// `label` names the scheduler in log output.
    pub fn new(label: &'static str, policy: RetryPolicy) -> Self {
        Self {
            label,
            policy: policy.validated(),
            state: Arc::new(Mutex::new(CycleState::default())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Starts a cycle whose first attempt runs immediately.
    ///
    /// Returns `false`, and changes nothing, if a cycle is already running.
    pub fn start<A, Fut, C>(&self, action: A, on_complete: C) -> bool
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
        C: FnOnce(bool) + Send + 'static,
    {
        self.launch(None, action, on_complete)
    }

    /// Starts a cycle whose first attempt runs after `first_delay`.
    ///
    /// The first wait counts as backoff step 0, so later retries continue
    /// from `delay_for(1)`.
    pub fn start_after<A, Fut, C>(&self, first_delay: Duration, action: A, on_complete: C) -> bool
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
        C: FnOnce(bool) + Send + 'static,
    {
        self.launch(Some(first_delay), action, on_complete)
    }

    /// Stops the current cycle.
    ///
    /// A pending timer is dropped and `on_complete(false)` runs if a cycle
    /// was active. An attempt that is already running keeps running, but
    /// its result is ignored.
    pub fn cancel(&self) {
        let (cancel_tx, on_complete) = {
            let mut st = self.state.lock();
            if !st.active {
                return;
            }
            st.generation += 1;
            st.active = false;
            st.attempts = 0;
            st.armed = None;
            (st.cancel_tx.take(), st.on_complete.take())
        };

        debug!(scheduler = self.label, "retry cycle cancelled");
        if let Some(tx) = cancel_tx {
            let _ = tx.send(());
        }
        if let Some(cb) = on_complete {
            cb(false);
        }
    }

    /// Whether a cycle is running (waiting or mid-attempt).
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Attempts made so far in the current cycle.
    pub fn attempt_count(&self) -> u32 {
        self.state.lock().attempts
    }

    /// Length of the timer currently armed, if the cycle is waiting.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.state.lock().armed
    }

    fn launch<A, Fut, C>(&self, first_delay: Option<Duration>, mut action: A, on_complete: C) -> bool
    where
        A: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
        C: FnOnce(bool) + Send + 'static,
    {
        let generation = {
            let mut st = self.state.lock();
            if st.active {
                warn!(
                    scheduler = self.label,
                    attempts = st.attempts,
                    "retry cycle already in progress, ignoring start"
                );
                return false;
            }
            st.generation += 1;
            st.active = true;
            st.attempts = 0;
            st.armed = None;
            st.on_complete = Some(Box::new(on_complete));
            st.generation
        };

        let label = self.label;
        let policy = self.policy.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut steps_taken = 0u32;
            let mut next_delay = first_delay;

            loop {
                if let Some(base) = next_delay {
                    let delay = policy.jittered(base);
                    let (tx, rx) = oneshot::channel();
                    {
                        let mut st = state.lock();
                        if st.generation != generation {
                            return;
                        }
                        st.armed = Some(delay);
                        st.cancel_tx = Some(tx);
                    }
                    trace!(scheduler = label, delay_ms = delay.as_millis() as u64, "retry timer armed");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = rx => return,
                    }
                    steps_taken += 1;
                }

                let attempt = {
                    let mut st = state.lock();
                    if st.generation != generation {
                        return;
                    }
                    st.armed = None;
                    st.cancel_tx = None;
                    st.attempts += 1;
                    st.attempts
                };

                debug!(scheduler = label, attempt, max = policy.max_attempts, "retry attempt");
                let ok = action().await;

                let finished = {
                    let mut st = state.lock();
                    if st.generation != generation {
                        trace!(scheduler = label, attempt, "stale attempt result ignored");
                        return;
                    }
                    if ok || attempt >= policy.max_attempts {
                        st.active = false;
                        st.attempts = 0;
                        Some(st.on_complete.take())
                    } else {
                        None
                    }
                };

                if let Some(cb) = finished {
                    if !ok {
                        warn!(scheduler = label, attempts = attempt, "retry attempts exhausted");
                    }
                    if let Some(cb) = cb {
                        cb(ok);
                    }
                    return;
                }

                next_delay = Some(policy.delay_for(steps_taken));
            }
        });

        true
    }
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("RetryScheduler")
            .field("label", &self.label)
            .field("active", &st.active)
            .field("attempts", &st.attempts)
            .field("armed", &st.armed)
            .finish()
    }
}
