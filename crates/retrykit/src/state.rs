// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Observable retry state snapshots and the store that publishes them.

use std::{
    fmt::{self, Display},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;

use crate::MUTEX_POISONED;

/// Function type for observing retry state changes.
pub type StateHandler = Arc<dyn Fn(RetryState) + Send + Sync>;

/// Creates a channel-based state handler.
///
/// Returns a tuple containing the state handler and a receiver for state snapshots.
#[must_use]
pub fn channel_state_handler() -> (
    StateHandler,
    tokio::sync::mpsc::UnboundedReceiver<RetryState>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = Arc::new(move |state: RetryState| {
        if let Err(e) = tx.send(state) {
            tracing::debug!("Failed to send retry state to channel: {e}");
        }
    });
    (handler, rx)
}

/// A point-in-time snapshot of one operation's retry lifecycle.
///
/// Snapshots are plain data: cheap to clone, safe to hand to observers, and
/// serializable for forwarding over process boundaries. `attempt` counts the
/// attempts completed so far in the current run; `next_delay_ms` is populated
/// only while the engine is asleep between attempts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RetryState {
    /// Whether an execution is currently in progress (any attempt or sleep).
    pub is_loading: bool,
    /// Whether at least one attempt has failed and the run is still going.
    pub is_retrying: bool,
    /// Number of attempts completed so far in the current run.
    pub attempt: u32,
    /// Attempt ceiling from the governing policy.
    pub max_attempts: u32,
    /// Delay before the next attempt in milliseconds, while asleep between attempts.
    pub next_delay_ms: Option<u64>,
    /// Rendered error from the most recent terminal failure.
    pub error: Option<String>,
}

impl RetryState {
    /// Creates a new idle [`RetryState`] with the given attempt ceiling.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            is_loading: false,
            is_retrying: false,
            attempt: 0,
            max_attempts,
            next_delay_ms: None,
            error: None,
        }
    }

    /// Returns true if the last run failed without exhausting its attempt ceiling.
    ///
    /// After a terminal failure `attempt` retains the failing attempt number,
    /// so exhaustion reports false while an early non-retryable failure leaves
    /// attempts available and reports true. Success and reset clear the error,
    /// which also reports false.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.error.is_some() && self.attempt < self.max_attempts
    }
}

impl Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            return write!(
                f,
                "failed after {}/{} attempts: {error}",
                self.attempt, self.max_attempts
            );
        }
        if self.is_retrying {
            if let Some(delay_ms) = self.next_delay_ms {
                return write!(
                    f,
                    "retrying in {:.1}s (attempt {}/{})",
                    delay_ms as f64 / 1_000.0,
                    self.attempt,
                    self.max_attempts
                );
            }
            return write!(
                f,
                "attempt {}/{} in flight",
                self.attempt.saturating_add(1),
                self.max_attempts
            );
        }
        if self.is_loading {
            return write!(f, "attempt 1/{} in flight", self.max_attempts);
        }
        write!(f, "idle")
    }
}

/// Shared, observable holder of a [`RetryState`] with staleness protection.
///
/// The store is the single writer surface for one operation's retry state.
/// Every run claims a fresh generation via [`Self::begin`]; mutations carry
/// the generation they belong to and are dropped once [`Self::reset`] or a
/// newer run has bumped the counter. An optional handler observes a snapshot
/// of every applied change, in application order.
///
/// Clones share the same underlying state and generation counter.
pub struct RetryStateStore {
    state: Arc<Mutex<RetryState>>,
    generation: Arc<AtomicU64>,
    on_change: Option<StateHandler>,
}

impl fmt::Debug for RetryStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(RetryStateStore))
            .field("state", &self.snapshot())
            .field("generation", &self.generation())
            .field("on_change", &self.on_change.as_ref().map(|_| "<function>"))
            .finish()
    }
}

impl Clone for RetryStateStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            on_change: self.on_change.clone(),
        }
    }
}

impl RetryStateStore {
    /// Creates a new store in the idle state.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(RetryState::new(max_attempts))),
            generation: Arc::new(AtomicU64::new(0)),
            on_change: None,
        }
    }

    /// Attaches a handler invoked with a snapshot of every applied change.
    ///
    /// The handler runs while the state lock is held, so snapshots arrive in
    /// the order they were applied and the last delivery always matches the
    /// settled state. The handler must not call back into the store and should
    /// return quickly; [`channel_state_handler`] satisfies both.
    #[must_use]
    pub fn with_on_change(mut self, handler: StateHandler) -> Self {
        self.on_change = Some(handler);
        self
    }

    /// Returns a snapshot of the current state.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> RetryState {
        self.state.lock().expect(MUTEX_POISONED).clone()
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Claims a new generation and stages the state for a fresh run.
    ///
    /// Returns the claimed generation; mutations carrying older generations
    /// are dropped from this point on.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn begin(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        *guard = RetryState::new(guard.max_attempts);
        guard.is_loading = true;
        self.notify(guard.clone());
        generation
    }

    /// Restores the idle state and invalidates any in-flight run.
    ///
    /// The underlying operation of an in-flight run is not interrupted; its
    /// remaining state updates are simply dropped as stale.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        *guard = RetryState::new(guard.max_attempts);
        self.notify(guard.clone());
    }

    /// Clears the retry countdown when an attempt begins executing.
    pub fn apply_attempt_begin(&self, generation: u64) {
        self.mutate(generation, |state| {
            state.next_delay_ms = None;
        });
    }

    /// Records a scheduled retry: `attempt` failures so far, next attempt after `delay`.
    pub fn apply_retry_start(&self, generation: u64, attempt: u32, delay: Duration) {
        self.mutate(generation, |state| {
            state.is_retrying = true;
            state.attempt = attempt;
            state.next_delay_ms = Some(delay.as_millis() as u64);
            state.error = None;
        });
    }

    /// Records successful completion of the run, restoring the idle state.
    pub fn apply_complete(&self, generation: u64) {
        self.mutate(generation, |state| {
            *state = RetryState::new(state.max_attempts);
        });
    }

    /// Records terminal failure of the run on the given attempt.
    pub fn apply_failed(&self, generation: u64, attempt: u32, error: String) {
        self.mutate(generation, |state| {
            state.is_loading = false;
            state.is_retrying = false;
            state.attempt = attempt;
            state.next_delay_ms = None;
            state.error = Some(error);
        });
    }

    /// Applies `f` if `generation` is still current. Both the generation check
    /// and the handler invocation happen inside the state lock, so a concurrent
    /// reset cannot interleave and snapshots reach the handler in the order
    /// they were applied.
    fn mutate(&self, generation: u64, f: impl FnOnce(&mut RetryState)) {
        let mut guard = self.state.lock().expect(MUTEX_POISONED);
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        f(&mut guard);
        self.notify(guard.clone());
    }

    fn notify(&self, state: RetryState) {
        if let Some(handler) = &self.on_change {
            handler(state);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_new_state_is_idle() {
        let state = RetryState::new(3);
        assert!(!state.is_loading);
        assert!(!state.is_retrying);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.max_attempts, 3);
        assert_eq!(state.next_delay_ms, None);
        assert_eq!(state.error, None);
        assert!(!state.can_retry());
    }

    #[rstest]
    #[case(None, 1, 3, false)] // no error
    #[case(Some("boom".to_string()), 1, 3, true)] // early terminal failure
    #[case(Some("boom".to_string()), 3, 3, false)] // exhausted
    fn test_can_retry(
        #[case] error: Option<String>,
        #[case] attempt: u32,
        #[case] max_attempts: u32,
        #[case] expected: bool,
    ) {
        let state = RetryState {
            error,
            attempt,
            ..RetryState::new(max_attempts)
        };
        assert_eq!(state.can_retry(), expected);
    }

    #[rstest]
    fn test_display_states() {
        let idle = RetryState::new(3);
        assert_eq!(idle.to_string(), "idle");

        let first_attempt = RetryState {
            is_loading: true,
            ..RetryState::new(3)
        };
        assert_eq!(first_attempt.to_string(), "attempt 1/3 in flight");

        let sleeping = RetryState {
            is_loading: true,
            is_retrying: true,
            attempt: 1,
            next_delay_ms: Some(1_500),
            ..RetryState::new(3)
        };
        assert_eq!(sleeping.to_string(), "retrying in 1.5s (attempt 1/3)");

        let retry_in_flight = RetryState {
            is_loading: true,
            is_retrying: true,
            attempt: 1,
            ..RetryState::new(3)
        };
        assert_eq!(retry_in_flight.to_string(), "attempt 2/3 in flight");

        let failed = RetryState {
            attempt: 3,
            error: Some("connection refused".to_string()),
            ..RetryState::new(3)
        };
        assert_eq!(
            failed.to_string(),
            "failed after 3/3 attempts: connection refused"
        );
    }

    #[rstest]
    fn test_begin_stages_loading_state() {
        let store = RetryStateStore::new(3);
        let generation = store.begin();

        assert_eq!(generation, 1);
        let state = store.snapshot();
        assert!(state.is_loading);
        assert!(!state.is_retrying);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.error, None);
    }

    #[rstest]
    fn test_apply_sequence_through_success() {
        let store = RetryStateStore::new(3);
        let generation = store.begin();

        store.apply_retry_start(generation, 1, Duration::from_millis(100));
        let state = store.snapshot();
        assert!(state.is_retrying);
        assert_eq!(state.attempt, 1);
        assert_eq!(state.next_delay_ms, Some(100));

        store.apply_attempt_begin(generation);
        let state = store.snapshot();
        assert!(state.is_retrying);
        assert_eq!(state.next_delay_ms, None);

        store.apply_complete(generation);
        assert_eq!(store.snapshot(), RetryState::new(3));
    }

    #[rstest]
    fn test_apply_failed_records_error() {
        let store = RetryStateStore::new(3);
        let generation = store.begin();

        store.apply_failed(generation, 3, "connection refused".to_string());
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert!(!state.is_retrying);
        assert_eq!(state.attempt, 3);
        assert_eq!(state.error.as_deref(), Some("connection refused"));
        assert!(!state.can_retry());
    }

    #[rstest]
    fn test_stale_generation_is_dropped() {
        let store = RetryStateStore::new(3);
        let generation = store.begin();
        store.reset();

        store.apply_retry_start(generation, 1, Duration::from_millis(100));
        store.apply_failed(generation, 2, "stale".to_string());

        assert_eq!(store.snapshot(), RetryState::new(3));
    }

    #[rstest]
    fn test_newer_run_supersedes_older() {
        let store = RetryStateStore::new(3);
        let first = store.begin();
        let second = store.begin();

        store.apply_failed(first, 2, "from the old run".to_string());
        assert_eq!(store.snapshot().error, None);

        store.apply_retry_start(second, 1, Duration::from_millis(50));
        assert_eq!(store.snapshot().attempt, 1);
    }

    #[rstest]
    fn test_reset_restores_idle_state() {
        let store = RetryStateStore::new(3);
        let generation = store.begin();
        store.apply_failed(generation, 3, "boom".to_string());

        store.reset();
        assert_eq!(store.snapshot(), RetryState::new(3));
    }

    #[rstest]
    fn test_channel_state_handler_receives_snapshots() {
        let (handler, mut rx) = channel_state_handler();
        let store = RetryStateStore::new(3).with_on_change(handler);

        let generation = store.begin();
        store.apply_retry_start(generation, 1, Duration::from_millis(100));
        store.apply_complete(generation);

        let staged = rx.try_recv().unwrap();
        assert!(staged.is_loading);

        let retrying = rx.try_recv().unwrap();
        assert!(retrying.is_retrying);
        assert_eq!(retrying.next_delay_ms, Some(100));

        let completed = rx.try_recv().unwrap();
        assert_eq!(completed, RetryState::new(3));

        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    fn test_stale_mutation_does_not_notify() {
        let (handler, mut rx) = channel_state_handler();
        let store = RetryStateStore::new(3).with_on_change(handler);

        let generation = store.begin();
        store.reset();
        store.apply_failed(generation, 1, "stale".to_string());

        let _ = rx.try_recv().unwrap(); // begin
        let _ = rx.try_recv().unwrap(); // reset
        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    fn test_concurrent_reset_delivers_idle_last() {
        // A slow handler widens the window between applying a change and
        // delivering it; the delivered sequence must still end on the state
        // the store settled on
        for _ in 0..20 {
            let delivered = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&delivered);
            let handler: StateHandler = Arc::new(move |state: RetryState| {
                std::thread::sleep(Duration::from_micros(100));
                sink.lock().unwrap().push(state);
            });
            let store = RetryStateStore::new(3).with_on_change(handler);
            let generation = store.begin();

            let racing = {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.apply_retry_start(generation, 1, Duration::from_millis(50));
                })
            };
            store.reset();
            racing.join().unwrap();

            let settled = store.snapshot();
            assert_eq!(settled, RetryState::new(3));
            let delivered = delivered.lock().unwrap();
            assert_eq!(delivered.last(), Some(&settled));
        }
    }

    #[rstest]
    fn test_clones_share_state() {
        let store = RetryStateStore::new(3);
        let clone = store.clone();

        let generation = store.begin();
        store.apply_retry_start(generation, 1, Duration::from_millis(25));

        assert_eq!(clone.snapshot().attempt, 1);
        assert_eq!(clone.generation(), store.generation());
    }
}
