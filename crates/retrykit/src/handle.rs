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

//! Self-contained retry handles binding an operation to policy and state.

use std::{fmt, sync::Arc, time::Duration};

use futures::future::BoxFuture;

use crate::{
    executor::{RetryCallbacks, RetryExecutor},
    policy::RetryPolicy,
    state::{RetryState, RetryStateStore, StateHandler},
};

/// Function type producing one attempt of a handle's operation.
pub type RetryOperation<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Function type deciding whether an error on the given attempt is retryable.
pub type RetryPredicate<E> = Arc<dyn Fn(&E, u32) -> bool + Send + Sync>;

/// Binds one async operation to a retry policy, a retryability predicate, and
/// an observable [`RetryStateStore`].
///
/// A handle is the self-service surface of the engine: construct it once, run
/// [`Self::execute`] whenever the operation should be (re)tried, observe
/// [`Self::state`], and gate manual retry affordances on [`Self::can_retry`].
/// Every call to `execute` claims a fresh store generation, so overlapping
/// calls and [`Self::reset`] cannot interleave stale state updates.
pub struct RetryHandle<T: 'static, E: 'static> {
    name: String,
    executor: RetryExecutor<E>,
    store: RetryStateStore,
    operation: RetryOperation<T, E>,
    predicate: RetryPredicate<E>,
}

impl<T: 'static, E: std::error::Error + 'static> fmt::Debug for RetryHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(RetryHandle))
            .field("name", &self.name)
            .field("policy", self.executor.policy())
            .field("store", &self.store)
            .field("operation", &"<function>")
            .field("predicate", &"<function>")
            .finish()
    }
}

impl<T, E> RetryHandle<T, E>
where
    T: 'static,
    E: std::error::Error + 'static,
{
    /// Creates a new handle running `operation` under `policy`.
    ///
    /// Every error is considered retryable by default; narrow this with
    /// [`Self::with_predicate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid.
    pub fn new<F>(
        name: impl Into<String>,
        policy: RetryPolicy,
        operation: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static,
    {
        let executor = RetryExecutor::new(policy)?;
        let store = RetryStateStore::new(executor.policy().max_attempts);
        Ok(Self {
            name: name.into(),
            executor,
            store,
            operation: Arc::new(operation),
            predicate: Arc::new(|_, _| true),
        })
    }

    /// Replaces the retryability predicate.
    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E, u32) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Attaches a handler observing every state change.
    #[must_use]
    pub fn with_state_handler(mut self, handler: StateHandler) -> Self {
        self.store = self.store.with_on_change(handler);
        self
    }

    /// Returns the handle's name, used in log lines.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the governing policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    /// Returns a snapshot of the current retry state.
    #[must_use]
    pub fn state(&self) -> RetryState {
        self.store.snapshot()
    }

    /// Returns true if the last run failed without exhausting its attempt ceiling.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.store.snapshot().can_retry()
    }

    /// Restores the idle state and marks any in-flight run stale.
    ///
    /// The underlying operation is not interrupted: a superseded run keeps
    /// executing and still returns its result to its own caller, but its
    /// remaining state updates are dropped.
    pub fn reset(&self) {
        self.store.reset();
    }

    /// Runs the operation under the handle's policy, driving the state store
    /// through the attempt lifecycle.
    ///
    /// Concurrent calls are safe: the newest call claims the store and earlier
    /// in-flight runs become stale observers.
    ///
    /// # Errors
    ///
    /// Returns the original error from the final attempt when no further retry
    /// is scheduled.
    pub async fn execute(&self) -> Result<T, E> {
        let generation = self.store.begin();

        let callbacks = RetryCallbacks {
            on_attempt_start: Some(Arc::new({
                let store = self.store.clone();
                move |_attempt: u32| store.apply_attempt_begin(generation)
            })),
            on_retry_start: Some(Arc::new({
                let store = self.store.clone();
                move |attempt: u32, delay: Duration| {
                    store.apply_retry_start(generation, attempt, delay);
                }
            })),
            // Completion is applied below for every success, including on the
            // first attempt where no lifecycle callback fires
            on_retry_complete: None,
            on_retry_failed: Some(Arc::new({
                let store = self.store.clone();
                move |error: &E, attempt: u32| {
                    store.apply_failed(generation, attempt, error.to_string());
                }
            })),
        };

        let operation = Arc::clone(&self.operation);
        let predicate = Arc::clone(&self.predicate);

        let result = self
            .executor
            .execute(
                &self.name,
                move || operation(),
                move |error: &E, attempt| predicate(error, attempt),
                &callbacks,
            )
            .await;

        if result.is_ok() {
            self.store.apply_complete(generation);
        }
        result
    }
}
