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

//! Policy-driven retry execution for fallible async operations.

use std::{fmt, future::Future, marker::PhantomData, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{backoff::compute_delay, policy::RetryPolicy};

/// Function type for observing the start of each attempt.
pub type AttemptStartHandler = Arc<dyn Fn(u32) + Send + Sync>;

/// Function type for observing a scheduled retry.
pub type RetryStartHandler = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Function type for observing success after at least one retry.
pub type RetryCompleteHandler = Arc<dyn Fn() + Send + Sync>;

/// Function type for observing terminal failure.
pub type RetryFailedHandler<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Lifecycle callbacks fired by [`RetryExecutor::execute`].
///
/// All handlers are optional; the default bundle observes nothing.
pub struct RetryCallbacks<E> {
    /// Called with the 1-based attempt number before each attempt begins executing.
    pub on_attempt_start: Option<AttemptStartHandler>,
    /// Called when a retry is scheduled, with the number of failed attempts so
    /// far and the delay before the next one.
    pub on_retry_start: Option<RetryStartHandler>,
    /// Called when the operation succeeds after at least one retry.
    pub on_retry_complete: Option<RetryCompleteHandler>,
    /// Called exactly once when the operation fails terminally, with the final
    /// error and the failing attempt number.
    pub on_retry_failed: Option<RetryFailedHandler<E>>,
}

impl<E> Default for RetryCallbacks<E> {
    fn default() -> Self {
        Self {
            on_attempt_start: None,
            on_retry_start: None,
            on_retry_complete: None,
            on_retry_failed: None,
        }
    }
}

impl<E> fmt::Debug for RetryCallbacks<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(RetryCallbacks))
            .field(
                "on_attempt_start",
                &self.on_attempt_start.as_ref().map(|_| "<function>"),
            )
            .field(
                "on_retry_start",
                &self.on_retry_start.as_ref().map(|_| "<function>"),
            )
            .field(
                "on_retry_complete",
                &self.on_retry_complete.as_ref().map(|_| "<function>"),
            )
            .field(
                "on_retry_failed",
                &self.on_retry_failed.as_ref().map(|_| "<function>"),
            )
            .finish()
    }
}

impl<E> Clone for RetryCallbacks<E> {
    fn clone(&self) -> Self {
        Self {
            on_attempt_start: self.on_attempt_start.clone(),
            on_retry_start: self.on_retry_start.clone(),
            on_retry_complete: self.on_retry_complete.clone(),
            on_retry_failed: self.on_retry_failed.clone(),
        }
    }
}

/// Policy-driven executor for fallible async operations.
///
/// The executor is stateless and thread-safe: every call to [`Self::execute`]
/// runs with its own attempt counter, so one executor can be shared across
/// concurrent operations.
#[derive(Debug)]
pub struct RetryExecutor<E> {
    policy: RetryPolicy,
    _phantom: PhantomData<E>,
}

impl<E> RetryExecutor<E>
where
    E: std::error::Error,
{
    /// Creates a new executor governed by the given policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy is invalid.
    pub fn new(policy: RetryPolicy) -> anyhow::Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            _phantom: PhantomData,
        })
    }

    /// Returns the governing policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes an operation with retries governed by the executor's policy.
    ///
    /// Attempts run strictly sequentially. After a failed attempt the
    /// `should_retry` predicate decides, given the error and the 1-based
    /// attempt number, whether another attempt is scheduled; exhausting the
    /// policy's attempt ceiling always stops. Between attempts the engine
    /// sleeps for a jittered exponential backoff delay.
    ///
    /// # Errors
    ///
    /// Returns the original error from the final attempt, unwrapped, when no
    /// further retry is scheduled.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
        should_retry: impl Fn(&E, u32) -> bool,
        callbacks: &RetryCallbacks<E>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        // Every terminal path returns from inside the loop: the exhaustion
        // check fires no later than `max_attempts`, which validation
        // guarantees is at least 1
        loop {
            if let Some(handler) = &callbacks.on_attempt_start {
                handler(attempt);
            }

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation '{operation_name}' succeeded after {attempt} attempts");
                        if let Some(handler) = &callbacks.on_retry_complete {
                            handler();
                        }
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !should_retry(&error, attempt) {
                        debug!(
                            "Operation '{operation_name}' failed with non-retryable error: {error}"
                        );
                        if let Some(handler) = &callbacks.on_retry_failed {
                            handler(&error, attempt);
                        }
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        warn!(
                            "Operation '{operation_name}' failed after {attempt} attempts: {error}"
                        );
                        if let Some(handler) = &callbacks.on_retry_failed {
                            handler(&error, attempt);
                        }
                        return Err(error);
                    }

                    let delay = compute_delay(attempt, &self.policy);
                    debug!(
                        "Operation '{operation_name}' failed (attempt {attempt}/{max_attempts}), retrying in {delay:?}: {error}"
                    );
                    if let Some(handler) = &callbacks.on_retry_start {
                        handler(attempt, delay);
                    }
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Executes an operation treating every error as retryable.
    ///
    /// Equivalent to [`Self::execute`] with a predicate that always returns
    /// true; the policy's attempt ceiling still applies.
    ///
    /// # Errors
    ///
    /// Returns the original error from the final attempt once the attempt
    /// ceiling is exhausted.
    pub async fn execute_always<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
        callbacks: &RetryCallbacks<E>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute(operation_name, operation, |_, _| true, callbacks)
            .await
    }
}
