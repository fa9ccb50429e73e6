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

//! Retry policy definitions with validation and named presets.

use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Tunable parameters governing retry scheduling for an operation.
///
/// A policy is plain data: it carries no retry state, so a single value can be
/// shared, copied into configuration files, and reused across any number of
/// operations. Invalid combinations are rejected by [`RetryPolicy::validate`],
/// which runs during executor construction before any attempt is made.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the initial one (must be at least 1).
    pub max_attempts: u32,
    /// Ideal delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound applied to every computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the ideal delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Creates a new validated [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is outside its valid range (see [`Self::validate`]).
    pub fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> anyhow::Result<Self> {
        let policy = Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Validates the policy parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_attempts` is zero.
    /// - `backoff_multiplier` is not finite or is less than 1.0.
    /// - `max_delay_ms` is less than `initial_delay_ms`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            bail!("invalid `max_attempts`: must be at least 1");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            bail!(
                "invalid `backoff_multiplier`: must be finite and at least 1.0, was {}",
                self.backoff_multiplier
            );
        }
        if self.max_delay_ms < self.initial_delay_ms {
            bail!(
                "invalid `max_delay_ms`: must be at least `initial_delay_ms` ({} < {})",
                self.max_delay_ms,
                self.initial_delay_ms
            );
        }
        Ok(())
    }

    /// Policy for fast user-facing operations: few attempts with short delays.
    #[must_use]
    pub const fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }

    /// General-purpose policy suitable for most request/response operations.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }

    /// Policy for operations worth pressing on: more attempts, a faster start,
    /// and steeper growth between them.
    #[must_use]
    pub const fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            backoff_multiplier: 2.5,
        }
    }

    /// Policy for slow-recovering upstreams: attempts spaced far apart.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 3.0,
        }
    }

    /// Returns the initial delay as a [`Duration`].
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns the maximum delay as a [`Duration`].
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
