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

//! Exponential backoff delay computation with symmetric jitter.
//!
//! Delays grow geometrically with the attempt number and carry a uniformly
//! distributed jitter of up to ±10% of the ideal delay, so that many clients
//! failing at the same moment do not retry in lockstep. The computation is a
//! pure function of the attempt number and the governing policy; the executor
//! owns the attempt counter.

use std::time::Duration;

use rand::RngExt;

use crate::policy::RetryPolicy;

/// Fraction of the ideal delay used as the jitter amplitude.
pub const JITTER_RATIO: f64 = 0.1;

/// Computes the backoff delay after the given failed attempt.
///
/// The ideal delay is `initial_delay_ms * backoff_multiplier^(attempt - 1)`,
/// jittered by a uniform draw from ±[`JITTER_RATIO`] of itself and then capped
/// at `max_delay_ms`. The cap is applied after jittering, so delays near the
/// ceiling jitter downward only. The jittered value cannot go negative because
/// the jitter amplitude is bounded by a fraction of the ideal delay.
///
/// `attempt` is 1-based: pass the number of the attempt that just failed.
#[must_use]
pub fn compute_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    debug_assert!(attempt >= 1, "attempt numbers are 1-based");

    let exponent = f64::from(attempt.saturating_sub(1));
    let ideal = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powf(exponent);
    let jitter = ideal * JITTER_RATIO * rand::rng().random_range(-1.0..=1.0);
    let capped = (ideal + jitter).min(policy.max_delay_ms as f64);
    Duration::from_millis(capped as u64)
}
