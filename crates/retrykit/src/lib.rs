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

//! A policy-driven retry and backoff execution engine for async Rust.
//!
//! The `retrykit` crate provides the building blocks for running fallible
//! async operations under a retry policy: exponential backoff delays with
//! symmetric jitter, a callback-instrumented execution loop, observable retry
//! state with staleness protection, and self-contained handles bundling an
//! operation with its policy and state.
//!
//! # Components
//!
//! - [`RetryPolicy`]: validated retry tunables with named presets.
//! - [`compute_delay`]: pure backoff-with-jitter delay computation.
//! - [`RetryExecutor`]: the sequential attempt loop with lifecycle callbacks.
//! - [`RetryState`] / [`RetryStateStore`]: observable snapshots guarded by a
//!   generation counter so superseded runs cannot clobber newer state.
//! - [`RetryHandle`]: one operation bound to a policy, a retryability
//!   predicate, and a state store.
//!
//! Retryability is binary and caller-defined: a predicate inspects each error
//! (with the attempt number) and either schedules another attempt or fails
//! terminally, surfacing the original error unwrapped.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backoff;
pub mod executor;
pub mod handle;
pub mod policy;
pub mod state;

// Re-exports
pub use crate::{
    backoff::{JITTER_RATIO, compute_delay},
    executor::{
        AttemptStartHandler, RetryCallbacks, RetryCompleteHandler, RetryExecutor,
        RetryFailedHandler, RetryStartHandler,
    },
    handle::{RetryHandle, RetryOperation, RetryPredicate},
    policy::RetryPolicy,
    state::{RetryState, RetryStateStore, StateHandler, channel_state_handler},
};

/// Message for when a mutex guard cannot be acquired due to poisoning.
///
/// Mutex guards should use `expect` rather than handle poison errors; a
/// poisoned lock means a thread panicked while holding it.
pub const MUTEX_POISONED: &str = "Mutex poisoned";
