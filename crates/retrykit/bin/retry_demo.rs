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

//! Runs a [`RetryHandle`] against a flaky in-memory service, logging every
//! state change as the engine retries.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use futures::FutureExt;
use retrykit::{RetryHandle, RetryPolicy, channel_state_handler};
use tracing::level_filters::LevelFilter;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    // Flaky service: refuses the first two calls, then recovers
    let calls = Arc::new(AtomicU32::new(0));
    let operation = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call < 3 {
                    Err(DemoError::Unavailable(format!(
                        "connection refused (call {call})"
                    )))
                } else {
                    Ok(format!("payload delivered on call {call}"))
                }
            }
            .boxed()
        }
    };

    let (handler, mut state_rx) = channel_state_handler();
    let handle = RetryHandle::new("flaky_service", RetryPolicy::quick(), operation)?
        .with_predicate(|error: &DemoError, _attempt| {
            matches!(error, DemoError::Unavailable(_))
        })
        .with_state_handler(handler);

    let observer = tokio::spawn(async move {
        while let Some(state) = state_rx.recv().await {
            tracing::info!("state: {state}");
        }
    });

    let result = handle.execute().await?;
    tracing::info!("result: {result}");
    tracing::info!("final state: {}", handle.state());

    // Dropping the handle closes the state channel and ends the observer
    drop(handle);
    observer.await?;

    // Non-retryable errors fail fast without burning the attempt budget
    let bad_request = RetryHandle::new("bad_request", RetryPolicy::quick(), || {
        async {
            Err::<String, DemoError>(DemoError::InvalidRequest(
                "missing account id".to_string(),
            ))
        }
        .boxed()
    })?
    .with_predicate(|error: &DemoError, _attempt| matches!(error, DemoError::Unavailable(_)));

    if let Err(e) = bad_request.execute().await {
        tracing::warn!("bad_request failed: {e}");
    }
    tracing::info!(
        "bad_request state: {} (can_retry: {})",
        bad_request.state(),
        bad_request.can_retry()
    );

    Ok(())
}
