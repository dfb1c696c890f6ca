//! Retryable HTTP execution
//!
//! One call per attempt, classified after each: 5xx and transient transport
//! failures back off and retry, everything else (2xx-4xx, non-network
//! errors) is final on the spot.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use apiprobe_core::RetryPolicy;

use crate::cancel::CancelToken;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Whether an attempt's outcome is worth retrying.
#[must_use]
pub fn is_retryable(err: Option<&TransportError>, status: u16) -> bool {
    if (500..600).contains(&status) {
        return true;
    }
    err.is_some_and(TransportError::is_transient)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("max retries exceeded after {retries} retries: {last}")]
    MaxRetriesExceeded { retries: u32, last: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("cancelled")]
    Cancelled,
}

/// Final state of the retry loop.
#[derive(Debug)]
pub struct ExecOutcome {
    /// Last response observed, if any attempt produced one
    pub response: Option<HttpResponse>,
    pub error: Option<ExecError>,
    /// Retries actually performed
    pub retries: u32,
    /// Time from first attempt to return, sleeps included
    pub elapsed: Duration,
    /// One line per attempt, for verbose logs
    pub attempts: Vec<String>,
}

/// Run `request` until success, a final outcome, retry exhaustion, or
/// cancellation.
pub fn execute<T: Transport + ?Sized>(
    transport: &T,
    request: &HttpRequest<'_>,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> ExecOutcome {
    let start = Instant::now();
    let mut attempts = Vec::new();
    let mut last_response = None;
    let mut attempt: u32 = 0;

    let finish = |response, error, retries, attempts| ExecOutcome {
        response,
        error,
        retries,
        elapsed: start.elapsed(),
        attempts,
    };

    loop {
        if cancel.is_cancelled() {
            return finish(last_response, Some(ExecError::Cancelled), attempt, attempts);
        }

        let call_start = Instant::now();
        let result = transport.send(request);
        let call_ms = call_start.elapsed().as_millis();

        let retryable = match &result {
            Ok(resp) => {
                debug!(method = request.method, url = request.url, status = resp.status, attempt, "response");
                attempts.push(format!("attempt {}: {} in {call_ms}ms", attempt + 1, resp.status));
                is_retryable(None, resp.status)
            }
            Err(e) => {
                debug!(method = request.method, url = request.url, error = %e, attempt, "transport error");
                attempts.push(format!("attempt {}: {e} after {call_ms}ms", attempt + 1));
                is_retryable(Some(e), 0)
            }
        };

        if !retryable {
            return match result {
                Ok(resp) => finish(Some(resp), None, attempt, attempts),
                Err(e) => finish(None, Some(e.into()), attempt, attempts),
            };
        }

        if attempt >= policy.max_retries {
            let (response, last) = match result {
                Ok(resp) => {
                    let last = format!("HTTP {}", resp.status);
                    (Some(resp), last)
                }
                // keep the last 5xx seen before the transport gave out
                Err(e) => (last_response, e.to_string()),
            };
            warn!(method = request.method, url = request.url, retries = attempt, %last, "giving up");
            return finish(
                response,
                Some(ExecError::MaxRetriesExceeded {
                    retries: attempt,
                    last,
                }),
                attempt,
                attempts,
            );
        }

        if let Ok(resp) = result {
            last_response = Some(resp);
        }
        let delay = policy.delay_for(attempt);
        warn!(
            method = request.method,
            url = request.url,
            attempt = attempt + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying"
        );
        if !cancel.sleep(delay) {
            return finish(last_response, Some(ExecError::Cancelled), attempt, attempts);
        }
        attempt += 1;
    }
}
