//! Endpoint cascade resolution.
//!
//! Tries an ordered list of candidates for one logical operation and stops
//! at the first that yields usable data.
//!
//! ## Rules
//!
//! - Candidates run strictly in order, one at a time. The first success
//!   wins and later candidates are never contacted.
//! - No candidate is retried within one resolution.
//! - Transport errors, non-success statuses, empty bodies and bodies of the
//!   wrong shape all mean "try the next candidate". None of them escape.
//! - Every attempt is recorded in a [`CascadeTrace`] for diagnostics. The
//!   trace never influences the logical result.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::envelope::{is_empty_body, ResponseEnvelope};
use crate::error::VerifyError;
use crate::transport::{HttpTransport, Request};

/// Something the cascade can try.
pub trait Candidate {
    /// Short label for traces and logs.
    fn label(&self) -> String;
}

impl Candidate for Request {
    fn label(&self) -> String {
        self.url.clone()
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum AttemptOutcome {
    /// Usable data; the cascade stopped here.
    Success,
    /// Network-level failure.
    Transport {
        /// Error message.
        message: String,
    },
    /// Non-success HTTP status.
    Status {
        /// Status code.
        code: u16,
    },
    /// Success status but nothing usable in the body.
    Empty,
    /// Body present but not of the expected shape.
    Rejected {
        /// Why it was rejected.
        reason: String,
    },
}

impl From<&VerifyError> for AttemptOutcome {
    fn from(err: &VerifyError) -> Self {
        match err {
            VerifyError::Transport { message, .. } => Self::Transport {
                message: message.clone(),
            },
            VerifyError::UpstreamStatus { status, .. } => Self::Status { code: *status },
            VerifyError::EmptyResponse { .. } => Self::Empty,
            other => Self::Rejected {
                reason: other.to_string(),
            },
        }
    }
}

/// One entry of a cascade trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAttempt {
    /// Candidate label (usually the URL).
    pub label: String,
    /// Outcome.
    pub outcome: AttemptOutcome,
    /// Wall time spent on this candidate.
    pub elapsed_ms: u64,
}

/// Diagnostic record of one cascade run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeTrace {
    /// Logical operation name.
    pub operation: String,
    /// Attempts in the order they were made.
    pub attempts: Vec<CandidateAttempt>,
}

impl CascadeTrace {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            attempts: Vec::new(),
        }
    }

    /// Number of candidates contacted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempts.len()
    }

    /// Label of the winning candidate, if any.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        self.attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Success)
            .map(|a| a.label.as_str())
    }
}

/// Result of a cascade run.
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeOutcome<T> {
    /// A candidate produced usable data.
    Resolved {
        /// The data.
        value: T,
        /// Index of the winning candidate.
        index: usize,
        /// Diagnostics.
        trace: CascadeTrace,
    },
    /// Every candidate failed.
    Exhausted {
        /// Diagnostics.
        trace: CascadeTrace,
    },
}

impl<T> CascadeOutcome<T> {
    /// Diagnostics for either outcome.
    #[must_use]
    pub fn trace(&self) -> &CascadeTrace {
        match self {
            Self::Resolved { trace, .. } | Self::Exhausted { trace } => trace,
        }
    }

    /// The resolved value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Resolved { value, .. } => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    /// Whether every candidate failed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Send one request and return its opened, non-empty payload.
///
/// This is the unit of work for one HTTP candidate: non-success statuses
/// and empty payloads become errors here so the cascade can move on.
pub async fn fetch_payload(
    transport: &dyn HttpTransport,
    request: &Request,
) -> Result<Value, VerifyError> {
    let body = fetch_raw(transport, request).await?;
    let payload = ResponseEnvelope::open(body).into_payload();
    if is_empty_body(&payload) {
        return Err(VerifyError::EmptyResponse {
            endpoint: request.url.clone(),
        });
    }
    Ok(payload)
}

/// Send one request and return its non-empty body exactly as served.
///
/// Used for stored documents, whose bytes are hashed as-is and must not
/// lose a `data`/`result` layer.
pub async fn fetch_raw(
    transport: &dyn HttpTransport,
    request: &Request,
) -> Result<Value, VerifyError> {
    let response = transport.send(request).await?;
    if !response.is_success() {
        return Err(VerifyError::UpstreamStatus {
            endpoint: request.url.clone(),
            status: response.status,
        });
    }
    let body = response.body.unwrap_or(Value::Null);
    if is_empty_body(&body) {
        return Err(VerifyError::EmptyResponse {
            endpoint: request.url.clone(),
        });
    }
    Ok(body)
}

/// Ordered-fallback resolver over a shared transport.
#[derive(Clone)]
pub struct EndpointCascade {
    transport: Arc<dyn HttpTransport>,
}

impl EndpointCascade {
    /// Create a resolver over `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// The shared transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Try HTTP candidates in order; first non-empty payload wins.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn try_endpoints(
        &self,
        operation: &str,
        candidates: &[Request],
    ) -> CascadeOutcome<Value> {
        let transport = self.transport.as_ref();
        Self::resolve(operation, candidates, |request| fetch_payload(transport, request)).await
    }

    /// Like [`try_endpoints`](Self::try_endpoints), but bodies are returned
    /// unopened.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn try_endpoints_raw(
        &self,
        operation: &str,
        candidates: &[Request],
    ) -> CascadeOutcome<Value> {
        let transport = self.transport.as_ref();
        Self::resolve(operation, candidates, |request| fetch_raw(transport, request)).await
    }

    /// Like [`try_endpoints`](Self::try_endpoints), but a payload that does
    /// not decode into `T` also counts as a failed candidate.
    pub async fn try_endpoints_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        candidates: &[Request],
    ) -> CascadeOutcome<T> {
        let transport = self.transport.as_ref();
        Self::resolve(operation, candidates, |request| async move {
            let payload = fetch_payload(transport, request).await?;
            serde_json::from_value::<T>(payload).map_err(|e| VerifyError::Decode {
                endpoint: request.url.clone(),
                message: e.to_string(),
            })
        })
        .await
    }

    /// Generic resolution over any ordered candidate strategy.
    ///
    /// `attempt` is called for each candidate in order until one returns
    /// `Ok`. Errors are recorded and swallowed.
    pub async fn resolve<'a, C, T, F, Fut>(
        operation: &str,
        candidates: &'a [C],
        mut attempt: F,
    ) -> CascadeOutcome<T>
    where
        C: Candidate,
        F: FnMut(&'a C) -> Fut,
        Fut: Future<Output = Result<T, VerifyError>>,
    {
        let mut trace = CascadeTrace::new(operation);

        for (index, candidate) in candidates.iter().enumerate() {
            let label = candidate.label();
            let started = Instant::now();
            debug!(operation, candidate = %label, index, "Trying candidate");

            let result = attempt(candidate).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    info!(operation, candidate = %label, index, elapsed_ms, "Candidate succeeded");
                    trace.attempts.push(CandidateAttempt {
                        label,
                        outcome: AttemptOutcome::Success,
                        elapsed_ms,
                    });
                    return CascadeOutcome::Resolved {
                        value,
                        index,
                        trace,
                    };
                },
                Err(e) => {
                    if e.is_recoverable() {
                        warn!(operation, candidate = %label, error = %e, "Candidate failed, trying next");
                    } else {
                        error!(operation, candidate = %label, error = %e, "Candidate failed with non-transport error");
                    }
                    trace.attempts.push(CandidateAttempt {
                        label,
                        outcome: AttemptOutcome::from(&e),
                        elapsed_ms,
                    });
                },
            }
        }

        warn!(operation, attempts = trace.attempted(), "All candidates exhausted");
        CascadeOutcome::Exhausted { trace }
    }
}
