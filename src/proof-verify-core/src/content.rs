//! Content-store collaborator.
//!
//! Payloads live off-chain in a content-addressed store reachable through
//! one or more gateways. Gateways are tried in order; the first that serves
//! a non-empty JSON document wins. Documents are returned exactly as stored:
//! no response envelope is opened, since the anchored hash covers the whole
//! document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cascade::{AttemptOutcome, CascadeOutcome, EndpointCascade};
use crate::config::{ContentConfig, UrlTemplate};
use crate::error::VerifyError;
use crate::transport::{HttpTransport, Request};

/// Read access to off-chain payloads.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a payload by reference. `Ok(None)` means the store has no such
    /// payload.
    async fn payload_by_ref(&self, reference: &str) -> Result<Option<Value>, VerifyError>;
}

/// Content store over HTTP gateways.
pub struct HttpContentStore {
    cascade: EndpointCascade,
    gateways: Vec<UrlTemplate>,
    timeout: Duration,
}

impl HttpContentStore {
    /// Create a store from configuration.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ContentConfig) -> Self {
        Self {
            cascade: EndpointCascade::new(transport),
            gateways: config.gateways.clone(),
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    #[instrument(skip(self))]
    async fn payload_by_ref(&self, reference: &str) -> Result<Option<Value>, VerifyError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(VerifyError::invalid_input("empty content reference"));
        }

        let requests: Vec<Request> = self
            .gateways
            .iter()
            .map(|g| Request::get(g.render(&[("ref", reference)]), self.timeout))
            .collect();

        match self.cascade.try_endpoints_raw("content.payload", &requests).await {
            CascadeOutcome::Resolved { value, index, .. } => {
                debug!(gateway = index, "Payload fetched");
                Ok(Some(value))
            },
            CascadeOutcome::Exhausted { trace } => {
                let absent = !trace.attempts.is_empty()
                    && trace.attempts.iter().all(|a| {
                        matches!(a.outcome, AttemptOutcome::Status { code: 404 } | AttemptOutcome::Empty)
                    });
                if absent {
                    Ok(None)
                } else {
                    warn!(reference, attempts = trace.attempted(), "No gateway served the payload");
                    Err(VerifyError::Exhausted {
                        operation: trace.operation,
                        attempts: trace.attempts.len(),
                    })
                }
            },
        }
    }
}
