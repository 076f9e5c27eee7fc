//! Create/poll query bridge.
//!
//! Some witness APIs answer a query submission with a derived handle
//! instead of data. The bridge turns such an answer into data with exactly
//! one delayed lookup:
//!
//! ```text
//! POST query ──► {queryHash: h} ──sleep(poll_delay)──► GET result(h) ──► data
//!            └─► data (no handle) ─────────────────────────────────────► data
//! ```
//!
//! If the lookup fails or comes back empty, the submission payload itself is
//! returned. There is no retry loop; callers needing more certainty re-run
//! the whole operation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::cascade::fetch_payload;
use crate::config::UrlTemplate;
use crate::envelope::ResponseEnvelope;
use crate::error::VerifyError;
use crate::transport::{HttpTransport, Request};

/// Single-shot create/poll helper.
#[derive(Clone)]
pub struct QueryBridge {
    transport: Arc<dyn HttpTransport>,
    poll_delay: Duration,
    poll_timeout: Duration,
}

impl QueryBridge {
    /// Create a bridge.
    pub fn new(transport: Arc<dyn HttpTransport>, poll_delay: Duration, poll_timeout: Duration) -> Self {
        Self {
            transport,
            poll_delay,
            poll_timeout,
        }
    }

    /// Submit `request` and materialize a derived handle if one comes back.
    ///
    /// Fails only if the submission itself fails; a failed poll falls back
    /// to the submission payload.
    #[instrument(skip(self, request, result_url), fields(url = %request.url))]
    pub async fn submit_and_resolve(
        &self,
        request: &Request,
        result_url: &UrlTemplate,
    ) -> Result<Value, VerifyError> {
        let submitted = fetch_payload(self.transport.as_ref(), request).await?;
        let envelope = ResponseEnvelope::open(submitted);

        let Some(handle) = envelope.derived_handle() else {
            debug!("Submission returned data directly");
            return Ok(envelope.into_payload());
        };

        info!(handle = %handle, delay_ms = self.poll_delay.as_millis() as u64, "Submission returned handle, polling once");
        tokio::time::sleep(self.poll_delay).await;

        let poll = Request::get(result_url.render(&[("handle", &handle)]), self.poll_timeout);
        let polled = tokio::time::timeout(
            self.poll_timeout,
            fetch_payload(self.transport.as_ref(), &poll),
        )
        .await;

        match polled {
            Ok(Ok(data)) => {
                debug!(handle = %handle, "Poll materialized handle");
                Ok(ResponseEnvelope::open(data).into_payload())
            },
            Ok(Err(e)) => {
                warn!(handle = %handle, error = %e, "Poll failed, using submission response");
                Ok(envelope.into_payload())
            },
            Err(_) => {
                warn!(handle = %handle, timeout_ms = self.poll_timeout.as_millis() as u64, "Poll timed out, using submission response");
                Ok(envelope.into_payload())
            },
        }
    }
}
