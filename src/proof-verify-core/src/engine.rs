//! The proof verification engine.
//!
//! [`ProofEngine`] exposes the four read-only operations. None of them
//! returns an error: every failure is folded into the structured result
//! (degraded verification, partial chain, unknown block, inconclusive
//! verdict). Each operation is bounded by the configured request deadline.

use std::future::Future;
use std::sync::Arc;

use proof_hash::ContentHash;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::block::BlockLocator;
use crate::chain::ChainWalker;
use crate::config::EngineConfig;
use crate::content::{ContentStore, HttpContentStore};
use crate::error::VerifyError;
use crate::geo::GeoPoint;
use crate::ledger::{HttpLedgerReader, LedgerReader};
use crate::tamper::TamperDetector;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{
    BlockLookup, ChainTermination, DegradedReason, ProvenanceChain, TamperVerdict, VerificationResult,
};
use crate::witness::WitnessClient;

/// Read-only verification over the witness network, ledger and content store.
pub struct ProofEngine {
    config: EngineConfig,
    witness: WitnessClient,
    walker: ChainWalker,
    locator: BlockLocator,
    detector: TamperDetector,
}

impl ProofEngine {
    /// Create an engine talking HTTP to the configured upstreams.
    pub fn new(config: EngineConfig) -> Result<Self, VerifyError> {
        config.validate()?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.connect_timeout)?);
        let ledger: Arc<dyn LedgerReader> = Arc::new(HttpLedgerReader::new(transport.clone(), &config.ledger));
        let content: Arc<dyn ContentStore> = Arc::new(HttpContentStore::new(transport.clone(), &config.content));
        Self::with_collaborators(config, transport, ledger, content)
    }

    /// Create an engine over explicit collaborators.
    ///
    /// The configuration is validated here as well.
    pub fn with_collaborators(
        config: EngineConfig,
        transport: Arc<dyn HttpTransport>,
        ledger: Arc<dyn LedgerReader>,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, VerifyError> {
        config.validate()?;
        info!(
            witness_enabled = config.witness.enabled,
            witness_routes = config.witness.routes.len(),
            ledger_routes = config.ledger.routes.len(),
            gateways = config.content.gateways.len(),
            "Proof engine initialized"
        );
        Ok(Self {
            witness: WitnessClient::new(transport, &config.witness, config.scoring.clone()),
            walker: ChainWalker::new(ledger.clone()),
            locator: BlockLocator::new(ledger.clone(), config.ledger.block_scan_cap),
            detector: TamperDetector::new(ledger, content, config.content.volatile_fields.clone()),
            config,
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `work` under the request deadline.
    async fn bounded<F: Future>(&self, operation: &str, work: F) -> Result<F::Output, VerifyError> {
        tokio::time::timeout(self.config.request_deadline, work)
            .await
            .map_err(|_| VerifyError::DeadlineExceeded {
                operation: operation.to_string(),
            })
    }

    /// Check whether independent witnesses corroborate a proof's location.
    ///
    /// `claimed_timestamp` is Unix seconds.
    #[instrument(skip(self))]
    pub async fn verify_location(
        &self,
        proof_id: &str,
        claimed_location: Option<GeoPoint>,
        claimed_timestamp: Option<i64>,
    ) -> VerificationResult {
        let id = match parse_proof_id(proof_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed proof identifier");
                return self.witness.degraded(
                    proof_id.trim(),
                    claimed_location,
                    claimed_timestamp,
                    DegradedReason::InvalidProofId,
                    None,
                );
            },
        };

        let work = self.witness.verify(&id, claimed_location, claimed_timestamp);
        match self.bounded("verify_location", work).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, deadline_ms = self.config.request_deadline.as_millis() as u64, "Verification cut short");
                self.witness.degraded(
                    &id.to_string(),
                    claimed_location,
                    claimed_timestamp,
                    DegradedReason::DeadlineExceeded,
                    None,
                )
            },
        }
    }

    /// Follow back-links from a proof toward its chain origin.
    ///
    /// `max_depth` defaults to the configured depth.
    #[instrument(skip(self))]
    pub async fn walk_provenance_chain(&self, proof_id: &str, max_depth: Option<u32>) -> ProvenanceChain {
        let id = match parse_proof_id(proof_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed proof identifier");
                return ProvenanceChain {
                    links: Vec::new(),
                    termination: ChainTermination::InvalidIdentifier {
                        reason: e.to_string(),
                    },
                };
            },
        };

        let depth = max_depth.unwrap_or(self.config.ledger.default_max_depth);
        let deadline = Instant::now() + self.config.request_deadline;
        self.walker.walk(&id, depth, Some(deadline)).await
    }

    /// Find the block a transaction was committed in.
    #[instrument(skip(self))]
    pub async fn locate_commit_block(&self, tx_hash: &str) -> BlockLookup {
        let id = match ContentHash::from_hex(tx_hash) {
            Ok(id) => id,
            Err(e) => return BlockLookup::unknown(format!("invalid transaction hash: {}", e)),
        };

        match self.bounded("locate_commit_block", self.locator.locate(&id)).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Block location cut short");
                BlockLookup::unknown(e.to_string())
            },
        }
    }

    /// Compare a proof's anchored payload hash with its current stored copy.
    #[instrument(skip(self, held_record))]
    pub async fn detect_tampering(&self, proof_id: &str, held_record: &Value) -> TamperVerdict {
        let id = match parse_proof_id(proof_id) {
            Ok(id) => id,
            Err(e) => return TamperVerdict::inconclusive(None, e.to_string()),
        };

        match self.bounded("detect_tampering", self.detector.detect(&id, held_record)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Tamper check cut short");
                TamperVerdict::inconclusive(None, e.to_string())
            },
        }
    }
}

fn parse_proof_id(text: &str) -> Result<ContentHash, VerifyError> {
    Ok(ContentHash::from_hex(text)?)
}
