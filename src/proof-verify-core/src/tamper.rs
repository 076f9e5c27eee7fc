//! Tamper detection.
//!
//! Compares the payload hash anchored on the ledger with a hash recomputed
//! from the payload currently held off-chain:
//!
//! ```text
//! ledger record ──► anchored hash ─────────────────────────┐
//!       │                                                  ├─ ct_eq ─► verdict
//!       └─► payload ref ──► content store ──► strip ──► SHA-256 ┘
//! ```
//!
//! The stored copy's own `hash` label is reported but never trusted: an
//! edited payload whose label was left alone is still tampered.

use std::sync::Arc;

use proof_hash::{canonical_hash, strip_fields, ContentHash};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::content::ContentStore;
use crate::ledger::LedgerReader;
use crate::types::{TamperVerdict, Verdict};

/// Fields a stored copy may use to label its own hash.
const LABEL_KEYS: &[&str] = &["hash", "storedHash", "contentHash"];

/// Fields of a locally held record that may name the payload reference.
const HELD_REF_KEYS: &[&str] = &["payloadRef", "payload_ref", "cid"];

/// Anchored-versus-recomputed hash check.
#[derive(Clone)]
pub struct TamperDetector {
    ledger: Arc<dyn LedgerReader>,
    content: Arc<dyn ContentStore>,
    volatile_fields: Vec<String>,
}

impl TamperDetector {
    /// Create a detector stripping `volatile_fields` before hashing.
    pub fn new(ledger: Arc<dyn LedgerReader>, content: Arc<dyn ContentStore>, volatile_fields: Vec<String>) -> Self {
        Self {
            ledger,
            content,
            volatile_fields,
        }
    }

    /// Check `proof_id`. `held` is the caller's local copy of the record.
    #[instrument(skip(self, held), fields(proof = %proof_id))]
    pub async fn detect(&self, proof_id: &ContentHash, held: &Value) -> TamperVerdict {
        let record = match self.ledger.transaction_by_hash(proof_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return TamperVerdict::inconclusive(None, "proof record not found on ledger"),
            Err(e) => {
                warn!(error = %e, "Ledger unavailable");
                return TamperVerdict::inconclusive(None, format!("ledger unavailable: {}", e));
            },
        };

        let Some(expected) = record.payload_hash else {
            return TamperVerdict::inconclusive(None, "ledger record carries no payload hash");
        };

        let reference = record
            .payload_ref
            .clone()
            .or_else(|| held_reference(held))
            .unwrap_or_else(|| expected.to_hex());

        let payload = match self.content.payload_by_ref(&reference).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                return TamperVerdict {
                    payload_ref: Some(reference.clone()),
                    ..TamperVerdict::inconclusive(
                        Some(expected),
                        format!("payload {} not found in content store", reference),
                    )
                };
            },
            Err(e) => {
                warn!(reference = %reference, error = %e, "Content store unavailable");
                return TamperVerdict {
                    payload_ref: Some(reference),
                    ..TamperVerdict::inconclusive(Some(expected), format!("content store unavailable: {}", e))
                };
            },
        };

        let self_reported_hash = self_label(&payload).or_else(|| self_label(held));
        let label_matches_chain = self_reported_hash
            .as_deref()
            .map(|label| ContentHash::from_hex(label).is_ok_and(|h| h.ct_eq(&expected)));

        let (stripped, stripped_fields) = strip_fields(&payload, &self.volatile_fields);
        let recomputed = canonical_hash(&stripped);

        let (verdict, explanation) = if recomputed.ct_eq(&expected) {
            (Verdict::Verified, "recomputed payload hash matches the anchored hash".to_string())
        } else if label_matches_chain == Some(true) {
            (
                Verdict::Tampered,
                format!(
                    "recomputed hash {} differs from anchored {}; the stored hash label was left unchanged",
                    recomputed, expected
                ),
            )
        } else {
            (
                Verdict::Tampered,
                format!("recomputed hash {} differs from anchored {}", recomputed, expected),
            )
        };

        info!(verdict = %verdict, reference = %reference, "Tamper check complete");

        TamperVerdict {
            verdict,
            expected_hash: Some(expected),
            recomputed_hash: Some(recomputed),
            explanation,
            payload_ref: Some(reference),
            self_reported_hash,
            label_matches_chain,
            stripped_fields,
        }
    }
}

fn held_reference(held: &Value) -> Option<String> {
    HELD_REF_KEYS
        .iter()
        .find_map(|k| held.get(*k))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn self_label(value: &Value) -> Option<String> {
    LABEL_KEYS
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(Value::as_str)
        .map(str::to_string)
}
