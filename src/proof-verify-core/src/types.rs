//! Result types returned by the four engine operations.
//!
//! All types serialize to camelCase JSON for the presentation layers.

use std::fmt;

use proof_hash::ContentHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::GeoPoint;

/// Relay class of a witness node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Relay type A.
    #[serde(rename = "relay-type-A", alias = "A", alias = "relayA", alias = "relay_a")]
    RelayA,
    /// Relay type B.
    #[serde(rename = "relay-type-B", alias = "B", alias = "relayB", alias = "relay_b")]
    RelayB,
}

/// A witness node report. Produced fresh per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessNode {
    /// Node address.
    #[serde(alias = "id", alias = "nodeId", alias = "node_id")]
    pub address: String,
    /// Where the node reports itself to be.
    #[serde(default, alias = "location", alias = "approximate_location")]
    pub approximate_location: Option<GeoPoint>,
    /// Relay class.
    #[serde(alias = "type", alias = "node_type")]
    pub node_type: NodeType,
    /// Whether the node corroborated the claim. Absent means no.
    #[serde(default, alias = "verified", alias = "witnessed")]
    pub corroborated: bool,
}

/// Coarse confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusTier {
    /// Confidence below the medium threshold.
    Low,
    /// Confidence at or above the medium threshold.
    Medium,
    /// Confidence at or above the high threshold.
    High,
}

impl fmt::Display for ConsensusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Why a verification result was synthesized instead of observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DegradedReason {
    /// The witness feature is switched off by configuration.
    AdministrativelyDisabled,
    /// Every witness endpoint failed.
    EndpointsExhausted,
    /// A query succeeded but returned no usable witness nodes.
    NoUsableWitnesses,
    /// The caller's deadline elapsed before the network answered.
    DeadlineExceeded,
    /// The proof identifier could not be parsed.
    InvalidProofId,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AdministrativelyDisabled => "witness network disabled",
            Self::EndpointsExhausted => "witness endpoints unreachable",
            Self::NoUsableWitnesses => "no usable witness reports",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::InvalidProofId => "invalid proof identifier",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of a location verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Final verdict.
    pub verified: bool,
    /// Confidence 0-100.
    pub confidence_percent: u8,
    /// Number of corroborating witnesses.
    pub node_count: u32,
    /// Confidence bucket.
    pub consensus_tier: ConsensusTier,
    /// Whether the witnesses place the event at the claimed location.
    /// Always `false` when no location was claimed.
    pub location_match: bool,
    /// Distance from the claimed location to the witness centroid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_claimed_meters: Option<f64>,
    /// `true` means synthesized, not observed.
    pub is_degraded: bool,
    /// Why the result is degraded, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<DegradedReason>,
    /// Witnesses the count was derived from.
    #[serde(default)]
    pub witnesses: Vec<WitnessNode>,
    /// Opaque diagnostics (endpoint trace, raw response). Not part of the verdict.
    #[serde(default)]
    pub source_detail: Value,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_degraded {
            write!(f, "[DEGRADED")?;
            if let Some(reason) = self.degraded_reason {
                write!(f, ": {}", reason)?;
            }
            write!(f, "] ")?;
        }
        write!(
            f,
            "{} ({}% confidence, {} consensus, {} witnesses)",
            if self.verified { "VERIFIED" } else { "NOT VERIFIED" },
            self.confidence_percent,
            self.consensus_tier,
            self.node_count
        )
    }
}

/// One anchored record in a provenance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    /// Record hash.
    pub hash: ContentHash,
    /// Distance from the starting record (0 = the proof itself).
    pub depth: u32,
    /// Back-link as recorded on the ledger, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Anchored payload commitment, when the record carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<ContentHash>,
    /// Committed block, when the record embeds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Raw ledger record.
    #[serde(default)]
    pub record: Value,
}

/// Why a chain walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChainTermination {
    /// Reached a record with no predecessor.
    Origin,
    /// A record in the chain could not be fetched.
    NotFound {
        /// Hash that was missing.
        hash: ContentHash,
    },
    /// Stopped at the depth ceiling.
    DepthLimit,
    /// A back-link was not a valid hash.
    MalformedLink {
        /// The offending back-link value.
        link: String,
    },
    /// A back-link pointed to a record already visited.
    Cycle {
        /// Hash that repeated.
        hash: ContentHash,
    },
    /// The caller's deadline elapsed mid-walk.
    DeadlineExceeded,
    /// The starting identifier could not be parsed.
    InvalidIdentifier {
        /// Parser message.
        reason: String,
    },
}

/// Result of a provenance walk: links newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceChain {
    /// Links from the starting record back toward the origin.
    pub links: Vec<ChainLink>,
    /// Why the walk stopped.
    pub termination: ChainTermination,
}

impl ProvenanceChain {
    /// Whether the walk reached the chain origin.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.termination == ChainTermination::Origin
    }

    /// Hashes in walk order.
    #[must_use]
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.links.iter().map(|l| l.hash).collect()
    }
}

/// How a block location was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocateStrategy {
    /// The record carries its committed block.
    EmbeddedField,
    /// The ledger answered a hash-to-block lookup.
    DirectLookup,
    /// Found by scanning the record's validity window.
    WindowScan,
    /// Not found, and the validity window is still open.
    PendingWindow,
}

/// Where a record was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLocation {
    /// Committing block; for pending records, the earliest block it may land in.
    pub block_number: u64,
    /// `false` while the commitment window is still open.
    pub is_committed: bool,
    /// Strategy that produced this answer.
    pub strategy: LocateStrategy,
}

/// Result of a block lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum BlockLookup {
    /// Committed or pending location.
    Located(BlockLocation),
    /// No strategy could place the record.
    Unknown {
        /// Why.
        reason: String,
    },
}

impl BlockLookup {
    /// The committed block number, if committed.
    #[must_use]
    pub fn committed_block(&self) -> Option<u64> {
        match self {
            Self::Located(loc) if loc.is_committed => Some(loc.block_number),
            _ => None,
        }
    }

    pub(crate) fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown {
            reason: reason.into(),
        }
    }
}

/// Tamper check verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Recomputed hash equals the anchored hash.
    Verified,
    /// Recomputed hash differs from the anchored hash.
    Tampered,
    /// One side of the comparison could not be obtained.
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "VERIFIED"),
            Self::Tampered => write!(f, "TAMPERED"),
            Self::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Full tamper check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperVerdict {
    /// Verdict.
    pub verdict: Verdict,
    /// Hash anchored on the ledger.
    pub expected_hash: Option<ContentHash>,
    /// Hash recomputed from the fetched payload.
    pub recomputed_hash: Option<ContentHash>,
    /// Human-readable account of the decision.
    pub explanation: String,
    /// Content reference that was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_ref: Option<String>,
    /// Hash the stored copy claims for itself. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_reported_hash: Option<String>,
    /// Whether that self-reported hash equals the anchored hash. Never decides the verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_matches_chain: Option<bool>,
    /// Fields stripped before re-hashing.
    #[serde(default)]
    pub stripped_fields: Vec<String>,
}

impl TamperVerdict {
    pub(crate) fn inconclusive(expected: Option<ContentHash>, explanation: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Inconclusive,
            expected_hash: expected,
            recomputed_hash: None,
            explanation: explanation.into(),
            payload_ref: None,
            self_reported_hash: None,
            label_matches_chain: None,
            stripped_fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_witness_node_aliases() {
        let node: WitnessNode = serde_json::from_value(json!({
            "id": "w1",
            "location": {"lat": 52.5, "lng": 13.4},
            "type": "A",
            "verified": true
        }))
        .unwrap();
        assert_eq!(node.address, "w1");
        assert_eq!(node.node_type, NodeType::RelayA);
        assert!(node.corroborated);
        assert!(node.approximate_location.is_some());
    }

    #[test]
    fn test_witness_node_corroborated_defaults_false() {
        let node: WitnessNode =
            serde_json::from_value(json!({"address": "w2", "nodeType": "relay-type-B"})).unwrap();
        assert!(!node.corroborated);
        assert_eq!(node.node_type, NodeType::RelayB);
    }

    #[test]
    fn test_degraded_display_is_labelled() {
        let result = VerificationResult {
            verified: true,
            confidence_percent: 85,
            node_count: 3,
            consensus_tier: ConsensusTier::Medium,
            location_match: true,
            distance_from_claimed_meters: Some(12.0),
            is_degraded: true,
            degraded_reason: Some(DegradedReason::EndpointsExhausted),
            witnesses: vec![],
            source_detail: Value::Null,
        };
        let text = result.to_string();
        assert!(text.starts_with("[DEGRADED: witness endpoints unreachable]"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isDegraded"], json!(true));
        assert_eq!(json["consensusTier"], json!("medium"));
    }

    #[test]
    fn test_block_lookup_committed_block() {
        let committed = BlockLookup::Located(BlockLocation {
            block_number: 7,
            is_committed: true,
            strategy: LocateStrategy::WindowScan,
        });
        let pending = BlockLookup::Located(BlockLocation {
            block_number: 7,
            is_committed: false,
            strategy: LocateStrategy::PendingWindow,
        });
        assert_eq!(committed.committed_block(), Some(7));
        assert_eq!(pending.committed_block(), None);
        assert_eq!(BlockLookup::unknown("x").committed_block(), None);
    }
}
