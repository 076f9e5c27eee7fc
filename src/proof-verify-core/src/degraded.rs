//! Degraded-mode synthesis.
//!
//! When the witness network cannot be consulted, the engine still answers,
//! but with a result that is clearly flagged as synthesized
//! (`is_degraded = true`) and that is reproducible: the witness count and
//! positions come from a ChaCha20 stream seeded by
//!
//! ```text
//! SHA-256( DOMAIN_TAG || location || timestamp || chain context )
//! ```
//!
//! so the same inputs always yield the same result. The synthesized count
//! goes through the same scorer as an observed one.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cascade::CascadeTrace;
use crate::consensus::ScoringPolicy;
use crate::geo::{centroid, GeoPoint};
use crate::types::{DegradedReason, NodeType, VerificationResult, WitnessNode};

/// Domain separation tag for the seed.
const DOMAIN_TAG: &[u8] = b"proof-verify/degraded-witness/v1";

/// Fraction of the tolerance within which synthesized witnesses are placed,
/// keeping their centroid inside the tolerance.
const PLACEMENT_FRACTION: f64 = 0.5;

/// Deterministic generator of degraded verification results.
#[derive(Debug, Clone)]
pub struct DegradedSynthesizer {
    policy: ScoringPolicy,
    node_range: (u32, u32),
    tolerance_m: f64,
}

impl DegradedSynthesizer {
    /// Create a synthesizer. `node_range` is inclusive.
    ///
    /// A tolerance that is not a positive finite number places every
    /// synthesized witness on the claimed point.
    pub fn new(policy: ScoringPolicy, node_range: (u32, u32), tolerance_m: f64) -> Self {
        let (lo, hi) = node_range;
        let tolerance_m = if tolerance_m.is_finite() && tolerance_m > 0.0 {
            tolerance_m
        } else {
            0.0
        };
        Self {
            policy,
            node_range: (lo.min(hi), lo.max(hi)),
            tolerance_m,
        }
    }

    /// Synthesize a flagged result.
    ///
    /// `chain_context` is whatever identifies the event (normally the proof
    /// identifier as given). `trace`, if any, is attached to the diagnostics.
    pub fn synthesize(
        &self,
        claimed_location: Option<GeoPoint>,
        claimed_timestamp: Option<i64>,
        chain_context: &str,
        reason: DegradedReason,
        trace: Option<&CascadeTrace>,
    ) -> VerificationResult {
        let seed = seed_for(claimed_location, claimed_timestamp, chain_context);
        let mut rng = ChaCha20Rng::from_seed(seed);

        let (lo, hi) = self.node_range;
        let node_count = rng.gen_range(lo..=hi);

        let witnesses: Vec<WitnessNode> = (0..node_count)
            .map(|i| {
                let approximate_location = claimed_location.map(|origin| {
                    let bearing = rng.gen_range(0.0..360.0);
                    let distance = rng.gen_range(0.0..=self.tolerance_m * PLACEMENT_FRACTION);
                    origin.offset(bearing, distance)
                });
                let node_type = if rng.gen_bool(0.5) {
                    NodeType::RelayA
                } else {
                    NodeType::RelayB
                };
                WitnessNode {
                    address: format!("degraded-{:02}-{:08x}", i, rng.gen::<u32>()),
                    approximate_location,
                    node_type,
                    corroborated: true,
                }
            })
            .collect();

        let (location_match, distance) = match claimed_location {
            Some(claimed) => {
                let points: Vec<GeoPoint> = witnesses.iter().filter_map(|w| w.approximate_location).collect();
                let distance = centroid(&points).map(|c| claimed.distance_m(&c));
                (distance.is_some_and(|d| d <= self.tolerance_m), distance)
            },
            None => (false, None),
        };

        let score = self
            .policy
            .score(node_count, claimed_location.map(|_| location_match));

        warn!(
            reason = %reason,
            node_count,
            confidence = score.confidence_percent,
            "Returning synthesized verification result"
        );

        VerificationResult {
            verified: score.verified,
            confidence_percent: score.confidence_percent,
            node_count,
            consensus_tier: score.tier,
            location_match,
            distance_from_claimed_meters: distance,
            is_degraded: true,
            degraded_reason: Some(reason),
            witnesses,
            source_detail: json!({
                "mode": "degraded",
                "reason": reason,
                "seed": hex::encode(&seed[..8]),
                "cascade": trace,
            }),
        }
    }
}

/// Seed derived from the synthesis inputs.
fn seed_for(location: Option<GeoPoint>, timestamp: Option<i64>, context: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    match location {
        Some(p) => {
            hasher.update([1u8]);
            hasher.update(p.lat.to_bits().to_be_bytes());
            hasher.update(p.lon.to_bits().to_be_bytes());
        },
        None => hasher.update([0u8]),
    }
    match timestamp {
        Some(t) => {
            hasher.update([1u8]);
            hasher.update(t.to_be_bytes());
        },
        None => hasher.update([0u8]),
    }
    hasher.update((context.len() as u64).to_be_bytes());
    hasher.update(context.as_bytes());
    hasher.finalize().into()
}
