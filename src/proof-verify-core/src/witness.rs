//! Witness network client.
//!
//! Asks the witness network whether independent nodes corroborate a
//! delivery event's location and time:
//!
//! ```text
//! routes ──► EndpointCascade ──► QueryBridge (submit, maybe poll once)
//!                  │                        │
//!             exhausted                 witness report
//!                  │                        │
//!                  ▼                        ▼
//!        DegradedSynthesizer       corroborated nodes ──► ScoringPolicy
//! ```
//!
//! A route counts as failed when its response carries no witness list at
//! all. A list with zero corroborating nodes is an answer, not a failure,
//! and yields a degraded result.

use std::sync::Arc;
use std::time::Duration;

use proof_hash::ContentHash;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::bridge::QueryBridge;
use crate::cascade::{Candidate, CascadeOutcome, CascadeTrace, EndpointCascade};
use crate::config::{WitnessConfig, WitnessRoute};
use crate::consensus::ScoringPolicy;
use crate::degraded::DegradedSynthesizer;
use crate::error::VerifyError;
use crate::geo::{centroid, GeoPoint};
use crate::transport::{HttpTransport, Request};
use crate::types::{DegradedReason, VerificationResult, WitnessNode};

/// Keys under which witness lists appear.
const LIST_KEYS: &[&str] = &["witnesses", "nodes", "witnessNodes", "witness_nodes"];

impl Candidate for WitnessRoute {
    fn label(&self) -> String {
        self.query_url.clone()
    }
}

/// Decoded witness answer.
#[derive(Debug, Clone, PartialEq)]
pub struct WitnessReport {
    /// Nodes that decoded.
    pub nodes: Vec<WitnessNode>,
    /// Entries that did not decode.
    pub dropped: usize,
    /// Payload as received.
    pub raw: Value,
}

impl WitnessReport {
    /// Decode a witness payload: a bare list, or an object holding one.
    pub fn parse(raw: Value) -> Result<Self, VerifyError> {
        let entries = match &raw {
            Value::Array(items) => items.clone(),
            Value::Object(map) => LIST_KEYS
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| VerifyError::Decode {
                    endpoint: "witness".into(),
                    message: "response carries no witness list".into(),
                })?,
            _ => {
                return Err(VerifyError::Decode {
                    endpoint: "witness".into(),
                    message: "response is neither a list nor an object".into(),
                })
            },
        };

        let total = entries.len();
        let nodes: Vec<WitnessNode> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        let dropped = total - nodes.len();
        if dropped > 0 {
            debug!(dropped, "Dropped undecodable witness entries");
        }

        Ok(Self { nodes, dropped, raw })
    }

    /// Nodes that corroborated the claim.
    pub fn corroborating(&self) -> impl Iterator<Item = &WitnessNode> {
        self.nodes.iter().filter(|n| n.corroborated)
    }
}

/// Location verification against the witness network.
pub struct WitnessClient {
    enabled: bool,
    routes: Vec<WitnessRoute>,
    timeout: Duration,
    tolerance_m: f64,
    bridge: QueryBridge,
    policy: ScoringPolicy,
    synthesizer: DegradedSynthesizer,
}

impl WitnessClient {
    /// Create a client.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &WitnessConfig, policy: ScoringPolicy) -> Self {
        Self {
            enabled: config.enabled,
            routes: config.routes.clone(),
            timeout: config.timeout,
            tolerance_m: config.location_tolerance_m,
            bridge: QueryBridge::new(transport, config.poll_delay, config.poll_timeout),
            synthesizer: DegradedSynthesizer::new(
                policy.clone(),
                config.degraded_node_range,
                config.location_tolerance_m,
            ),
            policy,
        }
    }

    /// Flagged substitute result for `reason`.
    pub fn degraded(
        &self,
        chain_context: &str,
        claimed_location: Option<GeoPoint>,
        claimed_timestamp: Option<i64>,
        reason: DegradedReason,
        trace: Option<&CascadeTrace>,
    ) -> VerificationResult {
        self.synthesizer
            .synthesize(claimed_location, claimed_timestamp, chain_context, reason, trace)
    }

    /// Verify a proof's claimed location and time.
    #[instrument(skip(self), fields(proof = %proof_id))]
    pub async fn verify(
        &self,
        proof_id: &ContentHash,
        claimed_location: Option<GeoPoint>,
        claimed_timestamp: Option<i64>,
    ) -> VerificationResult {
        let context = proof_id.to_string();
        if !self.enabled {
            info!("Witness network disabled by configuration");
            return self.degraded(
                &context,
                claimed_location,
                claimed_timestamp,
                DegradedReason::AdministrativelyDisabled,
                None,
            );
        }

        let body = query_body(proof_id, claimed_location, claimed_timestamp, self.tolerance_m);
        let (body, bridge, timeout) = (&body, &self.bridge, self.timeout);
        let outcome = EndpointCascade::resolve("witness.query", &self.routes, |route| async move {
            let request = Request::post(route.query_url.clone(), body.clone(), timeout);
            let data = bridge.submit_and_resolve(&request, &route.result_url).await?;
            WitnessReport::parse(data)
        })
        .await;

        let (report, trace) = match outcome {
            CascadeOutcome::Resolved { value, trace, .. } => (value, trace),
            CascadeOutcome::Exhausted { trace } => {
                return self.degraded(
                    &context,
                    claimed_location,
                    claimed_timestamp,
                    DegradedReason::EndpointsExhausted,
                    Some(&trace),
                );
            },
        };

        let witnesses: Vec<WitnessNode> = report.corroborating().cloned().collect();
        if witnesses.is_empty() {
            return self.degraded(
                &context,
                claimed_location,
                claimed_timestamp,
                DegradedReason::NoUsableWitnesses,
                Some(&trace),
            );
        }

        let node_count = u32::try_from(witnesses.len()).unwrap_or(u32::MAX);
        let distance = claimed_location.and_then(|claimed| {
            let points: Vec<GeoPoint> = witnesses.iter().filter_map(|w| w.approximate_location).collect();
            centroid(&points).map(|c| claimed.distance_m(&c))
        });
        let location_match = distance.is_some_and(|d| d <= self.tolerance_m);
        let score = self
            .policy
            .score(node_count, claimed_location.map(|_| location_match));

        info!(
            node_count,
            confidence = score.confidence_percent,
            tier = %score.tier,
            location_match,
            "Witness consensus computed"
        );

        VerificationResult {
            verified: score.verified,
            confidence_percent: score.confidence_percent,
            node_count,
            consensus_tier: score.tier,
            location_match,
            distance_from_claimed_meters: distance,
            is_degraded: false,
            degraded_reason: None,
            witnesses,
            source_detail: json!({
                "mode": "observed",
                "endpoint": trace.winner(),
                "droppedEntries": report.dropped,
                "cascade": trace,
                "response": report.raw,
            }),
        }
    }
}

fn query_body(
    proof_id: &ContentHash,
    claimed_location: Option<GeoPoint>,
    claimed_timestamp: Option<i64>,
    tolerance_m: f64,
) -> Value {
    let mut body = json!({
        "proofId": proof_id.to_string(),
        "toleranceMeters": tolerance_m,
    });
    if let Some(p) = claimed_location {
        body["claimedLocation"] = json!({"lat": p.lat, "lon": p.lon});
    }
    if let Some(t) = claimed_timestamp {
        body["claimedTimestamp"] = json!(t);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::UrlTemplate;
    use crate::memory::ScriptedTransport;
    use crate::types::ConsensusTier;

    fn config() -> WitnessConfig {
        WitnessConfig {
            routes: vec![
                WitnessRoute {
                    query_url: "https://w1/query".into(),
                    result_url: UrlTemplate::new("https://w1/result/{handle}"),
                },
                WitnessRoute {
                    query_url: "https://w2/query".into(),
                    result_url: UrlTemplate::new("https://w2/result/{handle}"),
                },
            ],
            poll_delay: Duration::from_millis(1),
            ..WitnessConfig::default()
        }
    }

    fn client(transport: Arc<ScriptedTransport>, config: &WitnessConfig) -> WitnessClient {
        WitnessClient::new(transport, config, ScoringPolicy::default())
    }

    fn node(id: &str, lat: f64, lon: f64, corroborated: bool) -> Value {
        json!({"address": id, "location": {"lat": lat, "lon": lon}, "nodeType": "relay-type-A", "corroborated": corroborated})
    }

    fn proof() -> ContentHash {
        ContentHash::from_bytes([0x5a; 32])
    }

    #[test]
    fn test_parse_report_shapes() {
        let bare = WitnessReport::parse(json!([node("a", 0.0, 0.0, true), {"junk": 1}])).unwrap();
        assert_eq!(bare.nodes.len(), 1);
        assert_eq!(bare.dropped, 1);

        let wrapped = WitnessReport::parse(json!({"nodes": [node("a", 0.0, 0.0, false)]})).unwrap();
        assert_eq!(wrapped.corroborating().count(), 0);

        assert!(WitnessReport::parse(json!({"queryHash": "h"})).is_err());
        assert!(WitnessReport::parse(json!("text")).is_err());
    }

    #[tokio::test]
    async fn test_observed_consensus() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "https://w1/query",
            200,
            json!({"data": {"witnesses": [
                node("a", 52.5200, 13.4050, true),
                node("b", 52.5201, 13.4049, true),
                node("c", 52.5199, 13.4051, true),
                node("d", 52.5300, 13.4000, false)
            ]}}),
        );
        let claimed = GeoPoint::new(52.52, 13.405).unwrap();

        let result = client(transport.clone(), &config())
            .verify(&proof(), Some(claimed), Some(1_700_000_000))
            .await;

        assert!(!result.is_degraded);
        assert_eq!(result.node_count, 3);
        assert_eq!(result.confidence_percent, 85);
        assert_eq!(result.consensus_tier, ConsensusTier::Medium);
        assert!(result.location_match);
        assert!(result.verified);
        assert_eq!(transport.call_count("https://w2/query"), 0);
    }

    #[tokio::test]
    async fn test_far_witnesses_do_not_verify() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "https://w1/query",
            200,
            json!([node("a", 48.85, 2.35, true), node("b", 48.85, 2.35, true), node("c", 48.85, 2.35, true), node("d", 48.85, 2.35, true), node("e", 48.85, 2.35, true)]),
        );
        let claimed = GeoPoint::new(52.52, 13.405).unwrap();

        let result = client(transport, &config()).verify(&proof(), Some(claimed), None).await;

        assert_eq!(result.confidence_percent, 95);
        assert!(!result.location_match);
        assert!(!result.verified);
        assert!(result.distance_from_claimed_meters.unwrap() > 800_000.0);
    }

    #[tokio::test]
    async fn test_handle_route_polled_then_scored() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail("https://w1/query", "refused");
        transport.respond("https://w2/query", 200, json!({"queryHash": "qh-1"}));
        transport.respond("https://w2/result/qh-1", 200, json!({"witnesses": [node("a", 1.0, 1.0, true)]}));

        let result = client(transport.clone(), &config()).verify(&proof(), None, None).await;

        assert!(!result.is_degraded);
        assert_eq!(result.node_count, 1);
        assert_eq!(result.confidence_percent, 70);
        assert!(!result.location_match);
        assert!(result.verified);
        assert_eq!(transport.call_count("https://w2/result/qh-1"), 1);
    }

    #[tokio::test]
    async fn test_zero_corroborating_is_degraded() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("https://w1/query", 200, json!({"witnesses": [node("a", 0.0, 0.0, false)]}));

        let result = client(transport.clone(), &config()).verify(&proof(), None, None).await;

        assert!(result.is_degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::NoUsableWitnesses));
        assert_eq!(transport.call_count("https://w2/query"), 0);
    }

    #[tokio::test]
    async fn test_disabled_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = WitnessConfig {
            enabled: false,
            ..config()
        };

        let result = client(transport.clone(), &config).verify(&proof(), None, None).await;

        assert!(result.is_degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::AdministrativelyDisabled));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_routes_degrade_with_trace() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("https://w1/query", 500, json!({"error": "boom"}));
        transport.respond("https://w2/query", 200, json!({"status": "accepted"}));

        let result = client(transport, &config()).verify(&proof(), None, None).await;

        assert!(result.is_degraded);
        assert_eq!(result.degraded_reason, Some(DegradedReason::EndpointsExhausted));
        assert_eq!(result.source_detail["cascade"]["attempts"].as_array().unwrap().len(), 2);
    }
}
