//! End-to-end scenarios through the public engine API with in-memory
//! upstreams.

use std::sync::Arc;
use std::time::Duration;

use proof_hash::{canonical_hash, hash_bytes, ContentHash};
use serde_json::{json, Value};

use proof_verify_core::{
    score, BlockLookup, CascadeOutcome, ChainTermination, DegradedReason, EndpointCascade,
    EngineConfig, Fixture, GeoPoint, LocateStrategy, MemoryContentStore, MemoryLedger, ProofEngine,
    Request, ScriptedTransport, UrlTemplate, Verdict, WitnessRoute,
};

fn engine_with(
    config: EngineConfig,
    transport: ScriptedTransport,
    ledger: MemoryLedger,
    content: MemoryContentStore,
) -> ProofEngine {
    ProofEngine::with_collaborators(config, Arc::new(transport), Arc::new(ledger), Arc::new(content)).unwrap()
}

fn single_route_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.witness.routes = vec![WitnessRoute {
        query_url: "https://witness.test/query".into(),
        result_url: UrlTemplate::new("https://witness.test/result/{handle}"),
    }];
    config.witness.poll_delay = Duration::from_millis(1);
    config
}

// =============================================================================
// Endpoint cascade
// =============================================================================

#[tokio::test]
async fn cascade_stops_at_first_success() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail("https://one", "connection refused");
    transport.respond("https://two", 502, json!({"error": "bad gateway"}));
    transport.respond("https://three", 200, json!({"data": {"answer": 3}}));
    transport.respond("https://four", 200, json!({"data": {"answer": 4}}));
    let cascade = EndpointCascade::new(transport.clone());

    let candidates: Vec<Request> = ["https://one", "https://two", "https://three", "https://four"]
        .iter()
        .map(|u| Request::get(*u, Duration::from_secs(1)))
        .collect();
    let outcome = cascade.try_endpoints("scenario", &candidates).await;

    match outcome {
        CascadeOutcome::Resolved { value, index, trace } => {
            assert_eq!(value, json!({"answer": 3}));
            assert_eq!(index, 2);
            assert_eq!(trace.attempted(), 3);
        },
        CascadeOutcome::Exhausted { .. } => panic!("expected the third candidate to win"),
    }
    assert_eq!(transport.call_count("https://four"), 0);
    assert_eq!(
        transport.calls(),
        vec!["https://one", "https://two", "https://three"]
    );
}

// =============================================================================
// Location verification
// =============================================================================

#[tokio::test]
async fn all_witness_routes_failing_gives_flagged_degraded_result() {
    let engine = engine_with(
        EngineConfig::default(),
        ScriptedTransport::new(),
        MemoryLedger::new(),
        MemoryContentStore::new(),
    );
    let proof = hash_bytes(b"delivery-1").to_string();
    let claimed = GeoPoint::new(40.7128, -74.006).ok();

    let result = engine.verify_location(&proof, claimed, Some(1_714_557_600)).await;

    assert!(result.is_degraded);
    assert_eq!(result.degraded_reason, Some(DegradedReason::EndpointsExhausted));
    assert!((1..=6).contains(&result.node_count));
    let expected = score(result.node_count, Some(result.location_match));
    assert_eq!(result.verified, expected.verified);
    assert_eq!(result.confidence_percent, expected.confidence_percent);
    assert_eq!(result.consensus_tier, expected.tier);

    let again = engine.verify_location(&proof, claimed, Some(1_714_557_600)).await;
    assert_eq!(result, again);
}

#[tokio::test]
async fn handle_response_is_polled_and_scored() {
    let transport = ScriptedTransport::new();
    transport.respond("https://witness.test/query", 200, json!({"success": true, "data": {"queryHash": "qh-42"}}));
    let nodes: Vec<Value> = (0..5)
        .map(|i| {
            json!({
                "nodeId": format!("node-{}", i),
                "location": {"latitude": 51.5074, "longitude": -0.1278},
                "type": if i % 2 == 0 { "relay-type-A" } else { "relay-type-B" },
                "verified": true
            })
        })
        .collect();
    transport.respond("https://witness.test/result/qh-42", 200, json!({"result": {"witnesses": nodes}}));
    let engine = engine_with(single_route_config(), transport, MemoryLedger::new(), MemoryContentStore::new());

    let claimed = GeoPoint::new(51.5074, -0.1278).ok();
    let result = engine
        .verify_location(&hash_bytes(b"delivery-2").to_string(), claimed, None)
        .await;

    assert!(!result.is_degraded);
    assert_eq!(result.node_count, 5);
    assert_eq!(result.confidence_percent, 95);
    assert!(result.location_match);
    assert!(result.verified);
}

#[tokio::test(start_paused = true)]
async fn slow_witness_network_hits_deadline() {
    let transport = ScriptedTransport::new();
    transport.respond_after(
        "https://witness.test/query",
        Duration::from_secs(60),
        200,
        json!({"witnesses": []}),
    );
    let mut config = single_route_config();
    config.request_deadline = Duration::from_millis(500);
    let engine = engine_with(config, transport, MemoryLedger::new(), MemoryContentStore::new());

    let result = engine
        .verify_location(&hash_bytes(b"delivery-3").to_string(), None, None)
        .await;

    assert!(result.is_degraded);
    assert_eq!(result.degraded_reason, Some(DegradedReason::DeadlineExceeded));
}

// =============================================================================
// Provenance chain
// =============================================================================

#[tokio::test]
async fn chain_abc_def_origin() {
    let abc = hash_bytes(b"abc");
    let def = hash_bytes(b"def");
    let ledger = MemoryLedger::new()
        .with_record(abc, json!({"hash": abc.to_string(), "link": {"previous": def.to_string()}}))
        .with_record(def, json!({"hash": def.to_string(), "link": {"previous": format!("0x{}", "0".repeat(64))}}));
    let engine = engine_with(EngineConfig::default(), ScriptedTransport::new(), ledger, MemoryContentStore::new());

    let chain = engine.walk_provenance_chain(&abc.to_string(), Some(5)).await;

    assert_eq!(chain.hashes(), vec![abc, def]);
    assert_eq!(chain.termination, ChainTermination::Origin);
}

#[tokio::test]
async fn chain_uses_configured_default_depth() {
    let hashes: Vec<ContentHash> = (0u8..6).map(|i| hash_bytes(&[i])).collect();
    let ledger = hashes.iter().enumerate().fold(MemoryLedger::new(), |ledger, (i, h)| {
        let previous = hashes.get(i + 1).map(|p| p.to_string());
        ledger.with_record(*h, json!({"hash": h.to_string(), "previous": previous}))
    });
    let mut config = EngineConfig::default();
    config.ledger.default_max_depth = 2;
    let engine = engine_with(config, ScriptedTransport::new(), ledger, MemoryContentStore::new());

    let chain = engine.walk_provenance_chain(&hashes[0].to_string(), None).await;

    assert_eq!(chain.links.len(), 3);
    assert_eq!(chain.termination, ChainTermination::DepthLimit);
}

// =============================================================================
// Block location (via fixture file)
// =============================================================================

#[tokio::test]
async fn fixture_block_scan_reports_pending() {
    let tx = hash_bytes(b"tx-pending");
    let other = hash_bytes(b"tx-other");
    let fixture = json!({
        "records": [{
            "hash": tx.to_string(),
            "blockNumber": "unconfirmed",
            "validity": {"notBefore": 1000, "expiry": 1100}
        }],
        "blocks": [
            {"number": 1000, "transactions": [other.to_string()]},
            {"number": 1001, "transactions": []}
        ],
        "head": 1001
    });
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.json");
    std::fs::write(&path, fixture.to_string()).unwrap();

    let (transport, ledger, content) = Fixture::from_json_file(&path).unwrap().into_collaborators().unwrap();
    let engine = engine_with(EngineConfig::default(), transport, ledger, content);

    match engine.locate_commit_block(&tx.to_string()).await {
        BlockLookup::Located(loc) => {
            assert!(!loc.is_committed);
            assert_eq!(loc.strategy, LocateStrategy::PendingWindow);
            assert_eq!(loc.block_number, 1002);
        },
        other => panic!("expected pending location, got {:?}", other),
    }
}

#[tokio::test]
async fn block_scan_finds_committed_block() {
    let tx = hash_bytes(b"tx-committed");
    let ledger = MemoryLedger::new()
        .with_record(tx, json!({"hash": tx.to_string(), "blockNumber": null, "validity": {"notBefore": 7, "expiry": 9}}))
        .with_block(7, vec![])
        .with_block(8, vec![tx]);
    let engine = engine_with(EngineConfig::default(), ScriptedTransport::new(), ledger, MemoryContentStore::new());

    let lookup = engine.locate_commit_block(&tx.to_string()).await;
    assert_eq!(lookup.committed_block(), Some(8));
}

// =============================================================================
// Tamper detection
// =============================================================================

fn delivery_payload() -> Value {
    json!({
        "parcelId": "PX-1001",
        "recipient": "Dock 4",
        "items": [{"sku": "A-1", "qty": 3}, {"sku": "B-7", "qty": 1}]
    })
}

fn anchored_ledger(proof: ContentHash) -> MemoryLedger {
    MemoryLedger::new().with_record(
        proof,
        json!({
            "hash": proof.to_string(),
            "link": {"payloadHash": canonical_hash(&delivery_payload()).to_string(), "payloadRef": "bafy-delivery"}
        }),
    )
}

#[tokio::test]
async fn altered_payload_with_unchanged_label_is_tampered() {
    let proof = hash_bytes(b"proof-tamper");
    let mut stored = delivery_payload();
    stored["items"][0]["qty"] = json!(2);
    stored["hash"] = json!(canonical_hash(&delivery_payload()).to_string());
    let content = MemoryContentStore::new().with_payload("bafy-delivery", stored);
    let engine = engine_with(EngineConfig::default(), ScriptedTransport::new(), anchored_ledger(proof), content);

    let verdict = engine.detect_tampering(&proof.to_string(), &json!({})).await;

    assert_eq!(verdict.verdict, Verdict::Tampered);
    assert_eq!(verdict.label_matches_chain, Some(true));
}

#[tokio::test]
async fn volatile_fields_do_not_affect_verdict() {
    let proof = hash_bytes(b"proof-clean");
    let mut stored = delivery_payload();
    stored["_id"] = json!("db-77");
    stored["createdAt"] = json!("2024-05-01T08:00:00Z");
    stored["metadata"] = json!({"replicas": 3});
    let content = MemoryContentStore::new().with_payload("bafy-delivery", stored);
    let engine = engine_with(EngineConfig::default(), ScriptedTransport::new(), anchored_ledger(proof), content);

    let verdict = engine.detect_tampering(&proof.to_string(), &json!({})).await;

    assert_eq!(verdict.verdict, Verdict::Verified);
    assert_eq!(verdict.stripped_fields.len(), 3);
}

#[tokio::test]
async fn unreachable_ledger_is_inconclusive_not_tampered() {
    let proof = hash_bytes(b"proof-offline");
    let ledger = anchored_ledger(proof).with_unreachable(proof);
    let engine = engine_with(EngineConfig::default(), ScriptedTransport::new(), ledger, MemoryContentStore::new());

    let verdict = engine.detect_tampering(&proof.to_string(), &json!({})).await;
    assert_eq!(verdict.verdict, Verdict::Inconclusive);
}
