//! Property-based tests for scoring, degraded synthesis and ledger walks.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use proof_hash::{hash_bytes, ContentHash};
use proof_verify_core::{
    score, BlockLocator, ChainTermination, ChainWalker, ConsensusTier, DegradedReason,
    DegradedSynthesizer, GeoPoint, MemoryLedger, ScoringPolicy,
};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

/// Strategy for valid coordinates.
fn geo_point() -> impl Strategy<Value = GeoPoint> {
    (-89.0f64..89.0, -179.0f64..179.0).prop_map(|(lat, lon)| GeoPoint::new(lat, lon).unwrap())
}

/// Linear chain of `len` back-links (len + 1 records), newest first.
fn linear_chain(len: usize) -> (MemoryLedger, Vec<ContentHash>) {
    let hashes: Vec<ContentHash> = (0..=len).map(|i| hash_bytes(format!("record-{}", i).as_bytes())).collect();
    let ledger = hashes.iter().enumerate().fold(MemoryLedger::new(), |ledger, (i, h)| {
        let previous = hashes
            .get(i + 1)
            .map_or_else(|| "0x0".to_string(), ContentHash::to_string);
        ledger.with_record(*h, json!({"hash": h.to_string(), "link": {"previous": previous}}))
    });
    (ledger, hashes)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 200,
        ..ProptestConfig::default()
    })]

    // ========================================================================
    // Consensus Scoring
    // ========================================================================

    /// Five or more witnesses always score 95 / high.
    #[test]
    fn scoring_five_plus_is_high(nodes in 5u32..10_000) {
        let s = score(nodes, None);
        prop_assert_eq!(s.confidence_percent, 95);
        prop_assert_eq!(s.tier, ConsensusTier::High);
        prop_assert!(s.verified);
    }

    /// Zero witnesses never verify, whatever the location outcome.
    #[test]
    fn scoring_zero_never_verifies(location_match in proptest::option::of(any::<bool>())) {
        prop_assert!(!score(0, location_match).verified);
    }

    /// Confidence never decreases as witnesses are added.
    #[test]
    fn scoring_is_monotonic(a in 0u32..50, b in 0u32..50) {
        let (lo, hi) = (a.min(b), a.max(b));
        prop_assert!(score(lo, None).confidence_percent <= score(hi, None).confidence_percent);
    }

    // ========================================================================
    // Degraded Synthesis
    // ========================================================================

    /// Identical inputs give identical synthesized results.
    #[test]
    fn degraded_is_deterministic(
        location in proptest::option::of(geo_point()),
        timestamp in proptest::option::of(any::<i64>()),
        context in "[a-z0-9]{0,24}",
    ) {
        let synth = DegradedSynthesizer::new(ScoringPolicy::default(), (1, 6), 500.0);
        let a = synth.synthesize(location, timestamp, &context, DegradedReason::EndpointsExhausted, None);
        let b = synth.synthesize(location, timestamp, &context, DegradedReason::EndpointsExhausted, None);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.is_degraded);
        prop_assert!((1..=6).contains(&a.node_count));
        let expected = ScoringPolicy::default().score(a.node_count, location.map(|_| a.location_match));
        prop_assert_eq!(a.verified, expected.verified);
    }

    // ========================================================================
    // Chain Walking
    // ========================================================================

    /// Never more than max_depth + 1 links; short chains are walked fully.
    #[test]
    fn chain_respects_depth_bound(len in 0usize..12, max_depth in 0u32..12) {
        let (ledger, hashes) = linear_chain(len);
        let walker = ChainWalker::new(Arc::new(ledger));
        let chain = block_on(walker.walk(&hashes[0], max_depth, None));

        prop_assert!(chain.links.len() <= max_depth as usize + 1);
        if len <= max_depth as usize {
            prop_assert_eq!(chain.links.len(), len + 1);
            prop_assert_eq!(chain.termination, ChainTermination::Origin);
        } else {
            prop_assert_eq!(chain.links.len(), max_depth as usize + 1);
            prop_assert_eq!(chain.termination, ChainTermination::DepthLimit);
        }
    }

    // ========================================================================
    // Block Location
    // ========================================================================

    /// A window scan never fetches more than the cap.
    #[test]
    fn block_scan_respects_cap(start in 0u64..1_000, width in 0u64..300, cap in 1u64..120) {
        let tx = hash_bytes(b"unplaced");
        let ledger = (start..=start + width).fold(
            MemoryLedger::new().with_record(
                tx,
                json!({"hash": tx.to_string(), "validity": {"notBefore": start, "expiry": start + width}}),
            ),
            |ledger, n| ledger.with_block(n, vec![]),
        );
        let ledger = Arc::new(ledger);
        let lookup = block_on(BlockLocator::new(ledger.clone(), cap).locate(&tx));

        prop_assert!(ledger.block_fetches() as u64 <= cap);
        prop_assert_eq!(lookup.committed_block(), None);
    }
}
