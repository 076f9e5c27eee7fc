//! Provenance chain walking.
//!
//! Each bound record may name its predecessor. Starting from a proof, the
//! walker follows those back-links toward the chain origin:
//!
//! ```text
//! proof (depth 0) ──previous──► record (depth 1) ──previous──► … ──► origin
//! ```
//!
//! The walk stops at the first of:
//!
//! 1. a record that cannot be fetched (partial result),
//! 2. a back-link that is absent, empty or all-zero (origin),
//! 3. the depth ceiling,
//! 4. a back-link to a record already visited (cycle),
//! 5. a back-link that is not a valid hash,
//! 6. the caller's deadline.
//!
//! At most `max_depth + 1` links are ever returned.

use std::collections::HashSet;
use std::sync::Arc;

use proof_hash::ContentHash;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::ledger::{BackLink, LedgerReader};
use crate::types::{ChainLink, ChainTermination, ProvenanceChain};

/// Follows back-links through the ledger.
#[derive(Clone)]
pub struct ChainWalker {
    ledger: Arc<dyn LedgerReader>,
}

impl ChainWalker {
    /// Create a walker.
    pub fn new(ledger: Arc<dyn LedgerReader>) -> Self {
        Self { ledger }
    }

    /// Walk back from `start`.
    ///
    /// `deadline` bounds every individual fetch; when it passes, the walk
    /// ends with what it has.
    #[instrument(skip(self), fields(start = %start))]
    pub async fn walk(&self, start: &ContentHash, max_depth: u32, deadline: Option<Instant>) -> ProvenanceChain {
        let mut links: Vec<ChainLink> = Vec::new();
        let mut visited: HashSet<ContentHash> = HashSet::new();
        let mut current = *start;
        let mut depth: u32 = 0;
        visited.insert(current);

        let termination = loop {
            if deadline.is_some_and(|at| Instant::now() >= at) {
                warn!(depth, "Deadline passed during chain walk");
                break ChainTermination::DeadlineExceeded;
            }
            let fetch = self.ledger.transaction_by_hash(&current);
            let fetched = match deadline {
                Some(at) => match tokio::time::timeout_at(at, fetch).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(depth, "Deadline passed during chain walk");
                        break ChainTermination::DeadlineExceeded;
                    },
                },
                None => fetch.await,
            };

            let record = match fetched {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(hash = %current, depth, "Record not on ledger");
                    break ChainTermination::NotFound { hash: current };
                },
                Err(e) => {
                    warn!(hash = %current, depth, error = %e, "Ledger fetch failed, ending walk");
                    break ChainTermination::NotFound { hash: current };
                },
            };

            let back_link = record.back_link();
            links.push(ChainLink {
                hash: record.hash,
                depth,
                previous: record.previous,
                payload_hash: record.payload_hash,
                block_number: record.committed_block,
                record: record.raw,
            });

            match back_link {
                BackLink::Origin => break ChainTermination::Origin,
                _ if depth >= max_depth => break ChainTermination::DepthLimit,
                BackLink::Next(next) => {
                    if !visited.insert(next) {
                        warn!(hash = %next, depth, "Back-link revisits an earlier record");
                        break ChainTermination::Cycle { hash: next };
                    }
                    current = next;
                    depth += 1;
                },
                BackLink::Malformed(link) => {
                    warn!(link = %link, depth, "Malformed back-link");
                    break ChainTermination::MalformedLink { link };
                },
            }
        };

        info!(links = links.len(), termination = ?termination, "Chain walk finished");
        ProvenanceChain { links, termination }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    use crate::memory::MemoryLedger;

    fn h(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; 32])
    }

    fn record(hash: ContentHash, previous: Value) -> Value {
        json!({"hash": hash.to_string(), "link": {"previous": previous}})
    }

    /// Linear chain h(n) -> h(n-1) -> ... -> h(1) -> origin.
    fn linear(n: u8) -> MemoryLedger {
        (1..=n).fold(MemoryLedger::new(), |ledger, i| {
            let prev = if i == 1 { Value::Null } else { json!(h(i - 1).to_string()) };
            ledger.with_record(h(i), record(h(i), prev))
        })
    }

    #[tokio::test]
    async fn test_walks_to_origin() {
        let walker = ChainWalker::new(Arc::new(linear(4)));
        let chain = walker.walk(&h(4), 10, None).await;

        assert_eq!(chain.hashes(), vec![h(4), h(3), h(2), h(1)]);
        assert_eq!(chain.termination, ChainTermination::Origin);
        assert!(chain.is_complete());
        assert_eq!(chain.links.last().map(|l| l.depth), Some(3));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let walker = ChainWalker::new(Arc::new(linear(6)));
        let chain = walker.walk(&h(6), 2, None).await;

        assert_eq!(chain.links.len(), 3);
        assert_eq!(chain.termination, ChainTermination::DepthLimit);
    }

    #[tokio::test]
    async fn test_depth_zero_returns_start_only() {
        let walker = ChainWalker::new(Arc::new(linear(3)));
        let chain = walker.walk(&h(3), 0, None).await;
        assert_eq!(chain.hashes(), vec![h(3)]);
        assert_eq!(chain.termination, ChainTermination::DepthLimit);
    }

    #[tokio::test]
    async fn test_missing_start_is_empty() {
        let walker = ChainWalker::new(Arc::new(MemoryLedger::new()));
        let chain = walker.walk(&h(9), 5, None).await;
        assert!(chain.links.is_empty());
        assert_eq!(chain.termination, ChainTermination::NotFound { hash: h(9) });
    }

    #[tokio::test]
    async fn test_missing_predecessor_is_partial() {
        let ledger = MemoryLedger::new().with_record(h(2), record(h(2), json!(h(1).to_string())));
        let chain = ChainWalker::new(Arc::new(ledger)).walk(&h(2), 5, None).await;
        assert_eq!(chain.hashes(), vec![h(2)]);
        assert_eq!(chain.termination, ChainTermination::NotFound { hash: h(1) });
    }

    #[tokio::test]
    async fn test_cycle_detected() {
        let ledger = MemoryLedger::new()
            .with_record(h(1), record(h(1), json!(h(2).to_string())))
            .with_record(h(2), record(h(2), json!(h(1).to_string())));
        let chain = ChainWalker::new(Arc::new(ledger)).walk(&h(1), 50, None).await;
        assert_eq!(chain.hashes(), vec![h(1), h(2)]);
        assert_eq!(chain.termination, ChainTermination::Cycle { hash: h(1) });
    }

    #[tokio::test]
    async fn test_malformed_link() {
        let ledger = MemoryLedger::new().with_record(h(1), record(h(1), json!("not-a-hash")));
        let chain = ChainWalker::new(Arc::new(ledger)).walk(&h(1), 5, None).await;
        assert_eq!(chain.links.len(), 1);
        assert_eq!(
            chain.termination,
            ChainTermination::MalformedLink {
                link: "not-a-hash".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_record_ends_walk() {
        let ledger = linear(3).with_unreachable(h(2));
        let chain = ChainWalker::new(Arc::new(ledger)).walk(&h(3), 5, None).await;
        assert_eq!(chain.hashes(), vec![h(3)]);
        assert_eq!(chain.termination, ChainTermination::NotFound { hash: h(2) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_slow_fetch_keeps_links() {
        let ledger = linear(3).with_slow_record(h(2), std::time::Duration::from_secs(60));
        let walker = ChainWalker::new(Arc::new(ledger));
        let deadline = Instant::now() + std::time::Duration::from_secs(1);

        let chain = walker.walk(&h(3), 5, Some(deadline)).await;

        assert_eq!(chain.hashes(), vec![h(3)]);
        assert_eq!(chain.termination, ChainTermination::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_passed_deadline() {
        let walker = ChainWalker::new(Arc::new(linear(3)));
        let chain = walker.walk(&h(3), 5, Some(Instant::now())).await;
        assert!(chain.links.is_empty());
        assert_eq!(chain.termination, ChainTermination::DeadlineExceeded);
    }
}
