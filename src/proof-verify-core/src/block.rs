//! Commit-block location.
//!
//! Strategies, cheapest first:
//!
//! 1. **Embedded field**: the record already names its committed block.
//! 2. **Direct lookup**: the ledger answers hash-to-block itself.
//! 3. **Window scan**: fetch blocks from the record's `not_before` toward
//!    its `expiry`, at most `scan_cap` of them, and look for the hash.
//!
//! A block inside the window that does not exist yet means the ledger head
//! is still inside the window, so the record is pending rather than lost.
//! The same holds when the scan finds nothing but the reported head is at
//! or below the window's expiry; the first block not yet produced is
//! reported.

use std::sync::Arc;

use proof_hash::ContentHash;
use tracing::{debug, info, instrument, warn};

use crate::ledger::{LedgerReader, LedgerRecord, ValidityWindow};
use crate::types::{BlockLocation, BlockLookup, LocateStrategy};

/// Finds the block a record was committed in.
#[derive(Clone)]
pub struct BlockLocator {
    ledger: Arc<dyn LedgerReader>,
    scan_cap: u64,
}

impl BlockLocator {
    /// Create a locator fetching at most `scan_cap` blocks per scan.
    pub fn new(ledger: Arc<dyn LedgerReader>, scan_cap: u64) -> Self {
        Self {
            ledger,
            scan_cap: scan_cap.max(1),
        }
    }

    /// Locate the committing block of `tx`.
    #[instrument(skip(self), fields(tx = %tx))]
    pub async fn locate(&self, tx: &ContentHash) -> BlockLookup {
        let record = match self.ledger.transaction_by_hash(tx).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Ledger unavailable for transaction lookup");
                None
            },
        };

        if let Some(number) = record.as_ref().and_then(|r| r.committed_block) {
            debug!(block = number, "Block embedded in record");
            return located(number, true, LocateStrategy::EmbeddedField);
        }

        match self.ledger.block_for_transaction(tx).await {
            Ok(Some(number)) => {
                debug!(block = number, "Block from direct lookup");
                return located(number, true, LocateStrategy::DirectLookup);
            },
            Ok(None) => {},
            Err(e) => warn!(error = %e, "Direct block lookup failed"),
        }

        let Some(record) = record else {
            return BlockLookup::unknown("transaction not found on ledger");
        };
        let Some(window) = record.validity else {
            return BlockLookup::unknown("record has no committed block and no validity window");
        };

        self.scan(&record, window).await
    }

    async fn scan(&self, record: &LedgerRecord, window: ValidityWindow) -> BlockLookup {
        let head = match self.ledger.head_block_number().await {
            Ok(head) => head,
            Err(e) => {
                debug!(error = %e, "Head height unavailable");
                None
            },
        };

        let last = window
            .expiry
            .min(window.not_before.saturating_add(self.scan_cap - 1));
        info!(
            from = window.not_before,
            to = last,
            expiry = window.expiry,
            head = ?head,
            "Scanning validity window"
        );

        for number in window.not_before..=last {
            if head.is_some_and(|h| number > h) {
                debug!(block = number, "Window extends past head");
                return located(number, false, LocateStrategy::PendingWindow);
            }
            match self.ledger.block_by_number(number).await {
                Ok(Some(block)) if block.contains(&record.hash) => {
                    info!(block = number, "Transaction found in window");
                    return located(number, true, LocateStrategy::WindowScan);
                },
                Ok(Some(_)) => {},
                Ok(None) => {
                    debug!(block = number, "Block not produced yet");
                    return located(number, false, LocateStrategy::PendingWindow);
                },
                Err(e) => {
                    warn!(block = number, error = %e, "Block fetch failed, abandoning scan");
                    return BlockLookup::unknown(format!("ledger unavailable at block {}", number));
                },
            }
        }

        if let Some(h) = head.filter(|h| *h <= window.expiry) {
            debug!(head = h, expiry = window.expiry, "Head still inside validity window");
            return located(h.saturating_add(1), false, LocateStrategy::PendingWindow);
        }

        if last < window.expiry {
            BlockLookup::unknown(format!(
                "not in the first {} blocks of window {}..={}",
                self.scan_cap, window.not_before, window.expiry
            ))
        } else {
            BlockLookup::unknown(format!(
                "not committed in window {}..={}",
                window.not_before, window.expiry
            ))
        }
    }
}

fn located(block_number: u64, is_committed: bool, strategy: LocateStrategy) -> BlockLookup {
    BlockLookup::Located(BlockLocation {
        block_number,
        is_committed,
        strategy,
    })
}
