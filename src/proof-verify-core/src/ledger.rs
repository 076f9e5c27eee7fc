//! Ledger-read collaborator.
//!
//! The engine is read-only against the ledger. It needs four things:
//!
//! - a transaction (bound record) by hash,
//! - a block and its transaction hashes by number,
//! - optionally, a direct transaction-to-block lookup,
//! - optionally, the current head height.
//!
//! ## Record Shape
//!
//! Ledger APIs differ in naming, so fields are looked up under several
//! names, first at the top level, then in a `link` object, then in each
//! entry of a `payloads` array. The committed block is only read from the
//! top level and `link`, never from payload entries:
//!
//! ```text
//! {
//!   "hash": "0x…",
//!   "blockNumber": 1234 | null | "pending",
//!   "validity": { "notBefore": 1200, "expiry": 1260 },
//!   "link": { "previous": "0x…", "payloadHash": "0x…", "payloadRef": "bafy…" }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proof_hash::{is_zero_sentinel, ContentHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cascade::{fetch_payload, AttemptOutcome, CascadeOutcome, CascadeTrace, EndpointCascade};
use crate::config::{LedgerConfig, LedgerRoute};
use crate::error::VerifyError;
use crate::transport::{HttpTransport, Request};

const HASH_KEYS: &[&str] = &["hash", "txHash", "tx_hash", "transactionHash"];
const PREVIOUS_KEYS: &[&str] = &["previous", "prev", "previousHash", "previous_hash", "parent"];
const PAYLOAD_HASH_KEYS: &[&str] = &["payloadHash", "payload_hash", "dataHash", "contentHash"];
const PAYLOAD_REF_KEYS: &[&str] = &["payloadRef", "payload_ref", "cid", "ipfsHash"];
const BLOCK_KEYS: &[&str] = &["blockNumber", "block_number", "blockHeight"];
const HEIGHT_KEYS: &[&str] = &["blockNumber", "block_number", "blockHeight", "height", "block", "number"];
const NOT_BEFORE_KEYS: &[&str] = &["notBefore", "not_before", "validFrom", "invalidBefore"];
const EXPIRY_KEYS: &[&str] = &["expiry", "validUntil", "valid_until", "invalidHereafter"];
const PENDING_MARKERS: &[&str] = &["pending", "unconfirmed", "mempool"];

/// Inclusive block range in which a record may be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    /// First block the record may land in.
    pub not_before: u64,
    /// Last block the record may land in.
    pub expiry: u64,
}

/// What a record's back-link says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackLink {
    /// No predecessor: absent, empty or all-zero.
    Origin,
    /// Predecessor hash.
    Next(ContentHash),
    /// Present but not a valid hash.
    Malformed(String),
}

/// One bound record as read from the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Record (transaction) hash.
    pub hash: ContentHash,
    /// Back-link, verbatim.
    pub previous: Option<String>,
    /// Anchored canonical payload hash.
    pub payload_hash: Option<ContentHash>,
    /// Content-store reference for the payload.
    pub payload_ref: Option<String>,
    /// Committed block, if the record is final.
    pub committed_block: Option<u64>,
    /// Commitment window.
    pub validity: Option<ValidityWindow>,
    /// The record as returned by the ledger.
    pub raw: Value,
}

impl LedgerRecord {
    /// Parse a ledger response for `requested`.
    ///
    /// A record that names a different hash than the one requested is
    /// rejected.
    pub fn from_value(requested: &ContentHash, raw: Value) -> Result<Self, VerifyError> {
        if !raw.is_object() {
            return Err(decode_err("transaction", "record is not an object"));
        }

        let hash = match find_str(&raw, HASH_KEYS) {
            Some(s) => ContentHash::from_hex(s)
                .map_err(|e| decode_err("transaction", format!("bad record hash: {}", e)))?,
            None => *requested,
        };
        if !hash.ct_eq(requested) {
            return Err(decode_err(
                "transaction",
                format!("ledger returned {} for {}", hash, requested),
            ));
        }

        let previous = find_str(&raw, PREVIOUS_KEYS).map(str::to_string);
        let payload_hash = match find_str(&raw, PAYLOAD_HASH_KEYS) {
            Some(s) => Some(
                ContentHash::from_hex(s)
                    .map_err(|e| decode_err("transaction", format!("bad payload hash: {}", e)))?,
            ),
            None => None,
        };
        let payload_ref = find_str(&raw, PAYLOAD_REF_KEYS)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        let committed_block = find_shallow(&raw, BLOCK_KEYS).and_then(parse_block_field);

        let window_src = raw.get("validity").unwrap_or(&raw);
        let validity = match (
            find(window_src, NOT_BEFORE_KEYS).and_then(parse_block_field),
            find(window_src, EXPIRY_KEYS).and_then(parse_block_field),
        ) {
            (Some(not_before), Some(expiry)) if not_before <= expiry => {
                Some(ValidityWindow { not_before, expiry })
            },
            _ => None,
        };

        Ok(Self {
            hash,
            previous,
            payload_hash,
            payload_ref,
            committed_block,
            validity,
            raw,
        })
    }

    /// Interpret the back-link.
    #[must_use]
    pub fn back_link(&self) -> BackLink {
        match self.previous.as_deref() {
            None => BackLink::Origin,
            Some(link) if is_zero_sentinel(link) => BackLink::Origin,
            Some(link) => match ContentHash::from_hex(link) {
                Ok(hash) => BackLink::Next(hash),
                Err(_) => BackLink::Malformed(link.to_string()),
            },
        }
    }
}

/// A block and the transaction hashes it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBlock {
    /// Block number.
    pub number: u64,
    /// Transaction hashes. Unparseable entries are dropped.
    pub transactions: Vec<ContentHash>,
}

impl LedgerBlock {
    /// Parse a block response for `requested`.
    pub fn from_value(requested: u64, raw: &Value) -> Result<Self, VerifyError> {
        let number = match find(raw, &["number", "height", "blockNumber"]) {
            Some(v) => parse_block_field(v).ok_or_else(|| decode_err("block", "bad block number"))?,
            None => requested,
        };
        if number != requested {
            return Err(decode_err(
                "block",
                format!("ledger returned block {} for {}", number, requested),
            ));
        }

        let entries = ["transactions", "txs", "txHashes"]
            .iter()
            .find_map(|k| raw.get(*k))
            .and_then(Value::as_array)
            .ok_or_else(|| decode_err("block", "no transaction list"))?;

        let transactions = entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => ContentHash::from_hex(s).ok(),
                Value::Object(_) => find_str(entry, HASH_KEYS).and_then(|s| ContentHash::from_hex(s).ok()),
                _ => None,
            })
            .collect();

        Ok(Self { number, transactions })
    }

    /// Whether the block contains `hash`.
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.transactions.iter().any(|h| h.ct_eq(hash))
    }
}

/// Read-only ledger access.
///
/// `Ok(None)` means the ledger answered and the object does not exist;
/// `Err` means the ledger could not be asked.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Fetch a bound record.
    async fn transaction_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerRecord>, VerifyError>;

    /// Fetch a block.
    async fn block_by_number(&self, number: u64) -> Result<Option<LedgerBlock>, VerifyError>;

    /// Direct transaction-to-block lookup. Readers without one return `Ok(None)`.
    async fn block_for_transaction(&self, _hash: &ContentHash) -> Result<Option<u64>, VerifyError> {
        Ok(None)
    }

    /// Current head height. Readers without one return `Ok(None)`.
    async fn head_block_number(&self) -> Result<Option<u64>, VerifyError> {
        Ok(None)
    }
}

/// Ledger reader over HTTP, trying configured routes in order.
pub struct HttpLedgerReader {
    cascade: EndpointCascade,
    routes: Vec<LedgerRoute>,
    timeout: Duration,
}

impl HttpLedgerReader {
    /// Create a reader.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &LedgerConfig) -> Self {
        Self {
            cascade: EndpointCascade::new(transport),
            routes: config.routes.clone(),
            timeout: config.timeout,
        }
    }

    fn transport(&self) -> &dyn HttpTransport {
        self.cascade.transport().as_ref()
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerReader {
    #[instrument(skip(self), fields(hash = %hash))]
    async fn transaction_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerRecord>, VerifyError> {
        let hash_text = hash.to_string();
        let requests: Vec<Request> = self
            .routes
            .iter()
            .map(|r| Request::get(r.transaction_url.render(&[("hash", &hash_text)]), self.timeout))
            .collect();

        let transport = self.transport();
        let outcome = EndpointCascade::resolve("ledger.transaction", &requests, |request| async move {
            let payload = fetch_payload(transport, request).await?;
            LedgerRecord::from_value(hash, payload)
        })
        .await;
        settle(outcome)
    }

    #[instrument(skip(self))]
    async fn block_by_number(&self, number: u64) -> Result<Option<LedgerBlock>, VerifyError> {
        let number_text = number.to_string();
        let requests: Vec<Request> = self
            .routes
            .iter()
            .map(|r| Request::get(r.block_url.render(&[("number", &number_text)]), self.timeout))
            .collect();

        let transport = self.transport();
        let outcome = EndpointCascade::resolve("ledger.block", &requests, |request| async move {
            let payload = fetch_payload(transport, request).await?;
            LedgerBlock::from_value(number, &payload)
        })
        .await;
        settle(outcome)
    }

    #[instrument(skip(self), fields(hash = %hash))]
    async fn block_for_transaction(&self, hash: &ContentHash) -> Result<Option<u64>, VerifyError> {
        let hash_text = hash.to_string();
        let requests: Vec<Request> = self
            .routes
            .iter()
            .filter_map(|r| r.block_for_transaction_url.as_ref())
            .map(|t| Request::get(t.render(&[("hash", &hash_text)]), self.timeout))
            .collect();
        if requests.is_empty() {
            return Ok(None);
        }

        let outcome = self.cascade.try_endpoints("ledger.blockForTransaction", &requests).await;
        Ok(settle(outcome)?.and_then(|v| extract_block_number(&v)))
    }

    #[instrument(skip(self))]
    async fn head_block_number(&self) -> Result<Option<u64>, VerifyError> {
        let requests: Vec<Request> = self
            .routes
            .iter()
            .filter_map(|r| r.head_url.as_ref())
            .map(|url| Request::get(url.clone(), self.timeout))
            .collect();
        if requests.is_empty() {
            return Ok(None);
        }

        let outcome = self.cascade.try_endpoints("ledger.head", &requests).await;
        Ok(settle(outcome)?.and_then(|v| extract_block_number(&v)))
    }
}

/// Turn a cascade outcome into the reader contract.
///
/// Exhaustion where every candidate answered "not found" (404 or empty) is
/// `Ok(None)`. Any other exhaustion means the ledger could not be asked.
fn settle<T>(outcome: CascadeOutcome<T>) -> Result<Option<T>, VerifyError> {
    match outcome {
        CascadeOutcome::Resolved { value, .. } => Ok(Some(value)),
        CascadeOutcome::Exhausted { trace } => {
            if all_not_found(&trace) {
                debug!(operation = %trace.operation, "Ledger reports object absent");
                Ok(None)
            } else {
                warn!(operation = %trace.operation, attempts = trace.attempted(), "Ledger unreachable");
                Err(VerifyError::Exhausted {
                    operation: trace.operation,
                    attempts: trace.attempts.len(),
                })
            }
        },
    }
}

fn all_not_found(trace: &CascadeTrace) -> bool {
    !trace.attempts.is_empty()
        && trace.attempts.iter().all(|a| {
            matches!(
                a.outcome,
                AttemptOutcome::Empty | AttemptOutcome::Status { code: 404 }
            )
        })
}

/// Read a block number from a bare number or an object carrying one.
fn extract_block_number(value: &Value) -> Option<u64> {
    match value {
        Value::Object(_) => find_shallow(value, HEIGHT_KEYS).and_then(parse_block_field),
        other => parse_block_field(other),
    }
}

/// Parse a committed-block field.
///
/// Non-negative integers (or numeric strings) are block numbers. `null`,
/// negative numbers, empty strings and pending markers are the not-yet-final
/// placeholder.
#[must_use]
pub fn parse_block_field(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || PENDING_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m)) {
                None
            } else {
                s.parse::<u64>().ok()
            }
        },
        _ => None,
    }
}

fn decode_err(what: &str, message: impl Into<String>) -> VerifyError {
    VerifyError::Decode {
        endpoint: format!("ledger.{}", what),
        message: message.into(),
    }
}

fn direct<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().filter_map(|k| value.get(*k)).find(|v| !v.is_null())
}

/// Look up the first present key at the top level, then under `link`.
fn find_shallow<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    direct(value, keys).or_else(|| value.get("link").and_then(|l| direct(l, keys)))
}

/// Like [`find_shallow`], then in each `payloads` entry (and its `link`).
fn find<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    find_shallow(value, keys).or_else(|| {
        value
            .get("payloads")
            .and_then(Value::as_array)
            .and_then(|items| items.iter().find_map(|item| find_shallow(item, keys)))
    })
}

fn find_str<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v str> {
    find(value, keys).and_then(Value::as_str)
}
