//! In-memory collaborators.
//!
//! Scripted stand-ins for the witness network, ledger and content store.
//! Used by the test suites and by the CLI's offline `--fixture` mode, where
//! a JSON file describes every upstream answer.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use proof_hash::ContentHash;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::content::ContentStore;
use crate::error::VerifyError;
use crate::ledger::{LedgerBlock, LedgerReader, LedgerRecord};
use crate::transport::{HttpTransport, Request, Response};

#[derive(Debug, Clone)]
enum Script {
    Reply(Response),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Scripted {
    script: Script,
    delay: Option<Duration>,
}

/// HTTP transport answering from a per-URL script.
///
/// Each URL has one scripted answer that is returned every time it is
/// called. Unscripted URLs fail at the transport level. Every call is
/// logged in order.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Empty script: every call fails.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, url: &str, script: Script, delay: Option<Duration>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Scripted { script, delay });
    }

    /// Answer `url` with `status` and a JSON body.
    pub fn respond(&self, url: &str, status: u16, body: Value) {
        let response = Response {
            status,
            body: Some(body),
        };
        self.script(url, Script::Reply(response), None);
    }

    /// Answer `url` with `status` and no body.
    pub fn respond_empty(&self, url: &str, status: u16) {
        let response = Response { status, body: None };
        self.script(url, Script::Reply(response), None);
    }

    /// Answer `url` only after `delay`.
    pub fn respond_after(&self, url: &str, delay: Duration, status: u16, body: Value) {
        let response = Response {
            status,
            body: Some(body),
        };
        self.script(url, Script::Reply(response), Some(delay));
    }

    /// Fail `url` at the transport level.
    pub fn fail(&self, url: &str, message: &str) {
        self.script(url, Script::Fail(message.to_string()), None);
    }

    /// Number of calls made to `url`.
    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    /// Every URL called, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response, VerifyError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.url.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.url)
            .cloned();

        let Some(scripted) = scripted else {
            debug!(url = %request.url, "No script for URL");
            return Err(VerifyError::Transport {
                endpoint: request.url.clone(),
                message: "no scripted response".into(),
            });
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        match scripted.script {
            Script::Reply(response) => Ok(response),
            Script::Fail(message) => Err(VerifyError::Transport {
                endpoint: request.url.clone(),
                message,
            }),
        }
    }
}

/// Ledger held in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: HashMap<ContentHash, Value>,
    blocks: HashMap<u64, Vec<ContentHash>>,
    unreachable: HashSet<ContentHash>,
    slow: HashMap<ContentHash, Duration>,
    head: Option<u64>,
    direct_lookup: bool,
    record_fetches: AtomicUsize,
    block_fetches: AtomicUsize,
}

impl MemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under `hash`.
    #[must_use]
    pub fn with_record(mut self, hash: ContentHash, record: Value) -> Self {
        self.records.insert(hash, record);
        self
    }

    /// Add a block.
    #[must_use]
    pub fn with_block(mut self, number: u64, transactions: Vec<ContentHash>) -> Self {
        self.blocks.insert(number, transactions);
        self
    }

    /// Report `head` as the current head height.
    #[must_use]
    pub fn with_head(mut self, head: u64) -> Self {
        self.head = Some(head);
        self
    }

    /// Answer direct transaction-to-block lookups from the block table.
    #[must_use]
    pub fn with_direct_lookup(mut self) -> Self {
        self.direct_lookup = true;
        self
    }

    /// Make fetches of `hash` fail as if the ledger were unreachable.
    #[must_use]
    pub fn with_unreachable(mut self, hash: ContentHash) -> Self {
        self.unreachable.insert(hash);
        self
    }

    /// Serve `hash` only after `delay`.
    #[must_use]
    pub fn with_slow_record(mut self, hash: ContentHash, delay: Duration) -> Self {
        self.slow.insert(hash, delay);
        self
    }

    /// Number of record fetches served.
    #[must_use]
    pub fn record_fetches(&self) -> usize {
        self.record_fetches.load(Ordering::SeqCst)
    }

    /// Number of block fetches served.
    #[must_use]
    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerReader for MemoryLedger {
    async fn transaction_by_hash(&self, hash: &ContentHash) -> Result<Option<LedgerRecord>, VerifyError> {
        self.record_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.slow.get(hash) {
            tokio::time::sleep(*delay).await;
        }
        if self.unreachable.contains(hash) {
            return Err(VerifyError::Transport {
                endpoint: "memory-ledger".into(),
                message: format!("{} unreachable", hash),
            });
        }
        match self.records.get(hash) {
            Some(raw) => LedgerRecord::from_value(hash, raw.clone()).map(Some),
            None => Ok(None),
        }
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<LedgerBlock>, VerifyError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.blocks.get(&number).map(|txs| LedgerBlock {
            number,
            transactions: txs.clone(),
        }))
    }

    async fn block_for_transaction(&self, hash: &ContentHash) -> Result<Option<u64>, VerifyError> {
        if !self.direct_lookup {
            return Ok(None);
        }
        Ok(self
            .blocks
            .iter()
            .filter(|(_, txs)| txs.iter().any(|t| t.ct_eq(hash)))
            .map(|(number, _)| *number)
            .min())
    }

    async fn head_block_number(&self) -> Result<Option<u64>, VerifyError> {
        Ok(self.head)
    }
}

/// Content store held in memory.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    payloads: Mutex<HashMap<String, Value>>,
    fetches: AtomicUsize,
}

impl MemoryContentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a payload.
    #[must_use]
    pub fn with_payload(self, reference: &str, payload: Value) -> Self {
        self.put(reference, payload);
        self
    }

    /// Insert or replace a payload.
    pub fn put(&self, reference: &str, payload: Value) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference.to_string(), payload);
    }

    /// Number of fetches served.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn payload_by_ref(&self, reference: &str) -> Result<Option<Value>, VerifyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned())
    }
}

/// Offline description of every upstream answer.
///
/// ```json
/// {
///   "records": [{"hash": "0x…", "link": {"previous": null}}],
///   "blocks": [{"number": 12, "transactions": ["0x…"]}],
///   "head": 15,
///   "directLookup": false,
///   "payloads": {"bafy…": {"parcel": "p-1"}},
///   "http": [{"url": "https://…", "status": 200, "body": {}}]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fixture {
    /// Ledger records; each must carry a `hash`.
    pub records: Vec<Value>,
    /// Ledger blocks.
    pub blocks: Vec<FixtureBlock>,
    /// Head height.
    pub head: Option<u64>,
    /// Whether direct transaction-to-block lookups are answered.
    pub direct_lookup: bool,
    /// Content-store payloads by reference.
    pub payloads: HashMap<String, Value>,
    /// Scripted HTTP answers (witness network).
    pub http: Vec<FixtureReply>,
}

/// A block in a [`Fixture`].
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureBlock {
    /// Block number.
    pub number: u64,
    /// Transaction hashes.
    #[serde(default)]
    pub transactions: Vec<ContentHash>,
}

/// A scripted HTTP answer in a [`Fixture`].
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureReply {
    /// Exact URL.
    pub url: String,
    /// Status code.
    #[serde(default = "default_status")]
    pub status: u16,
    /// JSON body; absent means an empty body.
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_status() -> u16 {
    200
}

impl Fixture {
    /// Load a fixture from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, VerifyError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::config(format!("Failed to read fixture {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            VerifyError::config(format!("Failed to parse fixture {}: {}", path.display(), e))
        })
    }

    /// Build the in-memory collaborators.
    pub fn into_collaborators(
        self,
    ) -> Result<(ScriptedTransport, MemoryLedger, MemoryContentStore), VerifyError> {
        let mut ledger = MemoryLedger::new();
        for record in self.records {
            let hash = record
                .get("hash")
                .and_then(Value::as_str)
                .ok_or_else(|| VerifyError::config("fixture record without a hash"))
                .and_then(|s| {
                    ContentHash::from_hex(s)
                        .map_err(|e| VerifyError::config(format!("fixture record hash: {}", e)))
                })?;
            ledger = ledger.with_record(hash, record);
        }
        for block in self.blocks {
            ledger = ledger.with_block(block.number, block.transactions);
        }
        if let Some(head) = self.head {
            ledger = ledger.with_head(head);
        }
        if self.direct_lookup {
            ledger = ledger.with_direct_lookup();
        }

        let content = MemoryContentStore::new();
        for (reference, payload) in self.payloads {
            content.put(&reference, payload);
        }

        let transport = ScriptedTransport::new();
        for reply in self.http {
            match reply.body {
                Some(body) => transport.respond(&reply.url, reply.status, body),
                None => transport.respond_empty(&reply.url, reply.status),
            }
        }

        Ok((transport, ledger, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_transport_logs_calls() {
        let transport = ScriptedTransport::new();
        transport.respond("https://a", 200, json!({"x": 1}));

        let ok = transport
            .send(&Request::get("https://a", Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(ok.body, Some(json!({"x": 1})));
        assert!(transport
            .send(&Request::get("https://b", Duration::from_secs(1)))
            .await
            .is_err());
        assert_eq!(transport.calls(), vec!["https://a".to_string(), "https://b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_ledger_direct_lookup() {
        let h = ContentHash::from_bytes([3; 32]);
        let ledger = MemoryLedger::new().with_block(9, vec![h]);
        assert_eq!(ledger.block_for_transaction(&h).await.unwrap(), None);

        let ledger = ledger.with_direct_lookup();
        assert_eq!(ledger.block_for_transaction(&h).await.unwrap(), Some(9));
    }

    #[test]
    fn test_fixture_builds_collaborators() {
        let h = ContentHash::from_bytes([1; 32]);
        let fixture: Fixture = serde_json::from_value(json!({
            "records": [{"hash": h.to_string()}],
            "blocks": [{"number": 4, "transactions": [h.to_string()]}],
            "head": 10,
            "payloads": {"bafy": {"a": 1}},
            "http": [{"url": "https://w/q", "body": {"witnesses": []}}]
        }))
        .unwrap();
        let (transport, ledger, content) = fixture.into_collaborators().unwrap();
        assert_eq!(ledger.records.len(), 1);
        assert_eq!(ledger.head, Some(10));
        assert_eq!(content.payloads.lock().unwrap().len(), 1);
        assert!(transport.scripts.lock().unwrap().contains_key("https://w/q"));
    }

    #[test]
    fn test_fixture_record_without_hash_rejected() {
        let fixture: Fixture = serde_json::from_value(json!({"records": [{"blockNumber": 1}]})).unwrap();
        assert!(fixture.into_collaborators().is_err());
    }
}
