//! Configuration for the proof verification engine.
//!
//! Every upstream surface is described as an ordered list of URL templates.
//! The engine tries them in order through the endpoint cascade, so an
//! upstream whose exact API version is uncertain is handled by listing the
//! known variants here rather than guessing paths in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consensus::ScoringPolicy;
use crate::error::VerifyError;

/// A URL with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    /// Wrap a template string.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Substitute every `{name}` with its value.
    #[must_use]
    pub fn render(&self, params: &[(&str, &str)]) -> String {
        let mut out = self.0.clone();
        for (name, value) in params {
            out = out.replace(&format!("{{{}}}", name), value);
        }
        out
    }

    /// Whether the template mentions `{name}`.
    #[must_use]
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.0.contains(&format!("{{{}}}", name))
    }

    /// Raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One witness-network API variant: where to submit, where to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessRoute {
    /// POST target for a corroboration query.
    pub query_url: String,
    /// GET target for a derived handle; must contain `{handle}`.
    pub result_url: UrlTemplate,
}

/// One ledger-read API variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRoute {
    /// Transaction lookup; must contain `{hash}`.
    pub transaction_url: UrlTemplate,
    /// Block lookup by number; must contain `{number}`.
    pub block_url: UrlTemplate,
    /// Direct transaction-to-block lookup, if the API offers one.
    #[serde(default)]
    pub block_for_transaction_url: Option<UrlTemplate>,
    /// Current head block, if the API offers one.
    #[serde(default)]
    pub head_url: Option<String>,
}

/// Witness network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WitnessConfig {
    /// Administrative switch; when off every verification is degraded.
    pub enabled: bool,
    /// Ordered API variants.
    pub routes: Vec<WitnessRoute>,
    /// Per-request timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Delay before the single poll of a derived handle.
    #[serde(with = "duration_ms")]
    pub poll_delay: Duration,
    /// Timeout for the poll request.
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,
    /// Maximum witness-centroid distance that still counts as a match.
    pub location_tolerance_m: f64,
    /// Inclusive range of synthesized witness counts in degraded mode.
    pub degraded_node_range: (u32, u32),
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            routes: vec![
                WitnessRoute {
                    query_url: "https://witness.proofnet.io/api/v2/queries".into(),
                    result_url: UrlTemplate::new("https://witness.proofnet.io/api/v2/queries/{handle}"),
                },
                WitnessRoute {
                    query_url: "https://witness.proofnet.io/v1/location/verify".into(),
                    result_url: UrlTemplate::new("https://witness.proofnet.io/v1/location/result/{handle}"),
                },
                WitnessRoute {
                    query_url: "https://witness-backup.proofnet.io/v1/location/verify".into(),
                    result_url: UrlTemplate::new(
                        "https://witness-backup.proofnet.io/v1/location/result/{handle}",
                    ),
                },
            ],
            timeout: Duration::from_secs(10),
            poll_delay: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(10),
            location_tolerance_m: 500.0,
            degraded_node_range: (1, 6),
        }
    }
}

/// Ledger-read settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Ordered API variants.
    pub routes: Vec<LedgerRoute>,
    /// Per-request timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Maximum number of blocks fetched by one window scan.
    pub block_scan_cap: u64,
    /// Chain walk depth used when the caller does not give one.
    pub default_max_depth: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                LedgerRoute {
                    transaction_url: UrlTemplate::new("https://ledger.proofnet.io/api/v1/txs/{hash}"),
                    block_url: UrlTemplate::new("https://ledger.proofnet.io/api/v1/blocks/{number}"),
                    block_for_transaction_url: Some(UrlTemplate::new(
                        "https://ledger.proofnet.io/api/v1/txs/{hash}/block",
                    )),
                    head_url: Some("https://ledger.proofnet.io/api/v1/blocks/latest".into()),
                },
                LedgerRoute {
                    transaction_url: UrlTemplate::new("https://ledger-mirror.proofnet.io/txs/{hash}"),
                    block_url: UrlTemplate::new("https://ledger-mirror.proofnet.io/blocks/{number}"),
                    block_for_transaction_url: None,
                    head_url: None,
                },
            ],
            timeout: Duration::from_secs(8),
            block_scan_cap: 100,
            default_max_depth: 10,
        }
    }
}

/// Content-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentConfig {
    /// Ordered gateway templates; each must contain `{ref}`.
    pub gateways: Vec<UrlTemplate>,
    /// Per-request timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Top-level fields removed from a payload before re-hashing.
    pub volatile_fields: Vec<String>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            gateways: vec![
                UrlTemplate::new("https://gateway.proofnet.io/ipfs/{ref}"),
                UrlTemplate::new("https://ipfs.io/ipfs/{ref}"),
                UrlTemplate::new("https://cloudflare-ipfs.com/ipfs/{ref}"),
            ],
            timeout: Duration::from_secs(15),
            volatile_fields: [
                "hash",
                "storedHash",
                "contentHash",
                "_id",
                "_rev",
                "createdAt",
                "updatedAt",
                "metadata",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

/// Configuration for the proof verification engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Witness network.
    pub witness: WitnessConfig,
    /// Ledger reads.
    pub ledger: LedgerConfig,
    /// Content store.
    pub content: ContentConfig,
    /// Consensus scoring thresholds.
    pub scoring: ScoringPolicy,
    /// TCP connect timeout shared by all HTTP calls.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Upper bound on any single engine operation.
    #[serde(with = "duration_ms")]
    pub request_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            witness: WitnessConfig::default(),
            ledger: LedgerConfig::default(),
            content: ContentConfig::default(),
            scoring: ScoringPolicy::default(),
            connect_timeout: Duration::from_secs(3),
            request_deadline: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, VerifyError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            VerifyError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.witness.enabled && self.witness.routes.is_empty() {
            return Err(VerifyError::config(
                "witness network enabled but no routes configured",
            ));
        }
        for route in &self.witness.routes {
            if !route.result_url.has_placeholder("handle") {
                return Err(VerifyError::config(format!(
                    "witness result url '{}' lacks {{handle}}",
                    route.result_url.as_str()
                )));
            }
        }
        let (lo, hi) = self.witness.degraded_node_range;
        if lo > hi {
            return Err(VerifyError::config(format!(
                "degraded node range {}..={} is empty",
                lo, hi
            )));
        }
        let tolerance = self.witness.location_tolerance_m;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(VerifyError::config("location tolerance must be positive and finite"));
        }
        for route in &self.ledger.routes {
            if !route.transaction_url.has_placeholder("hash") {
                return Err(VerifyError::config(format!(
                    "ledger transaction url '{}' lacks {{hash}}",
                    route.transaction_url.as_str()
                )));
            }
            if !route.block_url.has_placeholder("number") {
                return Err(VerifyError::config(format!(
                    "ledger block url '{}' lacks {{number}}",
                    route.block_url.as_str()
                )));
            }
        }
        if self.ledger.block_scan_cap == 0 {
            return Err(VerifyError::config("block scan cap must be at least 1"));
        }
        for gateway in &self.content.gateways {
            if !gateway.has_placeholder("ref") {
                return Err(VerifyError::config(format!(
                    "content gateway '{}' lacks {{ref}}",
                    gateway.as_str()
                )));
            }
        }
        if self.request_deadline.is_zero() {
            return Err(VerifyError::config("request deadline must be non-zero"));
        }
        self.scoring.validate()
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
