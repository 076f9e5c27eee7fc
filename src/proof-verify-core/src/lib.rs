//! # proof-verify-core
//!
//! Read-only verification of anchored delivery proofs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ProofEngine                           │
//! │                                                             │
//! │  verify_location   walk_provenance_chain                    │
//! │  locate_commit_block   detect_tampering                     │
//! │        │                 │             │            │       │
//! │        ▼                 ▼             ▼            ▼       │
//! │  ┌──────────────┐ ┌─────────────┐ ┌──────────┐ ┌──────────┐ │
//! │  │WitnessClient │ │ ChainWalker │ │  Block   │ │  Tamper  │ │
//! │  │ + Degraded   │ │             │ │ Locator  │ │ Detector │ │
//! │  └──────────────┘ └─────────────┘ └──────────┘ └──────────┘ │
//! │        │                 └──────┬──────┘            │       │
//! │        ▼                        ▼                   ▼       │
//! │  ┌──────────────┐        ┌─────────────┐     ┌────────────┐ │
//! │  │ QueryBridge  │        │LedgerReader │     │ContentStore│ │
//! │  └──────────────┘        └─────────────┘     └────────────┘ │
//! │        └──────────────┬──────────┴──────────────────┘       │
//! │                       ▼                                     │
//! │         EndpointCascade over HttpTransport                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Properties
//!
//! - **Always answers**: operations return structured results, never errors
//! - **Ordered fallback**: every upstream is an ordered list of routes
//! - **Flagged degradation**: synthesized results carry `is_degraded` and
//!   are reproducible for identical inputs
//! - **Untrusted labels**: tamper checks recompute hashes and never trust a
//!   stored copy's own hash field

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod block;
pub mod bridge;
pub mod cascade;
pub mod chain;
pub mod config;
pub mod consensus;
pub mod content;
pub mod degraded;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod geo;
pub mod ledger;
pub mod memory;
pub mod tamper;
pub mod transport;
pub mod types;
pub mod witness;

pub use block::BlockLocator;
pub use bridge::QueryBridge;
pub use cascade::{
    AttemptOutcome, Candidate, CandidateAttempt, CascadeOutcome, CascadeTrace, EndpointCascade,
};
pub use chain::ChainWalker;
pub use config::{
    ContentConfig, EngineConfig, LedgerConfig, LedgerRoute, UrlTemplate, WitnessConfig, WitnessRoute,
};
pub use consensus::{score, ConfidenceStep, ConsensusScore, ScoringPolicy};
pub use content::{ContentStore, HttpContentStore};
pub use degraded::DegradedSynthesizer;
pub use engine::ProofEngine;
pub use envelope::ResponseEnvelope;
pub use error::VerifyError;
pub use geo::GeoPoint;
pub use ledger::{BackLink, HttpLedgerReader, LedgerBlock, LedgerReader, LedgerRecord, ValidityWindow};
pub use memory::{Fixture, MemoryContentStore, MemoryLedger, ScriptedTransport};
pub use tamper::TamperDetector;
pub use transport::{HttpTransport, Method, ReqwestTransport, Request, Response};
pub use types::{
    BlockLocation, BlockLookup, ChainLink, ChainTermination, ConsensusTier, DegradedReason,
    LocateStrategy, NodeType, ProvenanceChain, TamperVerdict, VerificationResult, Verdict,
    WitnessNode,
};
pub use witness::{WitnessClient, WitnessReport};

// Hash primitives used across the public API.
pub use proof_hash::{canonical_hash, ContentHash};
