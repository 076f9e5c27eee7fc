//! Consolidated integration tests for proof-verify-core.
//!
//! One test binary keeps proptest suites from running as separate
//! processes in parallel.

mod properties;
mod scenarios;
