//! # proof-hash
//!
//! Content hashing primitives for anchored delivery proofs.
//!
//! Every delivery event is anchored on the ledger as a SHA-256 commitment
//! over its canonical payload. This crate owns the one procedure that
//! produces that commitment, so the anchoring side and the verifying side
//! can never drift apart:
//!
//! ```text
//! canonical_json = serialize(payload) with object keys sorted, no whitespace
//! content_hash   = SHA-256(canonical_json)
//! ```
//!
//! Volatile bookkeeping fields added by storage layers (`hash`, `updatedAt`,
//! ...) are removed with [`strip_fields`] before hashing.
//!
//! ## Hash Comparison
//!
//! All comparisons of hashes that gate a security decision MUST go through
//! [`constant_time_eq`] (or [`ContentHash::ct_eq`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod canonical;
mod error;
mod types;

pub use canonical::{canonical_hash, canonical_json, hash_bytes, strip_fields};
pub use error::HashError;
pub use types::{is_zero_sentinel, ContentHash, HASH_LEN};

/// Constant-time byte comparison.
///
/// Returns `true` if the slices are equal, `false` otherwise. The length
/// check returns early; hash lengths are public.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;

    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
