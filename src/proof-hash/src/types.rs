//! Fixed-format content hash type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HashError;

/// Length of a content hash in bytes (SHA-256).
pub const HASH_LEN: usize = 32;

/// A 32-byte content hash.
///
/// Used both as the proof identifier of an anchored record and as the
/// anchored payload commitment. Parses from hex with or without a `0x`
/// prefix (any case) and always renders as lower-case `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// The all-zero hash, used by the ledger as the "no predecessor" marker.
    pub const ZERO: Self = Self([0u8; HASH_LEN]);

    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex string (optionally `0x`-prefixed).
    pub fn from_hex(input: &str) -> Result<Self, HashError> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.is_empty() {
            return Err(HashError::Empty);
        }

        let bytes = hex::decode(hex_part).map_err(|e| HashError::invalid_hex(e.to_string()))?;
        let actual = bytes.len();
        let array: [u8; HASH_LEN] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: HASH_LEN,
            actual,
        })?;
        Ok(Self(array))
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lower-case hex without prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the all-zero sentinel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Constant-time equality.
    #[must_use]
    pub fn ct_eq(&self, other: &Self) -> bool {
        crate::constant_time_eq(&self.0, &other.0)
    }
}

/// Whether a back-link string marks the origin of a chain.
///
/// Empty strings and any run of zeros (with or without `0x`) qualify,
/// regardless of length.
#[must_use]
pub fn is_zero_sentinel(link: &str) -> bool {
    let trimmed = link.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    digits.chars().all(|c| c == '0')
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash(0x{})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
