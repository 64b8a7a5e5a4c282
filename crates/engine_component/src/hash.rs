//! Deterministic 64-bit name hashing.
//!
//! Resource paths, message ids, socket names and instance ids are all
//! addressed by their [`NameHash`]. The hash is FNV-1a 64-bit over the UTF-8
//! bytes of the name, so the same path always maps to the same key and the
//! value can be computed in `const` context for well-known message names.

use serde::{Deserialize, Serialize};

/// A 64-bit FNV-1a hash of a name (path, message id, socket name, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
pub struct NameHash(pub u64);

impl NameHash {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// The hash of the empty name. Used as "no path" / "no fragment".
    pub const EMPTY: NameHash = NameHash(Self::FNV_OFFSET_BASIS);

    /// Hash a name.
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3
    /// ```
    #[must_use]
    pub const fn of(name: &str) -> Self {
        Self::extend(Self::EMPTY, name)
    }

    /// Continue hashing `suffix` as if it had been appended to the name that
    /// produced `base`.
    #[must_use]
    pub const fn extend(base: NameHash, suffix: &str) -> Self {
        let bytes = suffix.as_bytes();
        let mut hash = base.0;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Returns the raw hash value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<&str> for NameHash {
    fn from(name: &str) -> Self {
        Self::of(name)
    }
}

impl std::fmt::Display for NameHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
