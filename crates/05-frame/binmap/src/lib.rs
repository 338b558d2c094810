//! Bin mapping table.
//!
//! Maps a tester-assigned bin identity (numeric bin or short packed text
//! code) to an equipment bin slot. One optional wildcard entry, keyed by the
//! reserved code −1, represents "no specific mapping, use the retest /
//! default slot"; all binning modes funnel through the same lookup with
//! different code encodings.

use std::collections::HashMap;

/// Number of text bytes that fit into a packed bin code.
pub const CODE_LENGTH: usize = 8;

/// Lookup key of the bin map.
///
/// Numeric bins embed directly; short text codes pack their bytes into the
/// integer so both share one key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BinCode(pub i64);

impl BinCode {
    /// The reserved wildcard/retest code.
    pub const WILDCARD: BinCode = BinCode(-1);

    /// Packs a short text bin code (at most [`CODE_LENGTH`] bytes count).
    pub fn from_text(code: &str) -> Self {
        let mut raw = [0u8; CODE_LENGTH];
        let bytes = code.as_bytes();
        let len = bytes.len().min(CODE_LENGTH);
        raw[..len].copy_from_slice(&bytes[..len]);
        BinCode(i64::from_le_bytes(raw))
    }

    /// Returns whether this is the wildcard code.
    pub fn is_wildcard(self) -> bool {
        self == Self::WILDCARD
    }
}

impl From<i64> for BinCode {
    fn from(number: i64) -> Self {
        BinCode(number)
    }
}

/// Bin map failures.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BinMapError {
    /// The output slot lies outside the declared equipment bin range.
    #[error("bin slot {slot} outside the declared range of {capacity} equipment bins")]
    SlotRange {
        /// Rejected output slot.
        slot: i64,
        /// Declared number of equipment bins.
        capacity: usize,
    },

    /// Neither a specific entry nor a wildcard matches the code.
    #[error("no bin mapping for code {0:?}")]
    NotFound(BinCode),
}

/// The mapping table.
///
/// Rebuilt wholesale on reconfiguration and read-only during operation;
/// the installing side swaps the new table in atomically so concurrent
/// readers keep a valid table.
#[derive(Clone, Debug, Default)]
pub struct BinMap {
    entries: HashMap<BinCode, i64>,
    capacity: usize,
}

impl BinMap {
    /// Creates an empty map declared for `capacity` equipment bins.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Declared number of equipment bins.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries, wildcard included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or overwrites the mapping for `code`.
    ///
    /// The wildcard code registers the retest/default entry. Slots must lie
    /// in `0..capacity`; −1 is accepted as "no destination known".
    pub fn enter(&mut self, code: BinCode, slot: i64) -> Result<(), BinMapError> {
        if slot < -1 || slot >= self.capacity as i64 {
            return Err(BinMapError::SlotRange {
                slot,
                capacity: self.capacity,
            });
        }
        self.entries.insert(code, slot);
        Ok(())
    }

    /// Exact-match lookup, no wildcard fallback.
    pub fn lookup(&self, code: BinCode) -> Option<i64> {
        self.entries.get(&code).copied()
    }

    /// Resolves a code: exact match first, wildcard second.
    ///
    /// Callers that cannot tolerate a missing mapping apply their own
    /// policy on [`BinMapError::NotFound`], typically "leave unresolved".
    pub fn resolve(&self, code: BinCode) -> Result<i64, BinMapError> {
        self.lookup(code)
            .or_else(|| self.lookup(BinCode::WILDCARD))
            .ok_or(BinMapError::NotFound(code))
    }
}
