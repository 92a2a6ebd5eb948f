//! Item identifiers and the temporary identity allocator.
//!
//! An [`ItemId`] is either canonical (assigned by the remote item store) or
//! temporary (assigned locally for items created while offline). The two are
//! always distinguishable: temporary identifiers render as `temp-<n>`, and the
//! `temp-` prefix is never produced by the remote store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved prefix of the string form of temporary identifiers.
pub const TEMP_PREFIX: &str = "temp-";

/// Identifier of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemId {
    /// Assigned by the remote item store; stable and never reused.
    Canonical(String),
    /// Assigned locally; only meaningful within this session's state.
    Temporary(u64),
}

impl ItemId {
    /// Create a canonical identifier.
    ///
    /// The value is taken verbatim and must not carry the temporary prefix,
    /// or its string form would read back as a temporary identifier. Use
    /// [`ItemId::parse`] for strings from outside.
    pub fn canonical(id: impl Into<String>) -> Self {
        let id = id.into();
        debug_assert!(
            !id.starts_with(TEMP_PREFIX),
            "canonical id {id:?} carries the temporary prefix"
        );
        ItemId::Canonical(id)
    }

    /// Parse the string form of an identifier.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidIdentifier(s.to_string()));
        }

        match s.strip_prefix(TEMP_PREFIX) {
            Some(counter) => counter
                .parse::<u64>()
                .map(ItemId::Temporary)
                .map_err(|_| Error::InvalidIdentifier(s.to_string())),
            None => Ok(ItemId::Canonical(s.to_string())),
        }
    }

    /// Check if this identifier was allocated locally.
    pub fn is_temporary(&self) -> bool {
        matches!(self, ItemId::Temporary(_))
    }

    /// Check if this identifier was assigned by the remote store.
    pub fn is_canonical(&self) -> bool {
        matches!(self, ItemId::Canonical(_))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Canonical(id) => f.write_str(id),
            ItemId::Temporary(n) => write!(f, "{TEMP_PREFIX}{n}"),
        }
    }
}

impl FromStr for ItemId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ItemId::parse(s)
    }
}

impl TryFrom<String> for ItemId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        ItemId::parse(&s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.to_string()
    }
}

/// Allocates temporary identifiers.
///
/// A monotonic counter: every value it hands out is unique for the lifetime
/// of the allocator, including across snapshot export/import since its
/// position travels with the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempIdAllocator {
    next: u64,
}

impl Default for TempIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl TempIdAllocator {
    /// Create an allocator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator whose next identifier is `temp-<next>`.
    pub fn starting_at(next: u64) -> Self {
        Self { next: next.max(1) }
    }

    /// Allocate a fresh temporary identifier.
    pub fn allocate(&mut self) -> ItemId {
        let id = ItemId::Temporary(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    /// The counter value the next allocation will use.
    pub fn next_value(&self) -> u64 {
        self.next
    }

    /// Make sure future allocations never collide with `id`.
    pub fn observe(&mut self, id: &ItemId) {
        if let ItemId::Temporary(n) = id {
            self.next = self.next.max(n.saturating_add(1));
        }
    }
}
