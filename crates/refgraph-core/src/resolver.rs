//! # Identifier Resolution
//!
//! The identifier registry maps `(RecordKind, ControlNumber)` pairs to
//! internal record handles. Entries outlive soft deletion (a deleted
//! record still resolves, as deleted) and are re-pointed when a record is
//! superseded by another.
//!
//! Redirects are single-hop: resolving a redirected control number yields
//! the successor handle the registry recorded, and chains of redirects are
//! deliberately not followed further.

use crate::RecordId;
use serde::{Deserialize, Serialize};

// =============================================================================
// REGISTRY STATUS
// =============================================================================

/// The state of one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistryStatus {
    /// The control number points at a live record.
    Active(RecordId),
    /// The record was soft-deleted; the entry is retained so the
    /// identifier still resolves (as deleted, not absent).
    Deleted(RecordId),
    /// The record was superseded; the entry now points at its successor.
    Redirected(RecordId),
}

impl RegistryStatus {
    /// The handle behind this entry, whatever its state.
    #[must_use]
    pub const fn record(self) -> RecordId {
        match self {
            Self::Active(id) | Self::Deleted(id) | Self::Redirected(id) => id,
        }
    }
}

// =============================================================================
// RESOLUTION
// =============================================================================

/// The outcome of resolving an external reference.
///
/// `Unresolved` is an ordinary outcome, never an error: callers treat it
/// as "no edge".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The reference points at a live record (directly, or through one
    /// recorded redirect hop).
    Resolved(RecordId),
    /// The reference points at a soft-deleted record.
    Deleted(RecordId),
    /// The identifier is not registered.
    Unresolved,
}

impl Resolution {
    /// Map a registry entry to a resolution outcome.
    #[must_use]
    pub const fn from_entry(entry: Option<RegistryStatus>) -> Self {
        match entry {
            Some(RegistryStatus::Active(id)) => Self::Resolved(id),
            Some(RegistryStatus::Deleted(id)) => Self::Deleted(id),
            // One hop only: whatever the successor's own state, the
            // registry recorded this handle and we return it as-is.
            Some(RegistryStatus::Redirected(successor)) => Self::Resolved(successor),
            None => Self::Unresolved,
        }
    }

    /// The live record handle, if the reference resolved to one.
    #[must_use]
    pub const fn live_record(self) -> Option<RecordId> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Deleted(_) | Self::Unresolved => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
