//! # Edge Set Diffing
//!
//! The engine never rewrites a record's relation rows wholesale: it diffs
//! the stored edge set against the freshly extracted one and applies only
//! the difference. Unchanged edges are untouched by a write.

use crate::RelationEdge;
use std::collections::BTreeSet;

// =============================================================================
// RELATION DELTA
// =============================================================================

/// The minimal change turning one edge set into another.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationDelta {
    pub to_add: BTreeSet<RelationEdge>,
    pub to_remove: BTreeSet<RelationEdge>,
}

impl RelationDelta {
    /// Whether applying this delta would change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// A delta that removes every current edge (tombstoning a record).
    #[must_use]
    pub fn remove_all(current: &BTreeSet<RelationEdge>) -> Self {
        Self {
            to_add: BTreeSet::new(),
            to_remove: current.clone(),
        }
    }
}

/// Compute the delta from `old` to `new` by set difference.
#[must_use]
pub fn diff(old: &BTreeSet<RelationEdge>, new: &BTreeSet<RelationEdge>) -> RelationDelta {
    RelationDelta {
        to_add: new.difference(old).cloned().collect(),
        to_remove: old.difference(new).cloned().collect(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
