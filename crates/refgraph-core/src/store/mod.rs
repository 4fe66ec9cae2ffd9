//! # Record Storage
//!
//! Storage for snapshots, the identifier registry and the relation tables,
//! behind one trait with two backends:
//! - [`MemoryStore`](memory::MemoryStore): `BTreeMap`-backed, for tests and
//!   ephemeral runs
//! - [`RedbStore`](redb_store::RedbStore): persistent, ACID, via redb
//!
//! All writes go through [`RecordStore::commit`] with a [`CommitBatch`]:
//! the batch either applies in full or not at all. A batch can touch
//! several records at once (redirects update the superseded record and the
//! registry together with the new snapshot).

pub mod memory;
pub mod redb_store;

use crate::diff::RelationDelta;
use crate::extractor::ResolveRef;
use crate::resolver::{RegistryStatus, Resolution};
use crate::snapshot::{RecordRef, RecordSnapshot};
use crate::{ControlNumber, RecordId, RecordKind, RefgraphError, RelationEdge, RelationKind};
use serde_json::Value;
use std::collections::BTreeSet;

// =============================================================================
// COMMIT BATCH
// =============================================================================

/// One snapshot write inside a batch.
#[derive(Debug, Clone)]
pub struct SnapshotWrite {
    pub id: RecordId,
    pub kind: RecordKind,
    /// The version the row will carry after the write.
    pub version: u64,
    /// Optimistic check: `None` asserts the record does not exist yet,
    /// `Some(v)` asserts the stored version is exactly `v`.
    pub prior_version: Option<u64>,
    pub data: Value,
}

/// One registry mutation inside a batch.
#[derive(Debug, Clone, Copy)]
pub enum RegistryOp {
    Set {
        kind: RecordKind,
        control_number: ControlNumber,
        status: RegistryStatus,
    },
    Remove {
        kind: RecordKind,
        control_number: ControlNumber,
    },
}

/// Edge delta for one source record inside a batch.
#[derive(Debug, Clone)]
pub struct EdgeWrite {
    pub source: RecordId,
    pub delta: RelationDelta,
}

/// An atomic unit of work against the store.
///
/// Applied in order: version checks, snapshot rows, registry ops, edge
/// deltas, incoming purges, then row purges. Any failure rolls the whole
/// batch back.
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    pub snapshots: Vec<SnapshotWrite>,
    pub registry: Vec<RegistryOp>,
    pub edges: Vec<EdgeWrite>,
    /// Strip every stored edge pointing at these records (hard delete).
    pub purge_incoming: Vec<RecordId>,
    /// Remove these records' rows entirely (snapshot and outgoing edges).
    pub purge_records: Vec<RecordId>,
}

impl CommitBatch {
    /// Whether the batch would change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
            && self.registry.is_empty()
            && self.edges.iter().all(|e| e.delta.is_empty())
            && self.purge_incoming.is_empty()
            && self.purge_records.is_empty()
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Storage seam for the engine.
///
/// Reads are plain lookups; the only mutation is [`commit`](Self::commit).
pub trait RecordStore {
    /// The snapshot currently stored for a record.
    fn get_snapshot(&self, id: RecordId) -> Result<Option<RecordSnapshot>, RefgraphError>;

    /// Whether a snapshot row exists for the handle, without decoding it.
    fn record_exists(&self, id: RecordId) -> Result<bool, RefgraphError>;

    /// The registry entry for an external identifier.
    fn registry_entry(
        &self,
        kind: RecordKind,
        control_number: ControlNumber,
    ) -> Result<Option<RegistryStatus>, RefgraphError>;

    /// The stored outgoing edge set of a record.
    fn outgoing_edges(&self, id: RecordId) -> Result<BTreeSet<RelationEdge>, RefgraphError>;

    /// The sources of stored edges of one kind pointing at a record.
    fn incoming_sources(
        &self,
        target: RecordId,
        kind: RelationKind,
    ) -> Result<BTreeSet<RecordId>, RefgraphError>;

    /// Every record handle currently stored, in order.
    fn record_ids(&self) -> Result<Vec<RecordId>, RefgraphError>;

    /// Number of registered identifiers, across all kinds and states.
    fn registry_len(&self) -> Result<u64, RefgraphError>;

    /// The next unused record handle. Does not reserve it; the counter
    /// advances when a snapshot with the handle is committed.
    fn next_record_id(&self) -> Result<RecordId, RefgraphError>;

    /// The next unused control number for a kind.
    fn next_control_number(&self, kind: RecordKind) -> Result<ControlNumber, RefgraphError>;

    /// Apply a batch atomically.
    fn commit(&mut self, batch: CommitBatch) -> Result<(), RefgraphError>;
}

// =============================================================================
// RESOLVER ADAPTER
// =============================================================================

/// Adapts a store's registry to the extraction seam.
pub struct StoreResolver<'a>(pub &'a dyn RecordStore);

impl ResolveRef for StoreResolver<'_> {
    /// Registry lookup failures resolve as unresolved; extraction treats
    /// both the same way and the write path surfaces storage errors on
    /// its own reads.
    fn resolve_ref(&self, reference: RecordRef) -> Resolution {
        let entry = match self
            .0
            .registry_entry(reference.kind, reference.control_number)
        {
            Ok(entry) => entry,
            Err(_) => return Resolution::Unresolved,
        };
        match Resolution::from_entry(entry) {
            // A redirect can outlive its successor: hard-deleting the
            // successor removes its own registry entry but not entries
            // re-pointed at it earlier. No edge may target a handle
            // without a row behind it, so the stale hop ends here.
            Resolution::Resolved(id) => match self.0.record_exists(id) {
                Ok(true) => Resolution::Resolved(id),
                Ok(false) | Err(_) => Resolution::Unresolved,
            },
            other => other,
        }
    }
}

// =============================================================================
// SHARED ROW ENCODING
// =============================================================================

/// The persisted form of one record row.
///
/// The document is stored as a JSON string rather than a postcard tree:
/// postcard is not self-describing, and `serde_json::Value` round-trips
/// through its own text form losslessly (key order is preserved by the
/// `preserve_order` feature).
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct RecordRow {
    pub kind: RecordKind,
    pub version: u64,
    pub data_json: String,
}

impl RecordRow {
    pub(crate) fn from_snapshot(
        kind: RecordKind,
        version: u64,
        data: &Value,
    ) -> Result<Self, RefgraphError> {
        let data_json = serde_json::to_string(data)
            .map_err(|e| RefgraphError::Serialization(e.to_string()))?;
        Ok(Self {
            kind,
            version,
            data_json,
        })
    }

    pub(crate) fn into_snapshot(self, id: RecordId) -> Result<RecordSnapshot, RefgraphError> {
        let data: Value = serde_json::from_str(&self.data_json)
            .map_err(|e| RefgraphError::Serialization(e.to_string()))?;
        Ok(RecordSnapshot::new(id, self.kind, self.version, data))
    }
}

/// Check a snapshot write's optimistic version assertion against the
/// stored version, shared by both backends.
pub(crate) fn check_prior_version(
    write: &SnapshotWrite,
    stored: Option<u64>,
) -> Result<(), RefgraphError> {
    match (write.prior_version, stored) {
        (None, None) => Ok(()),
        (None, Some(found)) => Err(RefgraphError::ConcurrentModification {
            record: write.id,
            expected: 0,
            found,
        }),
        (Some(expected), Some(found)) if expected == found => Ok(()),
        (Some(expected), Some(found)) => Err(RefgraphError::ConcurrentModification {
            record: write.id,
            expected,
            found,
        }),
        (Some(_), None) => Err(RefgraphError::RecordNotFound(write.id)),
    }
}
