//! # Record Engine
//!
//! The write path of the relation graph. Every record lifecycle operation
//! (create, update, soft delete, hard delete) is planned here as one
//! [`CommitBatch`] and handed to the store, so the snapshot, the
//! identifier registry and the relation tables move together or not at
//! all.
//!
//! ## Lifecycle rules
//!
//! - Soft deletion tombstones the record and clears its outgoing edges;
//!   incoming edges stay until their own sources are rewritten or the
//!   record is hard-deleted. The asymmetry is intentional: citation counts
//!   filter dead citers at read time.
//! - A new or updated record may supersede others via its redirect
//!   pointers: each superseded record is tombstoned, its outgoing edges
//!   stripped, and its identifier re-pointed at the successor, all in the
//!   same transaction as the triggering write.
//! - Hard deletion purges the record, both edge directions and its
//!   registry entry. The identifier becomes unresolved, not redirected.

use crate::citations::{citation_counts, CitationCounts};
use crate::diff::{diff, RelationDelta};
use crate::extractor::RuleRegistry;
use crate::resolver::{RegistryStatus, Resolution};
use crate::snapshot::{validate_document, RecordRef, RecordSnapshot};
use crate::store::memory::MemoryStore;
use crate::store::redb_store::RedbStore;
use crate::store::{
    CommitBatch, EdgeWrite, RecordStore, RegistryOp, SnapshotWrite, StoreResolver,
};
use crate::{
    ControlNumber, EdgeTarget, RecordId, RecordKind, RefgraphError, RelationEdge, RelationKind,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// The two store implementations, chosen at engine construction.
#[derive(Debug)]
pub enum StorageBackend {
    InMemory(MemoryStore),
    Persistent(RedbStore),
}

impl StorageBackend {
    /// Open a persistent backend at the given path.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, RefgraphError> {
        Ok(Self::Persistent(RedbStore::open(path)?))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::InMemory(MemoryStore::new())
    }

    fn store(&self) -> &dyn RecordStore {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }

    fn store_mut(&mut self) -> &mut dyn RecordStore {
        match self {
            Self::InMemory(s) => s,
            Self::Persistent(s) => s,
        }
    }
}

// =============================================================================
// WRITE OPTIONS & SUMMARY
// =============================================================================

/// Per-write knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Skip recomputing this record's own edges. Redirect processing and
    /// the snapshot write itself still happen; the stored edge set is
    /// left as-is until the next normal write.
    pub disable_relations_update: bool,
    /// Optimistic concurrency: fail unless the stored version matches.
    pub expected_version: Option<u64>,
}

/// What a lifecycle operation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub record: RecordId,
    pub control_number: Option<ControlNumber>,
    pub version: u64,
    pub edges_added: usize,
    pub edges_removed: usize,
    /// Other records whose derived state this write touched: edge targets
    /// that changed, plus records superseded by this write.
    pub affected: BTreeSet<RecordId>,
}

/// A change to a record's authorship rows, for downstream consumers that
/// react to author link changes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthorChange {
    Added(EdgeTarget),
    Removed(EdgeTarget),
}

// =============================================================================
// ENGINE
// =============================================================================

/// The relation-graph engine over one storage backend.
#[derive(Debug)]
pub struct RecordEngine {
    backend: StorageBackend,
    rules: RuleRegistry,
}

impl RecordEngine {
    #[must_use]
    pub fn new(backend: StorageBackend, rules: RuleRegistry) -> Self {
        Self { backend, rules }
    }

    /// Ephemeral engine with the standard rule table.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(StorageBackend::in_memory(), RuleRegistry::standard())
    }

    /// Persistent engine with the standard rule table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RefgraphError> {
        Ok(Self::new(
            StorageBackend::persistent(path)?,
            RuleRegistry::standard(),
        ))
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn RecordStore {
        self.backend.store()
    }

    // =========================================================================
    // READ OPERATIONS
    // =========================================================================

    /// The stored snapshot of a record.
    pub fn snapshot(&self, id: RecordId) -> Result<RecordSnapshot, RefgraphError> {
        self.store()
            .get_snapshot(id)?
            .ok_or(RefgraphError::RecordNotFound(id))
    }

    /// Resolve an external identifier through the registry.
    pub fn resolve(
        &self,
        kind: RecordKind,
        control_number: ControlNumber,
    ) -> Result<Resolution, RefgraphError> {
        let entry = self.store().registry_entry(kind, control_number)?;
        Ok(Resolution::from_entry(entry))
    }

    /// The stored outgoing edges of a record.
    pub fn outgoing_edges(&self, id: RecordId) -> Result<BTreeSet<RelationEdge>, RefgraphError> {
        self.store().outgoing_edges(id)
    }

    /// Live citation counts of a record, computed at read time.
    pub fn citation_counts(&self, id: RecordId) -> Result<CitationCounts, RefgraphError> {
        citation_counts(self.store(), id)
    }

    /// The records currently holding edges onto `id`, across every
    /// relation table. Outer pipelines use this to re-enqueue dependent
    /// records after a write.
    pub fn affected_handles(&self, id: RecordId) -> Result<BTreeSet<RecordId>, RefgraphError> {
        let mut handles = BTreeSet::new();
        for kind in RelationKind::ALL {
            handles.extend(self.store().incoming_sources(id, kind)?);
        }
        Ok(handles)
    }

    /// Preview which citation targets a candidate document would add or
    /// remove relative to the stored state, without writing anything.
    pub fn modified_references(
        &self,
        id: RecordId,
        candidate: &Value,
    ) -> Result<BTreeSet<RecordId>, RefgraphError> {
        let delta = self.preview_delta(id, candidate)?;
        Ok(delta
            .to_add
            .iter()
            .chain(delta.to_remove.iter())
            .filter(|e| e.kind == RelationKind::Cites)
            .filter_map(|e| e.target.record())
            .collect())
    }

    /// Preview the authorship changes a candidate document would cause.
    pub fn modified_authors(
        &self,
        id: RecordId,
        candidate: &Value,
    ) -> Result<Vec<AuthorChange>, RefgraphError> {
        let delta = self.preview_delta(id, candidate)?;
        let mut changes = Vec::new();
        for edge in delta.to_add {
            if edge.kind == RelationKind::AuthoredBy {
                changes.push(AuthorChange::Added(edge.target));
            }
        }
        for edge in delta.to_remove {
            if edge.kind == RelationKind::AuthoredBy {
                changes.push(AuthorChange::Removed(edge.target));
            }
        }
        changes.sort();
        Ok(changes)
    }

    fn preview_delta(
        &self,
        id: RecordId,
        candidate: &Value,
    ) -> Result<RelationDelta, RefgraphError> {
        let current = self.snapshot(id)?;
        validate_document(current.kind(), candidate)?;
        let next = RecordSnapshot::new(id, current.kind(), current.version(), candidate.clone());
        let stored = self.store().outgoing_edges(id)?;
        let extracted = self
            .rules
            .extract(&next, &StoreResolver(self.store()));
        Ok(diff(&stored, &extracted))
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Create a record from a document.
    ///
    /// Assigns the next control number when the document does not declare
    /// one; rejects documents declaring an already-registered identifier.
    pub fn create(
        &mut self,
        kind: RecordKind,
        mut data: Value,
        options: &WriteOptions,
    ) -> Result<CommitSummary, RefgraphError> {
        validate_document(kind, &data)?;

        let control_number = match declared_control_number(&data) {
            Some(cn) => {
                if self.store().registry_entry(kind, cn)?.is_some() {
                    return Err(RefgraphError::DuplicateIdentifier {
                        endpoint: kind.endpoint(),
                        control_number: cn.0,
                    });
                }
                cn
            }
            None => {
                let cn = self.store().next_control_number(kind)?;
                set_control_number(&mut data, cn)?;
                cn
            }
        };

        let id = self.store().next_record_id()?;
        let snapshot = RecordSnapshot::new(id, kind, 1, data);

        let status = if snapshot.is_deleted() {
            RegistryStatus::Deleted(id)
        } else {
            RegistryStatus::Active(id)
        };

        let mut batch = CommitBatch {
            snapshots: vec![SnapshotWrite {
                id,
                kind,
                version: 1,
                prior_version: None,
                data: snapshot.data().clone(),
            }],
            registry: vec![RegistryOp::Set {
                kind,
                control_number,
                status,
            }],
            ..CommitBatch::default()
        };

        let mut affected = self.plan_redirects(id, &snapshot, &mut batch)?;

        let delta = if options.disable_relations_update {
            RelationDelta::default()
        } else {
            let extracted = self
                .rules
                .extract(&snapshot, &StoreResolver(self.store()));
            diff(&BTreeSet::new(), &extracted)
        };
        collect_affected(&delta, &mut affected);
        let (edges_added, edges_removed) = (delta.to_add.len(), delta.to_remove.len());
        if !delta.is_empty() {
            batch.edges.push(EdgeWrite { source: id, delta });
        }

        self.backend.store_mut().commit(batch)?;
        Ok(CommitSummary {
            record: id,
            control_number: Some(control_number),
            version: 1,
            edges_added,
            edges_removed,
            affected,
        })
    }

    // =========================================================================
    // UPDATE
    // =========================================================================

    /// Replace a record's document, recomputing its edges incrementally.
    ///
    /// Writing a tombstoned document is the same as a soft delete; writing
    /// a live document over a tombstone revives the record.
    pub fn update(
        &mut self,
        id: RecordId,
        mut data: Value,
        options: &WriteOptions,
    ) -> Result<CommitSummary, RefgraphError> {
        let current = self.snapshot(id)?;
        validate_document(current.kind(), &data)?;

        if let Some(expected) = options.expected_version {
            if expected != current.version() {
                return Err(RefgraphError::ConcurrentModification {
                    record: id,
                    expected,
                    found: current.version(),
                });
            }
        }

        // The external identifier is immutable once assigned.
        let control_number = match (current.control_number(), declared_control_number(&data)) {
            (Some(stored), Some(declared)) if stored != declared => {
                return Err(RefgraphError::Validation(
                    "control_number cannot change".to_string(),
                ));
            }
            (Some(stored), _) => {
                set_control_number(&mut data, stored)?;
                Some(stored)
            }
            (None, declared) => declared,
        };

        let kind = current.kind();
        let version = current.version().saturating_add(1);
        let snapshot = RecordSnapshot::new(id, kind, version, data);

        let mut batch = CommitBatch {
            snapshots: vec![SnapshotWrite {
                id,
                kind,
                version,
                prior_version: Some(current.version()),
                data: snapshot.data().clone(),
            }],
            ..CommitBatch::default()
        };

        if let Some(cn) = control_number {
            let status = if snapshot.is_deleted() {
                RegistryStatus::Deleted(id)
            } else {
                RegistryStatus::Active(id)
            };
            batch.registry.push(RegistryOp::Set {
                kind,
                control_number: cn,
                status,
            });
        }

        let mut affected = self.plan_redirects(id, &snapshot, &mut batch)?;

        let delta = if options.disable_relations_update {
            RelationDelta::default()
        } else {
            let stored = self.store().outgoing_edges(id)?;
            let extracted = self
                .rules
                .extract(&snapshot, &StoreResolver(self.store()));
            diff(&stored, &extracted)
        };
        collect_affected(&delta, &mut affected);
        let (edges_added, edges_removed) = (delta.to_add.len(), delta.to_remove.len());
        if !delta.is_empty() {
            batch.edges.push(EdgeWrite { source: id, delta });
        }

        self.backend.store_mut().commit(batch)?;
        Ok(CommitSummary {
            record: id,
            control_number,
            version,
            edges_added,
            edges_removed,
            affected,
        })
    }

    // =========================================================================
    // DELETE
    // =========================================================================

    /// Soft-delete a record: tombstone the document, mark its identifier
    /// deleted and clear its outgoing edges. Incoming edges are left in
    /// place.
    pub fn delete(&mut self, id: RecordId) -> Result<CommitSummary, RefgraphError> {
        let current = self.snapshot(id)?;
        let mut data = current.data().clone();
        mark_deleted(&mut data)?;
        self.update(id, data, &WriteOptions::default())
    }

    /// Hard-delete a record: purge the snapshot, both edge directions and
    /// the registry entry. The identifier stops resolving entirely.
    pub fn hard_delete(&mut self, id: RecordId) -> Result<(), RefgraphError> {
        let current = self.snapshot(id)?;
        let mut batch = CommitBatch {
            purge_incoming: vec![id],
            purge_records: vec![id],
            ..CommitBatch::default()
        };
        if let Some(cn) = current.control_number() {
            batch.registry.push(RegistryOp::Remove {
                kind: current.kind(),
                control_number: cn,
            });
        }
        self.backend.store_mut().commit(batch)
    }

    // =========================================================================
    // REDIRECTS
    // =========================================================================

    /// Plan the side effects of a snapshot's redirect pointers.
    ///
    /// For every superseded record: tombstone it, strip its outgoing
    /// edges, and re-point its registry entry at the successor. Pointers
    /// at unknown identifiers, the wrong kind or the successor itself are
    /// ignored.
    fn plan_redirects(
        &self,
        successor: RecordId,
        snapshot: &RecordSnapshot,
        batch: &mut CommitBatch,
    ) -> Result<BTreeSet<RecordId>, RefgraphError> {
        let mut affected = BTreeSet::new();
        for reference in snapshot.superseded_records() {
            if reference.kind != snapshot.kind() {
                continue;
            }
            let Some(superseded) = self.superseded_target(successor, reference)? else {
                continue;
            };

            batch.registry.push(RegistryOp::Set {
                kind: reference.kind,
                control_number: reference.control_number,
                status: RegistryStatus::Redirected(successor),
            });

            if let Some(old) = self.store().get_snapshot(superseded)? {
                let mut data = old.data().clone();
                mark_deleted(&mut data)?;
                batch.snapshots.push(SnapshotWrite {
                    id: superseded,
                    kind: old.kind(),
                    version: old.version().saturating_add(1),
                    prior_version: Some(old.version()),
                    data,
                });
                let stored = self.store().outgoing_edges(superseded)?;
                if !stored.is_empty() {
                    batch.edges.push(EdgeWrite {
                        source: superseded,
                        delta: RelationDelta::remove_all(&stored),
                    });
                }
            }
            affected.insert(superseded);
        }
        Ok(affected)
    }

    /// The record a redirect pointer supersedes, if the pointer is
    /// actionable.
    fn superseded_target(
        &self,
        successor: RecordId,
        reference: RecordRef,
    ) -> Result<Option<RecordId>, RefgraphError> {
        let entry = self
            .store()
            .registry_entry(reference.kind, reference.control_number)?;
        match entry {
            Some(RegistryStatus::Active(id) | RegistryStatus::Deleted(id)) if id != successor => {
                Ok(Some(id))
            }
            // Already redirected elsewhere, unregistered, or pointing at
            // the successor itself: nothing to supersede.
            _ => Ok(None),
        }
    }
}

// =============================================================================
// DOCUMENT HELPERS
// =============================================================================

fn declared_control_number(data: &Value) -> Option<ControlNumber> {
    data.get("control_number")
        .and_then(Value::as_u64)
        .map(ControlNumber)
}

fn set_control_number(data: &mut Value, cn: ControlNumber) -> Result<(), RefgraphError> {
    let object = data.as_object_mut().ok_or_else(|| {
        RefgraphError::Validation("document must be a JSON object".to_string())
    })?;
    object.insert("control_number".to_string(), Value::from(cn.0));
    Ok(())
}

fn mark_deleted(data: &mut Value) -> Result<(), RefgraphError> {
    let object = data.as_object_mut().ok_or_else(|| {
        RefgraphError::Validation("document must be a JSON object".to_string())
    })?;
    object.insert("deleted".to_string(), Value::Bool(true));
    Ok(())
}

fn collect_affected(delta: &RelationDelta, affected: &mut BTreeSet<RecordId>) {
    for edge in delta.to_add.iter().chain(delta.to_remove.iter()) {
        if let Some(target) = edge.target.record() {
            affected.insert(target);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> RecordEngine {
        RecordEngine::in_memory()
    }

    #[test]
    fn create_assigns_control_number_when_absent() {
        let mut engine = engine();
        let summary = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        assert_eq!(summary.control_number, Some(ControlNumber(1)));
        assert_eq!(summary.version, 1);

        let summary = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        assert_eq!(summary.control_number, Some(ControlNumber(2)));
    }

    #[test]
    fn create_rejects_duplicate_control_number() {
        let mut engine = engine();
        engine
            .create(
                RecordKind::Literature,
                json!({"control_number": 5}),
                &WriteOptions::default(),
            )
            .unwrap();
        let err = engine
            .create(
                RecordKind::Literature,
                json!({"control_number": 5}),
                &WriteOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RefgraphError::DuplicateIdentifier { .. }));
    }

    #[test]
    fn update_rejects_control_number_change() {
        let mut engine = engine();
        let summary = engine
            .create(
                RecordKind::Literature,
                json!({"control_number": 5}),
                &WriteOptions::default(),
            )
            .unwrap();
        let err = engine
            .update(
                summary.record,
                json!({"control_number": 6}),
                &WriteOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RefgraphError::Validation(_)));
    }

    #[test]
    fn update_checks_expected_version() {
        let mut engine = engine();
        let summary = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        let err = engine
            .update(
                summary.record,
                json!({}),
                &WriteOptions {
                    expected_version: Some(7),
                    ..WriteOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RefgraphError::ConcurrentModification {
                expected: 7,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn update_of_missing_record_fails() {
        let mut engine = engine();
        let err = engine
            .update(RecordId(9), json!({}), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, RefgraphError::RecordNotFound(RecordId(9))));
    }

    #[test]
    fn soft_delete_marks_registry_and_clears_outgoing() {
        let mut engine = engine();
        let cited = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        let citer = engine
            .create(
                RecordKind::Literature,
                json!({"references": [
                    {"record": {"$ref": "https://x/api/literature/1"}}
                ]}),
                &WriteOptions::default(),
            )
            .unwrap();
        assert_eq!(engine.outgoing_edges(citer.record).unwrap().len(), 1);

        engine.delete(citer.record).unwrap();
        assert!(engine.outgoing_edges(citer.record).unwrap().is_empty());
        assert_eq!(
            engine
                .resolve(RecordKind::Literature, citer.control_number.unwrap())
                .unwrap(),
            Resolution::Deleted(citer.record)
        );
        // The cited record is untouched.
        assert_eq!(
            engine
                .resolve(RecordKind::Literature, cited.control_number.unwrap())
                .unwrap(),
            Resolution::Resolved(cited.record)
        );
    }

    #[test]
    fn hard_delete_unregisters_and_purges() {
        let mut engine = engine();
        let cited = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        let citer = engine
            .create(
                RecordKind::Literature,
                json!({"references": [
                    {"record": {"$ref": "https://x/api/literature/1"}}
                ]}),
                &WriteOptions::default(),
            )
            .unwrap();

        engine.hard_delete(cited.record).unwrap();
        assert_eq!(
            engine
                .resolve(RecordKind::Literature, cited.control_number.unwrap())
                .unwrap(),
            Resolution::Unresolved
        );
        assert!(engine.snapshot(cited.record).is_err());
        // The citer's row pointing at the purged record is gone too.
        assert!(engine.outgoing_edges(citer.record).unwrap().is_empty());
    }

    #[test]
    fn disable_relations_update_skips_edge_recompute() {
        let mut engine = engine();
        engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        let citer = engine
            .create(
                RecordKind::Literature,
                json!({"references": [
                    {"record": {"$ref": "https://x/api/literature/1"}}
                ]}),
                &WriteOptions {
                    disable_relations_update: true,
                    ..WriteOptions::default()
                },
            )
            .unwrap();
        assert_eq!(citer.edges_added, 0);
        assert!(engine.outgoing_edges(citer.record).unwrap().is_empty());

        // The next normal write catches the tables up.
        let snapshot = engine.snapshot(citer.record).unwrap();
        let summary = engine
            .update(
                citer.record,
                snapshot.data().clone(),
                &WriteOptions::default(),
            )
            .unwrap();
        assert_eq!(summary.edges_added, 1);
    }

    #[test]
    fn affected_records_include_edge_targets() {
        let mut engine = engine();
        let cited = engine
            .create(RecordKind::Literature, json!({}), &WriteOptions::default())
            .unwrap();
        let citer = engine
            .create(
                RecordKind::Literature,
                json!({"references": [
                    {"record": {"$ref": "https://x/api/literature/1"}}
                ]}),
                &WriteOptions::default(),
            )
            .unwrap();
        assert!(citer.affected.contains(&cited.record));
    }
}
