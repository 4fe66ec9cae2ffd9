//! # In-Memory Store
//!
//! `BTreeMap`-backed store for tests and ephemeral runs. Commit validates
//! every optimistic assertion before touching any map, so a failed batch
//! leaves the store exactly as it was.

use super::{check_prior_version, CommitBatch, RecordStore, RegistryOp};
use crate::resolver::RegistryStatus;
use crate::snapshot::RecordSnapshot;
use crate::{ControlNumber, RecordId, RecordKind, RefgraphError, RelationEdge, RelationKind};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Clone)]
struct MemoryRow {
    kind: RecordKind,
    version: u64,
    data: Value,
}

/// Ephemeral store with the same commit semantics as the persistent one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<RecordId, MemoryRow>,
    registry: BTreeMap<(RecordKind, ControlNumber), RegistryStatus>,
    edges: BTreeMap<RecordId, BTreeSet<RelationEdge>>,
    incoming: BTreeMap<RecordId, BTreeMap<RelationKind, BTreeSet<RecordId>>>,
    next_id: u64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn unlink_incoming(&mut self, source: RecordId, kind: RelationKind, target: RecordId) {
        if let Some(by_kind) = self.incoming.get_mut(&target) {
            if let Some(sources) = by_kind.get_mut(&kind) {
                sources.remove(&source);
                if sources.is_empty() {
                    by_kind.remove(&kind);
                }
            }
            if by_kind.is_empty() {
                self.incoming.remove(&target);
            }
        }
    }
}

impl RecordStore for MemoryStore {
    fn get_snapshot(&self, id: RecordId) -> Result<Option<RecordSnapshot>, RefgraphError> {
        Ok(self.records.get(&id).map(|row| {
            RecordSnapshot::new(id, row.kind, row.version, row.data.clone())
        }))
    }

    fn record_exists(&self, id: RecordId) -> Result<bool, RefgraphError> {
        Ok(self.records.contains_key(&id))
    }

    fn registry_entry(
        &self,
        kind: RecordKind,
        control_number: ControlNumber,
    ) -> Result<Option<RegistryStatus>, RefgraphError> {
        Ok(self.registry.get(&(kind, control_number)).copied())
    }

    fn outgoing_edges(&self, id: RecordId) -> Result<BTreeSet<RelationEdge>, RefgraphError> {
        Ok(self.edges.get(&id).cloned().unwrap_or_default())
    }

    fn incoming_sources(
        &self,
        target: RecordId,
        kind: RelationKind,
    ) -> Result<BTreeSet<RecordId>, RefgraphError> {
        Ok(self
            .incoming
            .get(&target)
            .and_then(|by_kind| by_kind.get(&kind))
            .cloned()
            .unwrap_or_default())
    }

    fn record_ids(&self) -> Result<Vec<RecordId>, RefgraphError> {
        Ok(self.records.keys().copied().collect())
    }

    fn registry_len(&self) -> Result<u64, RefgraphError> {
        Ok(self.registry.len() as u64)
    }

    fn next_record_id(&self) -> Result<RecordId, RefgraphError> {
        Ok(RecordId(self.next_id.saturating_add(1)))
    }

    fn next_control_number(&self, kind: RecordKind) -> Result<ControlNumber, RefgraphError> {
        let last = self
            .registry
            .range((kind, ControlNumber(0))..=(kind, ControlNumber(u64::MAX)))
            .next_back()
            .map_or(0, |((_, cn), _)| cn.0);
        Ok(ControlNumber(last.saturating_add(1)))
    }

    fn commit(&mut self, batch: CommitBatch) -> Result<(), RefgraphError> {
        // Validate everything up front; the mutation phase below is
        // infallible, which is what makes the batch atomic.
        for write in &batch.snapshots {
            let stored = self.records.get(&write.id).map(|row| row.version);
            check_prior_version(write, stored)?;
        }

        for write in batch.snapshots {
            self.next_id = self.next_id.max(write.id.0);
            self.records.insert(
                write.id,
                MemoryRow {
                    kind: write.kind,
                    version: write.version,
                    data: write.data,
                },
            );
        }

        for op in batch.registry {
            match op {
                RegistryOp::Set {
                    kind,
                    control_number,
                    status,
                } => {
                    self.registry.insert((kind, control_number), status);
                }
                RegistryOp::Remove {
                    kind,
                    control_number,
                } => {
                    self.registry.remove(&(kind, control_number));
                }
            }
        }

        for write in batch.edges {
            let source = write.source;
            for edge in &write.delta.to_remove {
                if let Some(set) = self.edges.get_mut(&source) {
                    set.remove(edge);
                }
                if let Some(target) = edge.target.record() {
                    self.unlink_incoming(source, edge.kind, target);
                }
            }
            for edge in write.delta.to_add {
                if let Some(target) = edge.target.record() {
                    self.incoming
                        .entry(target)
                        .or_default()
                        .entry(edge.kind)
                        .or_default()
                        .insert(source);
                }
                self.edges.entry(source).or_default().insert(edge);
            }
            if self.edges.get(&source).is_some_and(BTreeSet::is_empty) {
                self.edges.remove(&source);
            }
        }

        for target in batch.purge_incoming {
            if let Some(by_kind) = self.incoming.remove(&target) {
                for sources in by_kind.values() {
                    for source in sources {
                        if let Some(set) = self.edges.get_mut(source) {
                            set.retain(|e| e.target.record() != Some(target));
                            if set.is_empty() {
                                self.edges.remove(source);
                            }
                        }
                    }
                }
            }
        }

        for id in batch.purge_records {
            self.records.remove(&id);
            if let Some(outgoing) = self.edges.remove(&id) {
                for edge in outgoing {
                    if let Some(target) = edge.target.record() {
                        self.unlink_incoming(id, edge.kind, target);
                    }
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
