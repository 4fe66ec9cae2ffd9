//! # redb-backed Record Store
//!
//! The persistent store, using the redb embedded database:
//! - ACID transactions (a [`CommitBatch`] is exactly one write transaction)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Rows are postcard-encoded. The snapshot document itself travels as a
//! JSON string inside the row (see [`RecordRow`]) because postcard is not
//! self-describing.

use super::{check_prior_version, CommitBatch, RecordRow, RecordStore, RegistryOp};
use crate::resolver::RegistryStatus;
use crate::snapshot::RecordSnapshot;
use crate::{ControlNumber, RecordId, RecordKind, RefgraphError, RelationEdge, RelationKind};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Record rows: RecordId(u64) -> postcard [`RecordRow`]
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Identifier registry: (endpoint, control_number) -> postcard [`RegistryStatus`]
const REGISTRY: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("registry");

/// Outgoing edges: RecordId(u64) -> postcard `BTreeSet<RelationEdge>`
const OUTGOING: TableDefinition<u64, &[u8]> = TableDefinition::new("outgoing");

/// Incoming index: RecordId(u64) -> postcard `BTreeMap<RelationKind, BTreeSet<RecordId>>`
const INCOMING: TableDefinition<u64, &[u8]> = TableDefinition::new("incoming");

/// Metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

type IncomingMap = BTreeMap<RelationKind, BTreeSet<RecordId>>;

fn storage_err(e: impl std::fmt::Display) -> RefgraphError {
    RefgraphError::Storage(e.to_string())
}

fn codec_err(e: impl std::fmt::Display) -> RefgraphError {
    RefgraphError::Serialization(e.to_string())
}

// =============================================================================
// REDB STORE
// =============================================================================

/// A disk-backed record store using redb.
pub struct RedbStore {
    db: Database,
    /// Highest record handle ever committed; mirrored in METADATA.
    next_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RefgraphError> {
        let db = Database::create(path.as_ref()).map_err(storage_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_err)?;
            let _ = write_txn.open_table(RECORDS).map_err(storage_err)?;
            let _ = write_txn.open_table(REGISTRY).map_err(storage_err)?;
            let _ = write_txn.open_table(OUTGOING).map_err(storage_err)?;
            let _ = write_txn.open_table(INCOMING).map_err(storage_err)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_err)?;
            write_txn.commit().map_err(storage_err)?;
        }

        let read_txn = db.begin_read().map_err(storage_err)?;
        let next_id = {
            let table = read_txn.open_table(METADATA).map_err(storage_err)?;
            table
                .get("next_record_id")
                .map_err(storage_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_id })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), RefgraphError> {
        self.db.compact().map_err(storage_err)?;
        Ok(())
    }
}

// =============================================================================
// ROW HELPERS
// =============================================================================

fn read_row<T>(table: &T, id: u64) -> Result<Option<RecordRow>, RefgraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    table
        .get(id)
        .map_err(storage_err)?
        .map(|g| postcard::from_bytes(g.value()))
        .transpose()
        .map_err(codec_err)
}

fn read_edges<T>(table: &T, id: u64) -> Result<BTreeSet<RelationEdge>, RefgraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    Ok(table
        .get(id)
        .map_err(storage_err)?
        .map(|g| postcard::from_bytes(g.value()))
        .transpose()
        .map_err(codec_err)?
        .unwrap_or_default())
}

fn read_incoming<T>(table: &T, id: u64) -> Result<IncomingMap, RefgraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    Ok(table
        .get(id)
        .map_err(storage_err)?
        .map(|g| postcard::from_bytes(g.value()))
        .transpose()
        .map_err(codec_err)?
        .unwrap_or_default())
}

/// Write a row back, removing it when the encoded value would be empty.
fn write_edges(
    table: &mut redb::Table<u64, &[u8]>,
    id: u64,
    edges: &BTreeSet<RelationEdge>,
) -> Result<(), RefgraphError> {
    if edges.is_empty() {
        table.remove(id).map_err(storage_err)?;
    } else {
        let bytes = postcard::to_allocvec(edges).map_err(codec_err)?;
        table.insert(id, bytes.as_slice()).map_err(storage_err)?;
    }
    Ok(())
}

fn write_incoming(
    table: &mut redb::Table<u64, &[u8]>,
    id: u64,
    map: &IncomingMap,
) -> Result<(), RefgraphError> {
    if map.is_empty() {
        table.remove(id).map_err(storage_err)?;
    } else {
        let bytes = postcard::to_allocvec(map).map_err(codec_err)?;
        table.insert(id, bytes.as_slice()).map_err(storage_err)?;
    }
    Ok(())
}

fn unlink_incoming(
    table: &mut redb::Table<u64, &[u8]>,
    source: RecordId,
    kind: RelationKind,
    target: RecordId,
) -> Result<(), RefgraphError> {
    let mut map = read_incoming(table, target.0)?;
    if let Some(sources) = map.get_mut(&kind) {
        sources.remove(&source);
        if sources.is_empty() {
            map.remove(&kind);
        }
    }
    write_incoming(table, target.0, &map)
}

fn link_incoming(
    table: &mut redb::Table<u64, &[u8]>,
    source: RecordId,
    kind: RelationKind,
    target: RecordId,
) -> Result<(), RefgraphError> {
    let mut map = read_incoming(table, target.0)?;
    map.entry(kind).or_default().insert(source);
    write_incoming(table, target.0, &map)
}

// =============================================================================
// STORE TRAIT IMPL
// =============================================================================

impl RecordStore for RedbStore {
    fn get_snapshot(&self, id: RecordId) -> Result<Option<RecordSnapshot>, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(RECORDS).map_err(storage_err)?;
        read_row(&table, id.0)?
            .map(|row| row.into_snapshot(id))
            .transpose()
    }

    fn record_exists(&self, id: RecordId) -> Result<bool, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(RECORDS).map_err(storage_err)?;
        Ok(table.get(id.0).map_err(storage_err)?.is_some())
    }

    fn registry_entry(
        &self,
        kind: RecordKind,
        control_number: ControlNumber,
    ) -> Result<Option<RegistryStatus>, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(REGISTRY).map_err(storage_err)?;
        table
            .get((kind.endpoint(), control_number.0))
            .map_err(storage_err)?
            .map(|g| postcard::from_bytes(g.value()))
            .transpose()
            .map_err(codec_err)
    }

    fn outgoing_edges(&self, id: RecordId) -> Result<BTreeSet<RelationEdge>, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(OUTGOING).map_err(storage_err)?;
        read_edges(&table, id.0)
    }

    fn incoming_sources(
        &self,
        target: RecordId,
        kind: RelationKind,
    ) -> Result<BTreeSet<RecordId>, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(INCOMING).map_err(storage_err)?;
        Ok(read_incoming(&table, target.0)?
            .remove(&kind)
            .unwrap_or_default())
    }

    fn record_ids(&self) -> Result<Vec<RecordId>, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(RECORDS).map_err(storage_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(storage_err)? {
            let (key, _) = entry.map_err(storage_err)?;
            ids.push(RecordId(key.value()));
        }
        Ok(ids)
    }

    fn registry_len(&self) -> Result<u64, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(REGISTRY).map_err(storage_err)?;
        table.len().map_err(storage_err)
    }

    fn next_record_id(&self) -> Result<RecordId, RefgraphError> {
        Ok(RecordId(self.next_id.saturating_add(1)))
    }

    fn next_control_number(&self, kind: RecordKind) -> Result<ControlNumber, RefgraphError> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(REGISTRY).map_err(storage_err)?;
        let endpoint = kind.endpoint();
        let mut last = 0;
        for entry in table
            .range((endpoint, 0)..=(endpoint, u64::MAX))
            .map_err(storage_err)?
        {
            let (key, _) = entry.map_err(storage_err)?;
            last = key.value().1;
        }
        Ok(ControlNumber(last.saturating_add(1)))
    }

    fn commit(&mut self, batch: CommitBatch) -> Result<(), RefgraphError> {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let mut max_id = self.next_id;

        // The write transaction rolls back when dropped without commit, so
        // any early return below leaves the database untouched.
        {
            let mut records = write_txn.open_table(RECORDS).map_err(storage_err)?;
            let mut registry = write_txn.open_table(REGISTRY).map_err(storage_err)?;
            let mut outgoing = write_txn.open_table(OUTGOING).map_err(storage_err)?;
            let mut incoming = write_txn.open_table(INCOMING).map_err(storage_err)?;
            let mut metadata = write_txn.open_table(METADATA).map_err(storage_err)?;

            for write in &batch.snapshots {
                let stored = read_row(&records, write.id.0)?.map(|row| row.version);
                check_prior_version(write, stored)?;
            }

            for write in batch.snapshots {
                let row = RecordRow::from_snapshot(write.kind, write.version, &write.data)?;
                let bytes = postcard::to_allocvec(&row).map_err(codec_err)?;
                records
                    .insert(write.id.0, bytes.as_slice())
                    .map_err(storage_err)?;
                max_id = max_id.max(write.id.0);
            }

            for op in batch.registry {
                match op {
                    RegistryOp::Set {
                        kind,
                        control_number,
                        status,
                    } => {
                        let bytes = postcard::to_allocvec(&status).map_err(codec_err)?;
                        registry
                            .insert((kind.endpoint(), control_number.0), bytes.as_slice())
                            .map_err(storage_err)?;
                    }
                    RegistryOp::Remove {
                        kind,
                        control_number,
                    } => {
                        registry
                            .remove((kind.endpoint(), control_number.0))
                            .map_err(storage_err)?;
                    }
                }
            }

            for write in batch.edges {
                let source = write.source;
                let mut edges = read_edges(&outgoing, source.0)?;
                for edge in &write.delta.to_remove {
                    if edges.remove(edge) {
                        if let Some(target) = edge.target.record() {
                            unlink_incoming(&mut incoming, source, edge.kind, target)?;
                        }
                    }
                }
                for edge in write.delta.to_add {
                    if let Some(target) = edge.target.record() {
                        link_incoming(&mut incoming, source, edge.kind, target)?;
                    }
                    edges.insert(edge);
                }
                write_edges(&mut outgoing, source.0, &edges)?;
            }

            for target in batch.purge_incoming {
                let map = read_incoming(&incoming, target.0)?;
                incoming.remove(target.0).map_err(storage_err)?;
                let mut sources = BTreeSet::new();
                for kind_sources in map.values() {
                    sources.extend(kind_sources.iter().copied());
                }
                for source in sources {
                    let mut edges = read_edges(&outgoing, source.0)?;
                    edges.retain(|e| e.target.record() != Some(target));
                    write_edges(&mut outgoing, source.0, &edges)?;
                }
            }

            for id in batch.purge_records {
                records.remove(id.0).map_err(storage_err)?;
                let edges = read_edges(&outgoing, id.0)?;
                outgoing.remove(id.0).map_err(storage_err)?;
                for edge in edges {
                    if let Some(target) = edge.target.record() {
                        unlink_incoming(&mut incoming, id, edge.kind, target)?;
                    }
                }
            }

            metadata
                .insert("next_record_id", max_id)
                .map_err(storage_err)?;
        }

        write_txn.commit().map_err(storage_err)?;
        self.next_id = max_id;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
