//! # CLI Command Implementations

use refgraph_core::{
    ControlNumber, EdgeTarget, RecordEngine, RecordId, RecordKind, RefgraphError,
    RelationEdge, Resolution, WriteOptions,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for bulk loads (100 MB).
///
/// This prevents memory exhaustion from malicious or accidental large files.
const MAX_LOAD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of documents in one bulk load.
const MAX_LOAD_RECORDS: usize = 100_000;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), RefgraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RefgraphError::Storage(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(RefgraphError::Validation(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate file path before reading.
///
/// Canonicalizes the path (resolving symlinks and "..") and ensures it
/// names a regular file, so a path like "../../../etc/passwd" cannot be
/// smuggled past the caller's expectations.
fn validate_file_path(path: &Path) -> Result<PathBuf, RefgraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        RefgraphError::Storage(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(RefgraphError::Storage(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn open_engine(db_path: &Path) -> Result<RecordEngine, RefgraphError> {
    RecordEngine::open(db_path)
}

/// Resolve a CLI-supplied identifier to a record handle, following one
/// redirect hop if the registry recorded one.
fn resolve_handle(
    engine: &RecordEngine,
    kind: RecordKind,
    control_number: u64,
) -> Result<RecordId, RefgraphError> {
    match engine.resolve(kind, ControlNumber(control_number))? {
        Resolution::Resolved(id) | Resolution::Deleted(id) => Ok(id),
        Resolution::Unresolved => Err(RefgraphError::Validation(format!(
            "Identifier {}/{} is not registered",
            kind.endpoint(),
            control_number
        ))),
    }
}

fn describe_edge(edge: &RelationEdge) -> String {
    let target = match &edge.target {
        EdgeTarget::Record(id) => format!("record {}", id.0),
        EdgeTarget::Collaboration(value) => format!("collaboration {value}"),
    };
    match edge.attrs.degree_type {
        Some(degree) => format!("{:?} -> {} ({})", edge.kind, target, degree.as_str()),
        None => format!("{:?} -> {}", edge.kind, target),
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), RefgraphError> {
    if db_path.exists() {
        if !force {
            return Err(RefgraphError::Storage(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| RefgraphError::Storage(format!("Remove database: {}", e)))?;
    }

    let _engine = RecordEngine::open(db_path)?;
    println!("Initialized new database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Bulk-load records from a JSON array file.
pub fn cmd_load(
    db_path: &Path,
    file: &Path,
    kind: RecordKind,
    skip_relations: bool,
    json_mode: bool,
) -> Result<(), RefgraphError> {
    tracing::info!("Loading {:?} records from {:?}", kind, file);

    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_LOAD_FILE_SIZE)?;

    let contents = std::fs::read(&validated_path)
        .map_err(|e| RefgraphError::Storage(format!("Read file: {}", e)))?;
    let documents: Vec<serde_json::Value> = serde_json::from_slice(&contents)
        .map_err(|e| RefgraphError::Serialization(format!("Parse input: {}", e)))?;

    if documents.len() > MAX_LOAD_RECORDS {
        return Err(RefgraphError::Validation(format!(
            "Document count {} exceeds maximum allowed {}",
            documents.len(),
            MAX_LOAD_RECORDS
        )));
    }

    let options = WriteOptions {
        disable_relations_update: skip_relations,
        ..WriteOptions::default()
    };

    let mut engine = open_engine(db_path)?;
    let mut loaded: u64 = 0;
    let mut edges_added: u64 = 0;
    for document in documents {
        let summary = engine.create(kind, document, &options)?;
        loaded = loaded.saturating_add(1);
        edges_added = edges_added.saturating_add(summary.edges_added as u64);
        tracing::debug!(
            "Created {}/{:?} as record {}",
            kind.endpoint(),
            summary.control_number,
            summary.record.0
        );
    }

    if json_mode {
        let output = serde_json::json!({
            "loaded": loaded,
            "edges_added": edges_added,
            "skip_relations": skip_relations
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Loaded {} records ({} relation rows)", loaded, edges_added);
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show a record and its relation rows.
pub fn cmd_show(
    db_path: &Path,
    kind: RecordKind,
    control_number: u64,
    json_mode: bool,
) -> Result<(), RefgraphError> {
    let engine = open_engine(db_path)?;
    let id = resolve_handle(&engine, kind, control_number)?;
    let snapshot = engine.snapshot(id)?;
    let edges = engine.outgoing_edges(id)?;

    if json_mode {
        let output = serde_json::json!({
            "record": id.0,
            "kind": kind.endpoint(),
            "version": snapshot.version(),
            "deleted": snapshot.is_deleted(),
            "data": snapshot.data(),
            "edges": edges
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Record {} ({}/{})", id.0, kind.endpoint(), control_number);
    println!("Version: {}", snapshot.version());
    if snapshot.is_deleted() {
        println!("Status:  deleted");
    }
    println!();
    println!("Relations ({}):", edges.len());
    for edge in &edges {
        println!("  {}", describe_edge(edge));
    }
    Ok(())
}

// =============================================================================
// CITATIONS COMMAND
// =============================================================================

/// Show citation counts for a record.
pub fn cmd_citations(
    db_path: &Path,
    kind: RecordKind,
    control_number: u64,
    json_mode: bool,
) -> Result<(), RefgraphError> {
    let engine = open_engine(db_path)?;
    let id = resolve_handle(&engine, kind, control_number)?;
    let counts = engine.citation_counts(id)?;

    if json_mode {
        let output = serde_json::json!({
            "record": id.0,
            "citations": counts.total,
            "citations_without_self": counts.without_self
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Citations for {}/{}", kind.endpoint(), control_number);
    println!("  Total:        {}", counts.total);
    println!("  Without self: {}", counts.without_self);
    Ok(())
}

// =============================================================================
// DELETE COMMAND
// =============================================================================

/// Delete a record, soft by default.
pub fn cmd_delete(
    db_path: &Path,
    kind: RecordKind,
    control_number: u64,
    hard: bool,
) -> Result<(), RefgraphError> {
    let mut engine = open_engine(db_path)?;
    let id = resolve_handle(&engine, kind, control_number)?;

    if hard {
        engine.hard_delete(id)?;
        println!(
            "Purged {}/{} (record {})",
            kind.endpoint(),
            control_number,
            id.0
        );
    } else {
        let summary = engine.delete(id)?;
        println!(
            "Deleted {}/{} (record {}, {} relation rows removed)",
            kind.endpoint(),
            control_number,
            id.0,
            summary.edges_removed
        );
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show database status.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), RefgraphError> {
    let engine = open_engine(db_path)?;
    let store = engine.store();

    let ids = store.record_ids()?;
    let mut edge_count: u64 = 0;
    let mut deleted_count: u64 = 0;
    for id in &ids {
        edge_count = edge_count.saturating_add(store.outgoing_edges(*id)?.len() as u64);
        if store.get_snapshot(*id)?.is_some_and(|s| s.is_deleted()) {
            deleted_count = deleted_count.saturating_add(1);
        }
    }
    let registry_count = store.registry_len()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "record_count": ids.len(),
            "deleted_count": deleted_count,
            "edge_count": edge_count,
            "registry_count": registry_count
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("refgraph Database Status");
    println!("========================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Records:     {}", ids.len());
    println!("  deleted:   {}", deleted_count);
    println!("Edges:       {}", edge_count);
    println!("Identifiers: {}", registry_count);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn load_then_citations_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("refgraph.redb");

        let records = json!([
            {"control_number": 1, "titles": [{"title": "Cited"}]},
            {"control_number": 2, "references": [
                {"record": {"$ref": "https://inspirehep.net/api/literature/1"}}
            ]}
        ]);
        let input = dir.path().join("records.json");
        let mut file = std::fs::File::create(&input).unwrap();
        file.write_all(records.to_string().as_bytes()).unwrap();

        cmd_load(&db, &input, RecordKind::Literature, false, false).unwrap();

        let engine = open_engine(&db).unwrap();
        let cited = resolve_handle(&engine, RecordKind::Literature, 1).unwrap();
        assert_eq!(engine.citation_counts(cited).unwrap().total, 1);
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("refgraph.redb");
        cmd_init(&db, false).unwrap();
        assert!(cmd_init(&db, false).is_err());
        cmd_init(&db, true).unwrap();
    }

    #[test]
    fn load_rejects_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("refgraph.redb");
        assert!(cmd_load(&db, dir.path(), RecordKind::Literature, false, false).is_err());
    }
}
