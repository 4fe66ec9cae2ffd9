//! # refgraph-core
//!
//! The deterministic relation-graph engine for refgraph - THE LOGIC.
//!
//! This crate maintains the derived relation tables of a scholarly record
//! corpus: citations, authorship, affiliations, experiment, conference and
//! journal links, data provenance and advisor links. Whenever a record is
//! written, the engine recomputes the edges that record implies, diffs
//! them against the stored state and commits the snapshot together with
//! the edge delta in one transaction.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: `BTreeMap`/`BTreeSet` only, no `HashMap`, no floats
//! - Behavior dispatch by closed enums and static rule tables, never by
//!   runtime type lookup
//! - Every lifecycle operation is exactly one storage transaction

// =============================================================================
// MODULES
// =============================================================================

pub mod citations;
pub mod diff;
pub mod engine;
pub mod extractor;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ControlNumber, DegreeType, EdgeAttrs, EdgeTarget, RecordId, RecordKind, RefgraphError,
    RelationEdge, RelationKind,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use citations::{citation_counts, citing_records, shares_identity, CitationCounts};
pub use diff::{diff, RelationDelta};
pub use engine::{AuthorChange, CommitSummary, RecordEngine, StorageBackend, WriteOptions};
pub use extractor::{ExtractionRule, ResolveRef, RuleRegistry};
pub use resolver::{RegistryStatus, Resolution};
pub use snapshot::{validate_document, RecordRef, RecordSnapshot};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use store::memory::MemoryStore;
pub use store::redb_store::RedbStore;
pub use store::{CommitBatch, EdgeWrite, RecordStore, RegistryOp, SnapshotWrite, StoreResolver};
