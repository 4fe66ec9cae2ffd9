//! # Core Type Definitions
//!
//! This module contains all core types for the refgraph relation engine:
//! - Record identifiers (`RecordId`, `ControlNumber`)
//! - The closed set of record kinds (`RecordKind`)
//! - Typed relation edges (`RelationKind`, `EdgeTarget`, `EdgeAttrs`,
//!   `RelationEdge`)
//! - Error types (`RefgraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`
//! - Dispatch behavior by closed enum, never by runtime type lookup

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

/// Opaque internal handle for a record.
///
/// Assigned sequentially by the store on creation and never reused.
/// Independent of the external-facing control number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

/// External-facing sequential identifier for a record.
///
/// Control numbers are what references embedded in other records point at.
/// They are registered in the identifier registry under
/// `(RecordKind, ControlNumber)` and survive soft deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlNumber(pub u64);

// =============================================================================
// RECORD KIND
// =============================================================================

/// The closed set of record kinds.
///
/// Behavior dispatch (which extraction rules apply, which collection a
/// record belongs to by default) is keyed on this tag through static
/// tables, never through dynamic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Literature,
    Authors,
    Jobs,
    Journals,
    Experiments,
    Conferences,
    Data,
    Institutions,
    Seminars,
}

impl RecordKind {
    /// The URL path segment under which records of this kind are exposed.
    ///
    /// References embedded in record documents end in
    /// `/{endpoint}/{control_number}`.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Literature => "literature",
            Self::Authors => "authors",
            Self::Jobs => "jobs",
            Self::Journals => "journals",
            Self::Experiments => "experiments",
            Self::Conferences => "conferences",
            Self::Data => "data",
            Self::Institutions => "institutions",
            Self::Seminars => "seminars",
        }
    }

    /// Parse a kind from its endpoint segment.
    #[must_use]
    pub fn from_endpoint(segment: &str) -> Option<Self> {
        match segment {
            "literature" => Some(Self::Literature),
            "authors" => Some(Self::Authors),
            "jobs" => Some(Self::Jobs),
            "journals" => Some(Self::Journals),
            "experiments" => Some(Self::Experiments),
            "conferences" => Some(Self::Conferences),
            "data" => Some(Self::Data),
            "institutions" => Some(Self::Institutions),
            "seminars" => Some(Self::Seminars),
            _ => None,
        }
    }

    /// The primary collection tag for this kind.
    ///
    /// A document without an explicit `_collections` field is treated as
    /// belonging to its kind's primary collection.
    #[must_use]
    pub const fn primary_collection(self) -> &'static str {
        match self {
            Self::Literature => "Literature",
            Self::Authors => "Authors",
            Self::Jobs => "Jobs",
            Self::Journals => "Journals",
            Self::Experiments => "Experiments",
            Self::Conferences => "Conferences",
            Self::Data => "Data",
            Self::Institutions => "Institutions",
            Self::Seminars => "Seminars",
        }
    }
}

// =============================================================================
// RELATION KIND
// =============================================================================

/// The closed set of derived relation tables.
///
/// Each variant corresponds to one logical table keyed by the full edge
/// (source handle, target, attributes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Literature cites literature or data.
    Cites,
    /// Literature is authored by an author record or a collaboration.
    AuthoredBy,
    /// Literature is affiliated with an institution (author affiliations,
    /// thesis institutions and record affiliations all land here).
    AffiliatedWith,
    /// Literature is the output of an accelerator experiment.
    ExperimentPaperOf,
    /// Literature is a conference paper or proceedings of a conference.
    ConferencePaperOf,
    /// Literature appeared in a journal.
    PublishedIn,
    /// A data record is derived from literature.
    DataDerivedFrom,
    /// An author was supervised by another author.
    AdvisedBy,
}

impl RelationKind {
    /// Every relation table, in order.
    pub const ALL: [Self; 8] = [
        Self::Cites,
        Self::AuthoredBy,
        Self::AffiliatedWith,
        Self::ExperimentPaperOf,
        Self::ConferencePaperOf,
        Self::PublishedIn,
        Self::DataDerivedFrom,
        Self::AdvisedBy,
    ];
}

// =============================================================================
// EDGE TARGET & ATTRIBUTES
// =============================================================================

/// The target of a relation edge.
///
/// Most edges point at another record handle. Authored-by rows for
/// collaborations have no record behind them and carry the collaboration
/// value instead; the two sub-types of authorship are expressed by the
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeTarget {
    Record(RecordId),
    Collaboration(String),
}

impl EdgeTarget {
    /// The record handle behind this target, if any.
    #[must_use]
    pub const fn record(&self) -> Option<RecordId> {
        match self {
            Self::Record(id) => Some(*id),
            Self::Collaboration(_) => None,
        }
    }
}

/// Degree type attached to advisor links.
///
/// The same advisor may supervise one student under several degree types
/// simultaneously; the degree type is therefore part of the edge key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DegreeType {
    Bachelor,
    Diploma,
    Habilitation,
    Laurea,
    Master,
    Other,
    Phd,
}

impl DegreeType {
    /// Parse a degree type from its document value.
    ///
    /// Unknown or missing values map to `Other` rather than failing the
    /// whole write.
    #[must_use]
    pub fn from_value(value: &str) -> Self {
        match value {
            "bachelor" => Self::Bachelor,
            "diploma" => Self::Diploma,
            "habilitation" => Self::Habilitation,
            "laurea" => Self::Laurea,
            "master" => Self::Master,
            "phd" => Self::Phd,
            _ => Self::Other,
        }
    }

    /// The document value for this degree type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bachelor => "bachelor",
            Self::Diploma => "diploma",
            Self::Habilitation => "habilitation",
            Self::Laurea => "laurea",
            Self::Master => "master",
            Self::Other => "other",
            Self::Phd => "phd",
        }
    }
}

/// Kind-specific edge attributes.
///
/// Part of the compound key of an edge: two edges differing only in
/// attributes are distinct rows.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EdgeAttrs {
    /// Degree type, for `AdvisedBy` edges only.
    pub degree_type: Option<DegreeType>,
}

impl EdgeAttrs {
    /// Attributes for an advisor link.
    #[must_use]
    pub const fn advised(degree_type: DegreeType) -> Self {
        Self {
            degree_type: Some(degree_type),
        }
    }
}

// =============================================================================
// RELATION EDGE
// =============================================================================

/// A typed, directed relation from a source record.
///
/// The source handle is not part of the edge value: edges are stored and
/// diffed per source record, so the source is the key the set lives under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    pub kind: RelationKind,
    pub target: EdgeTarget,
    pub attrs: EdgeAttrs,
}

impl RelationEdge {
    /// An edge pointing at a record with no extra attributes.
    #[must_use]
    pub const fn to_record(kind: RelationKind, target: RecordId) -> Self {
        Self {
            kind,
            target: EdgeTarget::Record(target),
            attrs: EdgeAttrs { degree_type: None },
        }
    }

    /// An authored-by edge for a collaboration value.
    #[must_use]
    pub fn collaboration(value: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::AuthoredBy,
            target: EdgeTarget::Collaboration(value.into()),
            attrs: EdgeAttrs::default(),
        }
    }

    /// An advisor edge with its degree type.
    #[must_use]
    pub const fn advised_by(advisor: RecordId, degree_type: DegreeType) -> Self {
        Self {
            kind: RelationKind::AdvisedBy,
            target: EdgeTarget::Record(advisor),
            attrs: EdgeAttrs::advised(degree_type),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the refgraph engine.
///
/// - Unresolved references are never an error: they are treated as absent
///   edges, because upstream data routinely contains dangling pointers to
///   not-yet-harvested records.
/// - `ConcurrentModification` is the only retriable variant: the caller
///   must re-fetch the record and retry the whole update.
/// - Storage failures guarantee rollback; no partial edge set is ever
///   visible.
#[derive(Debug, Error)]
pub enum RefgraphError {
    /// The document fails schema constraints. No write occurred.
    #[error("validation failed: {0}")]
    Validation(String),

    /// `create` was called with an already-registered control number.
    #[error("duplicate identifier: {endpoint}/{control_number}")]
    DuplicateIdentifier {
        endpoint: &'static str,
        control_number: u64,
    },

    /// The requested record does not exist in the store.
    #[error("record not found: {0:?}")]
    RecordNotFound(RecordId),

    /// Optimistic version check failed; re-fetch and retry the update.
    #[error("concurrent modification of {record:?}: expected version {expected}, found {found}")]
    ConcurrentModification {
        record: RecordId,
        expected: u64,
        found: u64,
    },

    /// Transaction-level storage failure. The commit was rolled back.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// TESTS
// =============================================================================
