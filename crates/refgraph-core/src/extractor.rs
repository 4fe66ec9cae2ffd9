//! # Relation Extraction
//!
//! Turns a record snapshot into the set of relation edges it implies.
//! Extraction is a pure function of the snapshot and the identifier
//! registry: it walks a static table of field paths per record kind,
//! resolves each embedded reference, and drops everything that does not
//! resolve to a live record of an allowed kind.
//!
//! The rule table is built once at process start ([`RuleRegistry::standard`])
//! and handed to the engine by the caller; there is no global registry and
//! no runtime dispatch by record type.

use crate::resolver::Resolution;
use crate::snapshot::{RecordRef, RecordSnapshot};
use crate::{DegreeType, EdgeAttrs, EdgeTarget, RecordKind, RelationEdge, RelationKind};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// REFERENCE RESOLUTION SEAM
// =============================================================================

/// Resolution of embedded references against the identifier registry.
///
/// Implemented by the stores; extraction only ever asks this one question.
pub trait ResolveRef {
    /// Resolve an external reference to a record handle.
    fn resolve_ref(&self, reference: RecordRef) -> Resolution;
}

// =============================================================================
// EXTRACTION RULES
// =============================================================================

/// Where a rule reads its targets from.
#[derive(Debug, Clone, Copy)]
pub enum RuleSource {
    /// Items at `item_path` carry a `{"$ref": ...}` object under
    /// `ref_field`; targets must be one of the `allowed` kinds.
    Reference {
        item_path: &'static str,
        ref_field: &'static str,
        allowed: &'static [RecordKind],
        /// Sibling field holding the degree type (advisor links only).
        degree_field: Option<&'static str>,
    },
    /// Items at `item_path` carry a plain string under `value_field`;
    /// produces collaboration targets.
    PlainValue {
        item_path: &'static str,
        value_field: &'static str,
    },
}

/// Extra condition a snapshot must meet for a rule to apply.
#[derive(Debug, Clone, Copy)]
pub enum RuleGuard {
    None,
    /// At least one declared document type is in the list.
    DocumentTypeAny(&'static [&'static str]),
}

/// One row of the static extraction table.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRule {
    pub relation: RelationKind,
    pub source: RuleSource,
    pub guard: RuleGuard,
}

const LITERATURE_OR_DATA: &[RecordKind] = &[RecordKind::Literature, RecordKind::Data];
const AUTHORS_ONLY: &[RecordKind] = &[RecordKind::Authors];
const INSTITUTIONS_ONLY: &[RecordKind] = &[RecordKind::Institutions];
const EXPERIMENTS_ONLY: &[RecordKind] = &[RecordKind::Experiments];
const CONFERENCES_ONLY: &[RecordKind] = &[RecordKind::Conferences];
const JOURNALS_ONLY: &[RecordKind] = &[RecordKind::Journals];
const LITERATURE_ONLY: &[RecordKind] = &[RecordKind::Literature];

/// Document types under which a conference link counts as a contribution.
const CONFERENCE_DOCUMENT_TYPES: &[&str] = &["conference paper", "proceedings"];

const fn reference_rule(
    relation: RelationKind,
    item_path: &'static str,
    ref_field: &'static str,
    allowed: &'static [RecordKind],
) -> ExtractionRule {
    ExtractionRule {
        relation,
        source: RuleSource::Reference {
            item_path,
            ref_field,
            allowed,
            degree_field: None,
        },
        guard: RuleGuard::None,
    }
}

/// The extraction table for literature records.
const LITERATURE_RULES: &[ExtractionRule] = &[
    reference_rule(
        RelationKind::Cites,
        "references[]",
        "record",
        LITERATURE_OR_DATA,
    ),
    reference_rule(RelationKind::AuthoredBy, "authors[]", "record", AUTHORS_ONLY),
    ExtractionRule {
        relation: RelationKind::AuthoredBy,
        source: RuleSource::PlainValue {
            item_path: "collaborations[]",
            value_field: "value",
        },
        guard: RuleGuard::None,
    },
    reference_rule(
        RelationKind::AffiliatedWith,
        "authors[].affiliations[]",
        "record",
        INSTITUTIONS_ONLY,
    ),
    reference_rule(
        RelationKind::AffiliatedWith,
        "thesis_info.institutions[]",
        "record",
        INSTITUTIONS_ONLY,
    ),
    reference_rule(
        RelationKind::AffiliatedWith,
        "record_affiliations[]",
        "record",
        INSTITUTIONS_ONLY,
    ),
    reference_rule(
        RelationKind::ExperimentPaperOf,
        "accelerator_experiments[]",
        "record",
        EXPERIMENTS_ONLY,
    ),
    ExtractionRule {
        relation: RelationKind::ConferencePaperOf,
        source: RuleSource::Reference {
            item_path: "publication_info[]",
            ref_field: "conference_record",
            allowed: CONFERENCES_ONLY,
            degree_field: None,
        },
        guard: RuleGuard::DocumentTypeAny(CONFERENCE_DOCUMENT_TYPES),
    },
    ExtractionRule {
        relation: RelationKind::PublishedIn,
        source: RuleSource::Reference {
            item_path: "publication_info[]",
            ref_field: "journal_record",
            allowed: JOURNALS_ONLY,
            degree_field: None,
        },
        guard: RuleGuard::None,
    },
];

/// The extraction table for author records.
const AUTHOR_RULES: &[ExtractionRule] = &[ExtractionRule {
    relation: RelationKind::AdvisedBy,
    source: RuleSource::Reference {
        item_path: "advisors[]",
        ref_field: "record",
        allowed: AUTHORS_ONLY,
        degree_field: Some("degree_type"),
    },
    guard: RuleGuard::None,
}];

/// The extraction table for data records.
const DATA_RULES: &[ExtractionRule] = &[reference_rule(
    RelationKind::DataDerivedFrom,
    "literature[]",
    "record",
    LITERATURE_ONLY,
)];

// =============================================================================
// RULE REGISTRY
// =============================================================================

/// The static table mapping record kind to its extraction rules.
///
/// Built once at startup and injected into the engine. Kinds without an
/// entry (journals, jobs, ...) bear no outgoing relations.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<RecordKind, Vec<ExtractionRule>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleRegistry {
    /// The standard rule table.
    #[must_use]
    pub fn standard() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(RecordKind::Literature, LITERATURE_RULES.to_vec());
        rules.insert(RecordKind::Authors, AUTHOR_RULES.to_vec());
        rules.insert(RecordKind::Data, DATA_RULES.to_vec());
        Self { rules }
    }

    /// The rules applying to a record kind.
    #[must_use]
    pub fn rules_for(&self, kind: RecordKind) -> &[ExtractionRule] {
        self.rules.get(&kind).map_or(&[], Vec::as_slice)
    }

    /// Extract the relation edge set a snapshot implies.
    ///
    /// Returns the empty set unconditionally when the snapshot is
    /// tombstoned or its collections exclude it from the graph.
    /// Unresolved, deleted and wrong-kind targets are silently dropped;
    /// identical edges collapse through set semantics; a record never
    /// relates to itself.
    #[must_use]
    pub fn extract(
        &self,
        snapshot: &RecordSnapshot,
        resolver: &dyn ResolveRef,
    ) -> BTreeSet<RelationEdge> {
        let mut edges = BTreeSet::new();

        if snapshot.is_deleted() {
            return edges;
        }
        if !snapshot.in_collection(snapshot.kind().primary_collection()) {
            return edges;
        }

        for rule in self.rules_for(snapshot.kind()) {
            if !guard_passes(rule.guard, snapshot) {
                continue;
            }
            match rule.source {
                RuleSource::Reference {
                    item_path,
                    ref_field,
                    allowed,
                    degree_field,
                } => {
                    for item in snapshot.items_at(item_path) {
                        let Some(target) =
                            resolve_item(item, ref_field, allowed, snapshot, resolver)
                        else {
                            continue;
                        };
                        let attrs = match degree_field {
                            Some(field) => EdgeAttrs::advised(degree_type_of(item, field)),
                            None => EdgeAttrs::default(),
                        };
                        edges.insert(RelationEdge {
                            kind: rule.relation,
                            target: EdgeTarget::Record(target),
                            attrs,
                        });
                    }
                }
                RuleSource::PlainValue {
                    item_path,
                    value_field,
                } => {
                    for item in snapshot.items_at(item_path) {
                        if let Some(value) = item.get(value_field).and_then(Value::as_str) {
                            let value = value.trim();
                            if !value.is_empty() {
                                edges.insert(RelationEdge::collaboration(value));
                            }
                        }
                    }
                }
            }
        }

        edges
    }
}

/// Resolve one item's reference to a live target of an allowed kind.
fn resolve_item(
    item: &Value,
    ref_field: &str,
    allowed: &[RecordKind],
    snapshot: &RecordSnapshot,
    resolver: &dyn ResolveRef,
) -> Option<crate::RecordId> {
    let reference = RecordRef::parse(item.get(ref_field)?)?;
    if !allowed.contains(&reference.kind) {
        return None;
    }
    let target = resolver.resolve_ref(reference).live_record()?;
    // A record never relates to itself (self-citations in particular).
    if target == snapshot.id() {
        return None;
    }
    Some(target)
}

fn guard_passes(guard: RuleGuard, snapshot: &RecordSnapshot) -> bool {
    match guard {
        RuleGuard::None => true,
        RuleGuard::DocumentTypeAny(types) => {
            let declared = snapshot.document_types();
            types.iter().any(|t| declared.contains(*t))
        }
    }
}

fn degree_type_of(item: &Value, field: &str) -> DegreeType {
    item.get(field)
        .and_then(Value::as_str)
        .map_or(DegreeType::Other, DegreeType::from_value)
}

// =============================================================================
// TESTS
// =============================================================================
