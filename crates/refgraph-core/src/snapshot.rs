//! # Record Snapshots
//!
//! A snapshot is the full JSON metadata document of a record at a point in
//! time, together with its internal handle, kind and version. The engine
//! never interprets the document beyond the accessors defined here: the
//! relation extractor walks declared field paths, and the citation
//! aggregator reads author/collaboration identity sets.
//!
//! References embedded in documents have the shape
//! `{"$ref": "<url>/{endpoint}/{control_number}"}`; only the two trailing
//! path segments are significant.

use crate::{ControlNumber, RecordId, RecordKind, RefgraphError};
use serde_json::Value;
use std::collections::BTreeSet;

// =============================================================================
// RECORD REFERENCES
// =============================================================================

/// An external pointer to a record, as embedded in documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordRef {
    pub kind: RecordKind,
    pub control_number: ControlNumber,
}

impl RecordRef {
    /// Parse a reference from a `{"$ref": url}` object.
    ///
    /// Returns `None` for anything malformed: callers treat unparseable
    /// references exactly like unresolved ones — no edge, no error.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        let url = value.get("$ref")?.as_str()?;
        Self::parse_url(url)
    }

    /// Parse a reference from its URL form.
    ///
    /// Only the two trailing path segments (`endpoint/control_number`)
    /// are inspected; the base URL is irrelevant.
    #[must_use]
    pub fn parse_url(url: &str) -> Option<Self> {
        let mut segments = url.trim_end_matches('/').rsplit('/');
        let number: u64 = segments.next()?.parse().ok()?;
        let kind = RecordKind::from_endpoint(segments.next()?)?;
        if number == 0 {
            return None;
        }
        Some(Self {
            kind,
            control_number: ControlNumber(number),
        })
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The metadata document of a record at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    id: RecordId,
    kind: RecordKind,
    version: u64,
    data: Value,
}

impl RecordSnapshot {
    /// Wrap a document. The document is assumed validated
    /// (see [`validate_document`]).
    #[must_use]
    pub const fn new(id: RecordId, kind: RecordKind, version: u64, data: Value) -> Self {
        Self {
            id,
            kind,
            version,
            data,
        }
    }

    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.kind
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The raw document.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// The external identifier declared in the document, if any.
    #[must_use]
    pub fn control_number(&self) -> Option<ControlNumber> {
        self.data
            .get("control_number")
            .and_then(Value::as_u64)
            .map(ControlNumber)
    }

    /// Whether the document is marked deleted (tombstoned).
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.data
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the record belongs to the named collection.
    ///
    /// A document without `_collections` belongs to its kind's primary
    /// collection.
    #[must_use]
    pub fn in_collection(&self, name: &str) -> bool {
        match self.data.get("_collections").and_then(Value::as_array) {
            Some(collections) => collections
                .iter()
                .filter_map(Value::as_str)
                .any(|c| c == name),
            None => self.kind.primary_collection() == name,
        }
    }

    /// Declared document types, lowercased.
    #[must_use]
    pub fn document_types(&self) -> BTreeSet<String> {
        self.data
            .get("document_type")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// References to records this document supersedes (redirect pointers).
    #[must_use]
    pub fn superseded_records(&self) -> Vec<RecordRef> {
        self.data
            .get("deleted_records")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(RecordRef::parse)
            .collect()
    }

    /// Normalized author identifiers declared on the document.
    ///
    /// Read from `authors[].ids[].value`; a stable identifier scheme, not a
    /// free-text name match. Normalization is trim + lowercase.
    #[must_use]
    pub fn author_identities(&self) -> BTreeSet<String> {
        self.items_at("authors[].ids[]")
            .into_iter()
            .filter_map(|id| id.get("value"))
            .filter_map(Value::as_str)
            .map(normalize_identity)
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Collaboration values declared on the document, normalized.
    #[must_use]
    pub fn collaboration_values(&self) -> BTreeSet<String> {
        self.items_at("collaborations[]")
            .into_iter()
            .filter_map(|c| c.get("value"))
            .filter_map(Value::as_str)
            .map(normalize_identity)
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Collect the values at a declarative field path.
    ///
    /// Path segments are separated by `.`; a segment ending in `[]`
    /// traverses the elements of an array field. Missing fields yield an
    /// empty result, never an error.
    ///
    /// `items_at("authors[].affiliations[]")` returns every affiliation
    /// object of every author.
    #[must_use]
    pub fn items_at(&self, path: &str) -> Vec<&Value> {
        let mut current = vec![&self.data];
        for segment in path.split('.') {
            let mut next = Vec::new();
            if let Some(field) = segment.strip_suffix("[]") {
                for value in current {
                    if let Some(items) = value.get(field).and_then(Value::as_array) {
                        next.extend(items.iter());
                    }
                }
            } else {
                for value in current {
                    if let Some(inner) = value.get(segment) {
                        next.push(inner);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

/// Normalize an identity value for set comparison.
fn normalize_identity(value: &str) -> String {
    value.trim().to_lowercase()
}

// =============================================================================
// DOCUMENT VALIDATION
// =============================================================================

/// Validate a document before any write.
///
/// Checks the shape of the fields the engine itself relies on; everything
/// else in the document is opaque payload. Runs before extraction, so a
/// failing document causes no partial write.
pub fn validate_document(kind: RecordKind, data: &Value) -> Result<(), RefgraphError> {
    let Some(object) = data.as_object() else {
        return Err(RefgraphError::Validation(
            "document must be a JSON object".to_string(),
        ));
    };

    if let Some(cn) = object.get("control_number") {
        match cn.as_u64() {
            Some(n) if n > 0 => {}
            _ => {
                return Err(RefgraphError::Validation(
                    "control_number must be a positive integer".to_string(),
                ));
            }
        }
    }

    if let Some(deleted) = object.get("deleted") {
        if !deleted.is_boolean() {
            return Err(RefgraphError::Validation(
                "deleted must be a boolean".to_string(),
            ));
        }
    }

    for (field, label) in [
        ("_collections", "_collections"),
        ("deleted_records", "deleted_records"),
        ("document_type", "document_type"),
    ] {
        if let Some(value) = object.get(field) {
            if !value.is_array() {
                return Err(RefgraphError::Validation(format!(
                    "{label} must be an array"
                )));
            }
        }
    }

    if kind == RecordKind::Literature {
        if let Some(refs) = object.get("references") {
            if !refs.is_array() {
                return Err(RefgraphError::Validation(
                    "references must be an array".to_string(),
                ));
            }
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
