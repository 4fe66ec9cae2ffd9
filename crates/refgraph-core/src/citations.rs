//! # Citation Aggregation
//!
//! Citation counts are computed at read time from the stored citation
//! edges, never cached on the record row. A citer only counts while it is
//! alive: rows from deleted or superseded records are filtered out here
//! even if an edge survived (superseding a record also strips its outgoing
//! edges, so this is a second line of defense, not the primary one).
//!
//! Self-citations are detected by identity overlap, not name matching: two
//! records share an identity when their normalized author-identifier sets
//! or collaboration sets intersect.

use crate::snapshot::RecordSnapshot;
use crate::store::RecordStore;
use crate::{RecordId, RefgraphError, RelationKind};

// =============================================================================
// IDENTITY OVERLAP
// =============================================================================

/// Whether two records share an author identity or collaboration.
#[must_use]
pub fn shares_identity(a: &RecordSnapshot, b: &RecordSnapshot) -> bool {
    let authors_a = a.author_identities();
    if !authors_a.is_empty() {
        let authors_b = b.author_identities();
        if authors_a.intersection(&authors_b).next().is_some() {
            return true;
        }
    }
    let collabs_a = a.collaboration_values();
    if collabs_a.is_empty() {
        return false;
    }
    let collabs_b = b.collaboration_values();
    collabs_a.intersection(&collabs_b).next().is_some()
}

// =============================================================================
// CITATION COUNTS
// =============================================================================

/// Citation counts of one record, with and without self-citations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CitationCounts {
    pub total: u64,
    pub without_self: u64,
}

/// The live records currently citing a record, in handle order.
pub fn citing_records(
    store: &dyn RecordStore,
    record: RecordId,
) -> Result<Vec<RecordSnapshot>, RefgraphError> {
    let mut citers = Vec::new();
    for source in store.incoming_sources(record, RelationKind::Cites)? {
        let Some(snapshot) = store.get_snapshot(source)? else {
            continue;
        };
        if snapshot.is_deleted() {
            continue;
        }
        citers.push(snapshot);
    }
    Ok(citers)
}

/// Count the live citations of a record.
pub fn citation_counts(
    store: &dyn RecordStore,
    record: RecordId,
) -> Result<CitationCounts, RefgraphError> {
    let cited = store.get_snapshot(record)?;
    let mut counts = CitationCounts::default();
    for citer in citing_records(store, record)? {
        counts.total = counts.total.saturating_add(1);
        let is_self = cited
            .as_ref()
            .is_some_and(|cited| shares_identity(cited, &citer));
        if !is_self {
            counts.without_self = counts.without_self.saturating_add(1);
        }
    }
    Ok(counts)
}

// =============================================================================
// TESTS
// =============================================================================
