//! # Property-Based Tests
//!
//! Determinism and correctness invariants of the diff engine, the
//! extractor and the engine write path.

#![allow(clippy::unwrap_used, clippy::panic)]

use proptest::collection::vec;
use proptest::prelude::*;
use refgraph_core::{
    diff, RecordEngine, RecordId, RecordKind, RelationEdge, RelationKind, WriteOptions,
};
use serde_json::{json, Value};
use std::collections::BTreeSet;

fn edge_set(targets: &[u64]) -> BTreeSet<RelationEdge> {
    targets
        .iter()
        .map(|&t| RelationEdge::to_record(RelationKind::Cites, RecordId(t)))
        .collect()
}

fn doc_with_references(cns: &[u64]) -> Value {
    let references: Vec<Value> = cns
        .iter()
        .map(|cn| json!({"record": {"$ref": format!("https://x/api/literature/{cn}")}}))
        .collect();
    json!({"references": references})
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Diffing a set against itself changes nothing.
    #[test]
    fn diff_is_reflexive(targets in vec(1u64..500, 0..40)) {
        let edges = edge_set(&targets);
        let delta = diff(&edges, &edges.clone());
        prop_assert!(delta.is_empty());
    }

    /// Applying the delta to the old set reproduces the new set exactly.
    #[test]
    fn applying_delta_reaches_new_set(
        old_targets in vec(1u64..500, 0..40),
        new_targets in vec(1u64..500, 0..40)
    ) {
        let old = edge_set(&old_targets);
        let new = edge_set(&new_targets);
        let delta = diff(&old, &new);

        let mut applied = old;
        for edge in &delta.to_remove {
            applied.remove(edge);
        }
        for edge in delta.to_add.clone() {
            applied.insert(edge);
        }
        prop_assert_eq!(applied, new);
    }

    /// An edge is never both added and removed.
    #[test]
    fn delta_halves_are_disjoint(
        old_targets in vec(1u64..500, 0..40),
        new_targets in vec(1u64..500, 0..40)
    ) {
        let delta = diff(&edge_set(&old_targets), &edge_set(&new_targets));
        prop_assert!(delta.to_add.intersection(&delta.to_remove).next().is_none());
    }

    /// The same corpus built twice produces identical edge tables.
    #[test]
    fn engine_writes_are_deterministic(reference_lists in vec(vec(1u64..20, 0..8), 1..12)) {
        let mut engine1 = RecordEngine::in_memory();
        let mut engine2 = RecordEngine::in_memory();
        let mut records = Vec::new();

        for (n, cns) in reference_lists.iter().enumerate() {
            let n = (n as u64).saturating_add(1);
            let mut doc = doc_with_references(cns);
            doc["control_number"] = json!(n);
            let r1 = engine1
                .create(RecordKind::Literature, doc.clone(), &WriteOptions::default())
                .unwrap();
            let r2 = engine2
                .create(RecordKind::Literature, doc, &WriteOptions::default())
                .unwrap();
            prop_assert_eq!(r1.record, r2.record);
            records.push(r1.record);
        }

        for id in records {
            prop_assert_eq!(
                engine1.outgoing_edges(id).unwrap(),
                engine2.outgoing_edges(id).unwrap()
            );
            prop_assert_eq!(
                engine1.citation_counts(id).unwrap(),
                engine2.citation_counts(id).unwrap()
            );
        }
    }

    /// Re-writing a record with the same document is a no-op for the
    /// relation tables.
    #[test]
    fn rewriting_same_document_changes_no_edges(cns in vec(1u64..10, 0..6)) {
        let mut engine = RecordEngine::in_memory();
        for n in 1..10u64 {
            engine
                .create(
                    RecordKind::Literature,
                    json!({"control_number": n}),
                    &WriteOptions::default(),
                )
                .unwrap();
        }
        let mut doc = doc_with_references(&cns);
        doc["control_number"] = json!(100);
        let created = engine
            .create(RecordKind::Literature, doc, &WriteOptions::default())
            .unwrap();

        let before = engine.outgoing_edges(created.record).unwrap();
        let data = engine.snapshot(created.record).unwrap().data().clone();
        let summary = engine
            .update(created.record, data, &WriteOptions::default())
            .unwrap();
        prop_assert_eq!(summary.edges_added, 0);
        prop_assert_eq!(summary.edges_removed, 0);
        prop_assert_eq!(engine.outgoing_edges(created.record).unwrap(), before);
    }

    /// Soft delete always empties the outgoing set, whatever it held.
    #[test]
    fn soft_delete_clears_outgoing(cns in vec(1u64..10, 0..6)) {
        let mut engine = RecordEngine::in_memory();
        for n in 1..10u64 {
            engine
                .create(
                    RecordKind::Literature,
                    json!({"control_number": n}),
                    &WriteOptions::default(),
                )
                .unwrap();
        }
        let mut doc = doc_with_references(&cns);
        doc["control_number"] = json!(100);
        let created = engine
            .create(RecordKind::Literature, doc, &WriteOptions::default())
            .unwrap();

        engine.delete(created.record).unwrap();
        prop_assert!(engine.outgoing_edges(created.record).unwrap().is_empty());
    }
}
