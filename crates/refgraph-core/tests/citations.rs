//! Citation counting scenarios: live-citer filtering, self-citation
//! detection and redirect behavior.

#![allow(clippy::unwrap_used, clippy::panic)]

use refgraph_core::{
    RecordEngine, RecordId, RecordKind, RelationEdge, RelationKind, Resolution, WriteOptions,
};
use serde_json::{json, Value};

fn lit_ref(cn: u64) -> Value {
    json!({"$ref": format!("https://inspirehep.net/api/literature/{cn}")})
}

fn create_lit(engine: &mut RecordEngine, data: Value) -> RecordId {
    engine
        .create(RecordKind::Literature, data, &WriteOptions::default())
        .unwrap()
        .record
}

fn author(bai: &str) -> Value {
    json!({"full_name": "Doe, John", "ids": [{"schema": "INSPIRE BAI", "value": bai}]})
}

#[test]
fn six_record_chain_counts_are_monotone() {
    let mut engine = RecordEngine::in_memory();
    let mut records = Vec::new();
    for n in 1..=6u64 {
        let references: Vec<Value> = (1..n).map(|m| json!({"record": lit_ref(m)})).collect();
        let id = create_lit(
            &mut engine,
            json!({"control_number": n, "references": references}),
        );
        records.push(id);
    }

    for (index, id) in records.iter().enumerate() {
        let expected_references = index as u64;
        let expected_citations = 5 - index as u64;
        let cites = engine
            .outgoing_edges(*id)
            .unwrap()
            .iter()
            .filter(|e| e.kind == RelationKind::Cites)
            .count() as u64;
        assert_eq!(cites, expected_references);
        assert_eq!(
            engine.citation_counts(*id).unwrap().total,
            expected_citations
        );
    }
}

#[test]
fn record_cannot_cite_itself() {
    let mut engine = RecordEngine::in_memory();
    let id = create_lit(
        &mut engine,
        json!({"control_number": 1, "references": [{"record": lit_ref(1)}]}),
    );
    assert!(engine.outgoing_edges(id).unwrap().is_empty());
    assert_eq!(engine.citation_counts(id).unwrap().total, 0);
}

#[test]
fn self_citation_excluded_from_filtered_count() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(
        &mut engine,
        json!({"control_number": 1, "authors": [author("J.Doe.1")]}),
    );
    create_lit(
        &mut engine,
        json!({"authors": [author("J.Doe.1")], "references": [{"record": lit_ref(1)}]}),
    );
    create_lit(
        &mut engine,
        json!({"authors": [author("A.Other.2")], "references": [{"record": lit_ref(1)}]}),
    );

    let counts = engine.citation_counts(cited).unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.without_self, 1);
}

#[test]
fn self_citation_classification_follows_updates() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(
        &mut engine,
        json!({"control_number": 1, "authors": [author("J.Doe.1")]}),
    );
    let citer = create_lit(
        &mut engine,
        json!({"authors": [author("A.Other.2")], "references": [{"record": lit_ref(1)}]}),
    );
    assert_eq!(engine.citation_counts(cited).unwrap().without_self, 1);

    // The citer gains the shared author; the count is recomputed at read
    // time, no write to the cited record needed.
    let mut data = engine.snapshot(citer).unwrap().data().clone();
    data["authors"] = json!([author("A.Other.2"), author("J.Doe.1")]);
    engine.update(citer, data, &WriteOptions::default()).unwrap();
    let counts = engine.citation_counts(cited).unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.without_self, 0);
}

#[test]
fn collaboration_overlap_is_a_self_citation() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(
        &mut engine,
        json!({"control_number": 1, "collaborations": [{"value": "ATLAS"}]}),
    );
    create_lit(
        &mut engine,
        json!({"collaborations": [{"value": "ATLAS"}], "references": [{"record": lit_ref(1)}]}),
    );

    let counts = engine.citation_counts(cited).unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.without_self, 0);
}

#[test]
fn superseded_citer_stops_counting() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(&mut engine, json!({"control_number": 1}));
    let old_citer = create_lit(
        &mut engine,
        json!({"control_number": 2, "references": [{"record": lit_ref(1)}]}),
    );
    assert_eq!(engine.citation_counts(cited).unwrap().total, 1);

    // A new record supersedes the citer without carrying its references.
    let successor = create_lit(
        &mut engine,
        json!({"control_number": 3, "deleted_records": [lit_ref(2)]}),
    );

    assert_eq!(engine.citation_counts(cited).unwrap().total, 0);
    assert!(engine.snapshot(old_citer).unwrap().is_deleted());
    assert!(engine.outgoing_edges(old_citer).unwrap().is_empty());
    assert_eq!(
        engine
            .resolve(RecordKind::Literature, refgraph_core::ControlNumber(2))
            .unwrap(),
        Resolution::Resolved(successor)
    );
}

#[test]
fn citing_a_redirected_identifier_links_the_successor() {
    let mut engine = RecordEngine::in_memory();
    create_lit(&mut engine, json!({"control_number": 1}));
    let successor = create_lit(
        &mut engine,
        json!({"control_number": 2, "deleted_records": [lit_ref(1)]}),
    );

    let citer = create_lit(
        &mut engine,
        json!({"references": [{"record": lit_ref(1)}]}),
    );
    assert_eq!(
        engine.outgoing_edges(citer).unwrap(),
        [RelationEdge::to_record(RelationKind::Cites, successor)]
            .into_iter()
            .collect()
    );
    assert_eq!(engine.citation_counts(successor).unwrap().total, 1);
}

#[test]
fn citation_made_before_a_redirect_stays_on_the_old_record() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(&mut engine, json!({"control_number": 1}));
    let citer = create_lit(
        &mut engine,
        json!({"control_number": 2, "references": [{"record": lit_ref(1)}]}),
    );
    assert_eq!(engine.citation_counts(cited).unwrap().total, 1);

    // The cited record is superseded after the citation was recorded.
    let successor = create_lit(
        &mut engine,
        json!({"control_number": 3, "deleted_records": [lit_ref(1)]}),
    );

    // The stored row is not rewritten: it still targets the tombstoned
    // record, and the successor inherits nothing.
    assert_eq!(
        engine.outgoing_edges(citer).unwrap(),
        [RelationEdge::to_record(RelationKind::Cites, cited)]
            .into_iter()
            .collect()
    );
    assert_eq!(engine.citation_counts(successor).unwrap().total, 0);
    assert_eq!(engine.citation_counts(cited).unwrap().total, 1);
}

#[test]
fn stale_redirect_to_purged_successor_yields_no_edge() {
    let mut engine = RecordEngine::in_memory();
    create_lit(&mut engine, json!({"control_number": 1}));
    let successor = create_lit(
        &mut engine,
        json!({"control_number": 2, "deleted_records": [lit_ref(1)]}),
    );

    // Purging the successor leaves the first identifier's redirect entry
    // pointing at a handle with no record behind it.
    engine.hard_delete(successor).unwrap();
    assert_eq!(
        engine
            .resolve(RecordKind::Literature, refgraph_core::ControlNumber(1))
            .unwrap(),
        Resolution::Resolved(successor)
    );

    // A new citation through that identifier must not materialize a row
    // onto the purged handle; the reference is treated as unresolved.
    let citer = create_lit(
        &mut engine,
        json!({"references": [{"record": lit_ref(1)}]}),
    );
    assert!(engine.outgoing_edges(citer).unwrap().is_empty());
}

#[test]
fn redirect_chains_are_not_followed_transitively() {
    let mut engine = RecordEngine::in_memory();
    create_lit(&mut engine, json!({"control_number": 1}));
    let second = create_lit(
        &mut engine,
        json!({"control_number": 2, "deleted_records": [lit_ref(1)]}),
    );
    let third = create_lit(
        &mut engine,
        json!({"control_number": 3, "deleted_records": [lit_ref(2)]}),
    );

    // The first identifier still points at the second record: one hop,
    // recorded at redirect time, even though that record has itself been
    // superseded since.
    assert_eq!(
        engine
            .resolve(RecordKind::Literature, refgraph_core::ControlNumber(1))
            .unwrap(),
        Resolution::Resolved(second)
    );
    assert!(engine.snapshot(second).unwrap().is_deleted());
    assert_eq!(
        engine
            .resolve(RecordKind::Literature, refgraph_core::ControlNumber(2))
            .unwrap(),
        Resolution::Resolved(third)
    );

    // A citation through the stale hop therefore lands on the tombstoned
    // record and never reaches the live end of the chain.
    let citer = create_lit(
        &mut engine,
        json!({"references": [{"record": lit_ref(1)}]}),
    );
    assert_eq!(
        engine.outgoing_edges(citer).unwrap(),
        [RelationEdge::to_record(RelationKind::Cites, second)]
            .into_iter()
            .collect()
    );
    assert_eq!(engine.citation_counts(third).unwrap().total, 0);
}

#[test]
fn soft_delete_of_citer_lowers_count_without_touching_rows() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(&mut engine, json!({"control_number": 1}));
    let citer = create_lit(
        &mut engine,
        json!({"references": [{"record": lit_ref(1)}]}),
    );

    engine.delete(citer).unwrap();
    assert_eq!(engine.citation_counts(cited).unwrap().total, 0);
    // The tombstoned citer keeps no rows; the cited record was never
    // rewritten.
    assert_eq!(engine.snapshot(cited).unwrap().version(), 1);
}

#[test]
fn hard_delete_removes_both_directions() {
    let mut engine = RecordEngine::in_memory();
    let cited = create_lit(&mut engine, json!({"control_number": 1}));
    let citer = create_lit(
        &mut engine,
        json!({"control_number": 2, "references": [{"record": lit_ref(1)}]}),
    );

    engine.hard_delete(citer).unwrap();
    assert_eq!(engine.citation_counts(cited).unwrap().total, 0);
    assert!(engine.affected_handles(cited).unwrap().is_empty());
    assert_eq!(
        engine
            .resolve(RecordKind::Literature, refgraph_core::ControlNumber(2))
            .unwrap(),
        Resolution::Unresolved
    );
}

#[test]
fn modified_references_previews_symmetric_difference() {
    let mut engine = RecordEngine::in_memory();
    let kept = create_lit(&mut engine, json!({"control_number": 1}));
    let dropped = create_lit(&mut engine, json!({"control_number": 2}));
    let added = create_lit(&mut engine, json!({"control_number": 3}));
    let citer = create_lit(
        &mut engine,
        json!({"references": [
            {"record": lit_ref(1)},
            {"record": lit_ref(2)}
        ]}),
    );

    let candidate = json!({"control_number": 4, "references": [
        {"record": lit_ref(1)},
        {"record": lit_ref(3)}
    ]});
    let modified = engine.modified_references(citer, &candidate).unwrap();
    assert!(!modified.contains(&kept));
    assert_eq!(modified, [dropped, added].into_iter().collect());

    // Preview only: the stored state is untouched.
    assert_eq!(engine.citation_counts(dropped).unwrap().total, 1);
}
