use assessbank_core::db::{begin_batch, open_db_in_memory};
use assessbank_core::model::assignment::AssignmentDraft;
use assessbank_core::{
    Assessment, AssessmentKey, AssessmentStore, AssignmentRef, AssignmentType, Section,
    SqliteAssessmentStore, StoreError,
};
use rusqlite::Connection;

fn draft(path: &str) -> AssignmentDraft {
    AssignmentDraft {
        base_file_path: path.to_string(),
        assignment_type: AssignmentType::Open,
        available_points: 3,
        available_seconds: Some(60),
    }
}

fn generation(tag: &str, hash: &str, title: &str, ids: &[i64]) -> Assessment {
    let mut section = Section::new(title);
    section
        .assignments
        .extend(ids.iter().map(|id| AssignmentRef::Stored(*id)));
    let mut assessment = Assessment::new_latest(AssessmentKey::new(tag, hash));
    assessment.sections.push(section);
    assessment
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteAssessmentStore::try_new(&conn).err().unwrap();
    assert!(matches!(
        err,
        StoreError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

#[test]
fn persisted_generation_loads_with_ordered_sections_and_items() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();

    let first = store.persist_assignment(&draft("Loops/a.md")).unwrap();
    let second = store.persist_assignment(&draft("Loops/b.md")).unwrap();
    let third = store.persist_assignment(&draft("Traits/c.md")).unwrap();

    let mut assessment = generation("rust", "c1", "Loops", &[second, first]);
    let mut traits = Section::new("Traits");
    traits.assignments.push(AssignmentRef::Stored(third));
    assessment.sections.push(traits);
    store.persist_assessment(&assessment).unwrap();
    store.flush().unwrap();

    let loaded = store.latest_assessment("rust").unwrap().unwrap();
    assert_eq!(loaded, assessment);
    assert_eq!(store.latest_assessments().unwrap().len(), 1);
    assert_eq!(store.latest_assessment("sql").unwrap(), None);

    let assignments = store.assignments_by_ids(&[third, first, 999]).unwrap();
    let ids: Vec<_> = assignments.iter().map(|assignment| assignment.id).collect();
    assert_eq!(ids, vec![first, third]);
    assert_eq!(assignments[0].base_file_path, "Loops/a.md");
    assert_eq!(assignments[0].available_seconds, Some(60));
}

#[test]
fn reference_queries_distinguish_latest_from_history() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();
    let id = store.persist_assignment(&draft("Loops/a.md")).unwrap();
    let other = store.persist_assignment(&draft("Loops/b.md")).unwrap();

    store
        .persist_assessment(&generation("rust", "c1", "Loops", &[id]))
        .unwrap();
    store
        .retire_assessment(&AssessmentKey::new("rust", "c1"))
        .unwrap();
    store
        .persist_assessment(&generation("rust", "c2", "Loops", &[other]))
        .unwrap();
    store
        .persist_assessment(&generation("sql", "c2", "Joins", &[id]))
        .unwrap();
    store.flush().unwrap();

    let all_generations = store.assessments_referencing(id).unwrap();
    let keys: Vec<_> = all_generations.iter().map(|a| a.key.to_string()).collect();
    assert_eq!(keys, vec!["rust@c1", "sql@c2"]);
    assert_eq!(all_generations[0].latest, Some(false));

    let latest = store.latest_assessments_referencing(&[id]).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].tag(), "sql");

    assert_eq!(store.tags_of_latest_referencing(id).unwrap(), vec!["sql"]);
    assert_eq!(store.tags_of_latest_referencing(other).unwrap(), vec!["rust"]);
    assert!(store.latest_assessments_referencing(&[]).unwrap().is_empty());
}

#[test]
fn second_latest_generation_for_a_tag_is_a_conflict() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();

    store
        .persist_assessment(&generation("rust", "c1", "Loops", &[]))
        .unwrap();
    let err = store
        .persist_assessment(&generation("rust", "c2", "Loops", &[]))
        .unwrap_err();
    assert!(matches!(err, StoreError::GenerationConflict(key) if key.git_commit_hash == "c2"));
}

#[test]
fn pending_references_never_reach_the_table() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();

    let mut assessment = generation("rust", "c1", "Loops", &[]);
    assessment.sections[0]
        .assignments
        .push(AssignmentRef::Pending(
            assessbank_core::model::assignment::PendingAssignmentId(0),
        ));
    let err = store.persist_assessment(&assessment).unwrap_err();
    assert!(matches!(err, StoreError::UnresolvedAssignmentRef(_)));
}

#[test]
fn retire_unknown_generation_fails() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();
    let err = store
        .retire_assessment(&AssessmentKey::new("rust", "nope"))
        .unwrap_err();
    assert!(matches!(err, StoreError::AssessmentNotFound(_)));
}

#[test]
fn rewrite_commit_hash_only_touches_matching_generations() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();

    store
        .persist_assessment(&generation("rust", "old", "Loops", &[]))
        .unwrap();
    store
        .persist_assessment(&generation("sql", "old", "Joins", &[]))
        .unwrap();
    store
        .persist_assessment(&generation("go", "keep", "Channels", &[]))
        .unwrap();

    assert_eq!(store.rewrite_commit_hash("old", "new").unwrap(), 2);
    let hashes: Vec<_> = store
        .all_assessments()
        .unwrap()
        .into_iter()
        .map(|assessment| assessment.key.to_string())
        .collect();
    assert_eq!(hashes, vec!["rust@new", "sql@new", "go@keep"]);
    assert_eq!(store.rewrite_commit_hash("missing", "x").unwrap(), 0);
}

#[test]
fn clear_all_removes_every_row() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteAssessmentStore::try_new(&conn).unwrap();
    let id = store.persist_assignment(&draft("Loops/a.md")).unwrap();
    store
        .persist_assessment(&generation("rust", "c1", "Loops", &[id]))
        .unwrap();

    store.clear_all().unwrap();
    assert!(store.all_assessments().unwrap().is_empty());
    assert!(store.all_assignments().unwrap().is_empty());
}

#[test]
fn dropped_batch_transaction_rolls_back_writes() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let tx = begin_batch(&mut conn).unwrap();
        let store = SqliteAssessmentStore::try_new(&tx).unwrap();
        store.persist_assignment(&draft("Loops/a.md")).unwrap();
    }

    let store = SqliteAssessmentStore::try_new(&conn).unwrap();
    assert!(store.all_assignments().unwrap().is_empty());
}
