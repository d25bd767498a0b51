//! Saved queries across engines, and data changes under a live cache.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use myco_query::{
    params, EngineConfig, Id, JsonFileRecords, MemoryStore, ParamValue, QueryEngine, QueryError, QueryRecordStore,
    RecordType,
};
use serde_json::json;

fn data() -> Arc<MemoryStore> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mushrooms.yaml");
    Arc::new(MemoryStore::load(path).unwrap())
}

// ============================================================================
// Saved queries
// ============================================================================

#[test]
fn resume_in_a_fresh_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.json");

    let saved = {
        let records = Arc::new(JsonFileRecords::open(&path).unwrap());
        let engine = QueryEngine::in_memory(data(), EngineConfig::default()).with_records(records);
        let context = engine.context().with_user(2);
        let query = engine
            .lookup_and_save(RecordType::Observation, &params! { "needs_naming" => true }, &context)
            .unwrap();
        assert_eq!(query.result_ids().unwrap(), &[3]);
        query.fingerprint().clone()
    };
    assert!(path.exists());

    let records = Arc::new(JsonFileRecords::open(&path).unwrap());
    let engine = QueryEngine::in_memory(data(), EngineConfig::default()).with_records(records);
    let resumed = engine.resume(&saved).unwrap();
    assert_eq!(resumed.fingerprint(), &saved);
    assert_eq!(resumed.result_ids().unwrap(), &[3]);
    assert_eq!(resumed.spec().context.get("current_user"), Some(&ParamValue::Int(2)));
}

#[test]
fn unknown_fingerprint_in_an_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.json");
    std::fs::write(&path, "").unwrap();

    let records = Arc::new(JsonFileRecords::open(&path).unwrap());
    let engine = QueryEngine::in_memory(data(), EngineConfig::default()).with_records(records);
    let other = QueryEngine::in_memory(data(), EngineConfig::default());
    let query = other.lookup(RecordType::User, &params! {}, &other.context()).unwrap();

    assert!(matches!(
        engine.resume(query.fingerprint()),
        Err(QueryError::UnknownFingerprint(_))
    ));
}

#[test]
fn prune_rewrites_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("queries.json");

    let records = Arc::new(JsonFileRecords::open(&path).unwrap());
    let engine = QueryEngine::in_memory(data(), EngineConfig::default()).with_records(records.clone());
    let query = engine
        .lookup_and_save(RecordType::Name, &params! { "rank" => "Genus" }, &engine.context())
        .unwrap();

    assert_eq!(records.prune(chrono::Duration::days(1)).unwrap(), 0);
    assert_eq!(records.prune(chrono::Duration::zero() - chrono::Duration::seconds(1)).unwrap(), 1);

    let reopened = JsonFileRecords::open(&path).unwrap();
    assert_eq!(reopened.load(query.fingerprint()).unwrap(), None);
}

#[test]
fn corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(JsonFileRecords::open(&path).is_err());
}

// ============================================================================
// Data changes
// ============================================================================

#[test]
fn invalidate_after_insert() {
    let data = data();
    let engine = QueryEngine::in_memory(data.clone(), EngineConfig::default());
    let params = params! { "has_comments" => true };

    let before = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert_eq!(before.result_ids().unwrap(), &[1]);

    data.insert(
        RecordType::Comment,
        &json!({"id": 3, "user_id": 2, "target_type": "Observation", "target_id": 2, "summary": "nice"}),
    )
    .unwrap();

    let stale = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert!(Arc::ptr_eq(&before, &stale));

    assert_eq!(engine.invalidate(RecordType::Comment), 1);
    let fresh = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert_eq!(fresh.result_ids().unwrap(), &[1, 2]);
}

#[test]
fn new_synonym_invalidates_name_lookups() {
    let data = data();
    data.insert(
        RecordType::Observation,
        &json!({"id": 9, "user_id": 1, "when": "2018-07-01", "name_id": 50}),
    )
    .unwrap();
    let engine = QueryEngine::in_memory(data.clone(), EngineConfig::default());
    let params = params! {
        "names" => params! { "lookup" => vec!["Amanita muscaria"], "include_synonyms" => true },
    };

    let before = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert_eq!(before.result_ids().unwrap(), &[6, 1]);

    data.insert(
        RecordType::Name,
        &json!({"id": 50, "text_name": "Amanita muscarius", "search_name": "Amanita muscarius",
                "sort_name": "Amanita muscarius", "rank": "Species", "synonym_id": 40}),
    )
    .unwrap();

    assert_eq!(engine.invalidate(RecordType::Name), 1);
    let fresh = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert!(!Arc::ptr_eq(&before, &fresh));
    let ids: BTreeSet<Id> = fresh.result_ids().unwrap().iter().copied().collect();
    assert_eq!(ids, BTreeSet::from([1, 6, 9]));
}

#[test]
fn renamed_login_invalidates_user_lookups() {
    let data = data();
    let engine = QueryEngine::in_memory(data.clone(), EngineConfig::default());
    let params = params! { "by_users" => vec!["richard"] };

    let before = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    assert!(before.result_ids().unwrap().is_empty());

    data.insert(
        RecordType::User,
        &json!({"id": 3, "login": "richard", "name": "Tricky Dick", "contribution": 5}),
    )
    .unwrap();

    assert_eq!(engine.invalidate(RecordType::User), 1);
    let fresh = engine.lookup(RecordType::Observation, &params, &engine.context()).unwrap();
    let ids: BTreeSet<Id> = fresh.result_ids().unwrap().iter().copied().collect();
    assert_eq!(ids, BTreeSet::from([4, 6]));
}

#[test]
fn long_id_sets_are_rejected() {
    let config = EngineConfig {
        max_id_set: 2,
        ..EngineConfig::default()
    };
    let engine = QueryEngine::in_memory(data(), config);
    let err = engine
        .lookup(RecordType::Observation, &params! { "id_in_set" => vec![5, 4, 3, 2] }, &engine.context())
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidShape { ref filter, .. } if filter == "id_in_set"));

    let query = engine
        .lookup(RecordType::Observation, &params! { "id_in_set" => vec![5, 4] }, &engine.context())
        .unwrap();
    assert_eq!(query.result_ids().unwrap(), &[5, 4]);
}
