use propvault_core::db::{open_db, open_db_in_memory};
use propvault_core::{
    ConfigError, DomainSpecificValue, KeyValues, PersistenceError, PropertyKey, RepoError,
    SqlitePersistenceService, SqliteValueRepository, StoreConfig, ValueRepository,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KEY: &str = "key";
const CHANGE_SET: &str = "changeSet";
const DESCRIPTION: &str = "description";
const PARTS: [&str; 2] = ["domainKeyPart1", "domainKeyPart2"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Rate {
    percent: u32,
    label: String,
}

fn rate(percent: u32) -> Rate {
    Rate {
        percent,
        label: format!("{percent}%"),
    }
}

fn service(conn: &Connection) -> SqlitePersistenceService<'_> {
    SqlitePersistenceService::try_new(conn, &StoreConfig::default()).unwrap()
}

fn value_rows(conn: &Connection) -> Vec<(String, String, Option<String>)> {
    let mut stmt = conn
        .prepare(
            "SELECT key_id, pattern, change_set
             FROM property_values
             ORDER BY key_id ASC, pattern ASC, change_set ASC;",
        )
        .unwrap();
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

fn key_exists(conn: &Connection, id: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM property_keys WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}

#[test]
fn stored_value_loads_back_with_description() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.set_description(Some(DESCRIPTION.to_string()));
    key_values
        .put_with_change_set(Some(CHANGE_SET), rate(20), &PARTS)
        .unwrap();

    service.store(KEY, &key_values, Some(CHANGE_SET)).unwrap();

    assert_eq!(
        value_rows(&conn),
        vec![(
            KEY.to_string(),
            "domainKeyPart1|domainKeyPart2".to_string(),
            Some(CHANGE_SET.to_string())
        )]
    );
    let loaded = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.description(), Some(DESCRIPTION));
    assert_eq!(loaded.get(Some(CHANGE_SET), &PARTS), Some(&rate(20)));
    assert_eq!(loaded.get(None, &PARTS), None);
    assert_eq!(loaded, key_values);
}

#[test]
fn load_of_unknown_key_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let loaded = service(&conn)
        .load::<Rate, _>("unknown", &KeyValues::default)
        .unwrap();
    assert!(loaded.is_none());
}

#[test]
fn key_without_values_is_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO property_keys (id, description) VALUES (?1, NULL);",
        [KEY],
    )
    .unwrap();
    let service = service(&conn);

    let err = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidState(_)));

    let err = service.load_all::<Rate, _>(&KeyValues::default).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidState(_)));
}

#[test]
fn store_persists_only_the_requested_change_set() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.put(rate(19), &["DE"]).unwrap();
    key_values
        .put_with_change_set(Some(CHANGE_SET), rate(21), &["DE"])
        .unwrap();

    service.store(KEY, &key_values, None).unwrap();
    let loaded = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get(None, &["DE"]), Some(&rate(19)));

    service.store(KEY, &key_values, Some(CHANGE_SET)).unwrap();
    let loaded = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get(Some(CHANGE_SET), &["DE"]), Some(&rate(21)));
}

#[test]
fn failed_store_rolls_back_every_row() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut first = KeyValues::new();
    first.put(rate(1), &["DE"]).unwrap();
    service.store(KEY, &first, None).unwrap();

    let mut second = KeyValues::new();
    second.put(rate(2), &["DE"]).unwrap();
    second.put(rate(3), &["FR"]).unwrap();
    let err = service.store(KEY, &second, None).unwrap_err();
    assert!(matches!(err, PersistenceError::Repo(_)));

    let loaded = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    assert_eq!(loaded, first);
}

#[test]
fn unserializable_payload_creates_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut payload = BTreeMap::new();
    payload.insert((1_u8, 2_u8), 3_u8);
    let mut key_values = KeyValues::new();
    key_values.put(payload, &["DE"]).unwrap();

    let err = service.store(KEY, &key_values, None).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidInput(_)));
    assert!(!key_exists(&conn, KEY));
}

#[test]
fn non_finite_payload_never_poisons_load_all() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut healthy = KeyValues::new();
    healthy.put(0.19_f64, &["DE"]).unwrap();
    service.store("other", &healthy, None).unwrap();

    let mut broken = KeyValues::new();
    broken.put(f64::NAN, &["DE"]).unwrap();
    let err = service.store("rate", &broken, None).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidInput(_)));
    assert!(!key_exists(&conn, "rate"));

    let loaded = service.load_all::<f64, _>(&KeyValues::default).unwrap();
    assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["other"]);
    assert_eq!(loaded["other"].get(None, &["DE"]), Some(&0.19));
}

#[test]
fn removing_single_value_keeps_key_until_last_value() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values
        .put_with_change_set(Some(CHANGE_SET), rate(1), &PARTS)
        .unwrap();
    key_values
        .put_with_change_set(Some(CHANGE_SET), rate(2), &["other"])
        .unwrap();
    service.store(KEY, &key_values, Some(CHANGE_SET)).unwrap();

    let first = DomainSpecificValue::new("domainKeyPart1|domainKeyPart2", None, Some(rate(1)));
    service.remove_single(KEY, &first, Some(CHANGE_SET)).unwrap();
    assert!(key_exists(&conn, KEY));
    assert_eq!(value_rows(&conn).len(), 1);

    let second = DomainSpecificValue::new("other", None, Some(rate(2)));
    service.remove_single(KEY, &second, Some(CHANGE_SET)).unwrap();
    assert!(!key_exists(&conn, KEY));
    assert!(value_rows(&conn).is_empty());
    assert!(service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .is_none());
}

#[test]
fn remove_single_of_missing_row_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.put(rate(1), &["DE"]).unwrap();
    service.store(KEY, &key_values, None).unwrap();

    let value = DomainSpecificValue::new("DE", None, Some(rate(1)));
    service.remove_single(KEY, &value, Some(CHANGE_SET)).unwrap();
    service.remove_single("unknown", &value, None).unwrap();

    assert!(key_exists(&conn, KEY));
    assert_eq!(value_rows(&conn).len(), 1);
}

#[test]
fn remove_matching_deletes_exactly_the_matching_rows() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.put(rate(19), &["DE"]).unwrap();
    key_values.put(rate(20), &["AT"]).unwrap();
    service.store(KEY, &key_values, None).unwrap();
    let mut change_set_values = KeyValues::new();
    change_set_values
        .put_with_change_set(Some(CHANGE_SET), rate(21), &["DE"])
        .unwrap();
    service
        .store(KEY, &change_set_values, Some(CHANGE_SET))
        .unwrap();

    let mut to_remove = KeyValues::new();
    to_remove.put(rate(0), &["DE"]).unwrap();
    service.remove_matching(KEY, &to_remove, None).unwrap();
    assert_eq!(
        value_rows(&conn),
        vec![
            (KEY.to_string(), "AT".to_string(), None),
            (KEY.to_string(), "DE".to_string(), Some(CHANGE_SET.to_string())),
        ]
    );

    let mut rest = KeyValues::new();
    rest.put(rate(0), &["AT"]).unwrap();
    rest.put_with_change_set(Some(CHANGE_SET), rate(0), &["DE"])
        .unwrap();
    service.remove_matching(KEY, &rest, None).unwrap();
    assert!(value_rows(&conn).is_empty());
    assert!(!key_exists(&conn, KEY));
}

#[test]
fn remove_matching_without_values_is_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.put(rate(1), &["DE"]).unwrap();
    service.store(KEY, &key_values, None).unwrap();

    let err = service
        .remove_matching(KEY, &KeyValues::<Rate>::new(), None)
        .unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidState(_)));
    assert_eq!(value_rows(&conn).len(), 1);
}

#[test]
fn reload_drops_vanished_keys_and_refreshes_the_rest() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    for (id, percent) in [("a", 1), ("b", 2)] {
        let mut key_values = KeyValues::new();
        key_values.put(rate(percent), &["DE"]).unwrap();
        service.store(id, &key_values, None).unwrap();
    }
    let loaded = service.load_all::<Rate, _>(&KeyValues::default).unwrap();
    assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["a", "b"]);

    let value = DomainSpecificValue::new("DE", None, Some(rate(2)));
    service.remove_single("b", &value, None).unwrap();
    let mut extra = KeyValues::new();
    extra
        .put_with_change_set(Some(CHANGE_SET), rate(5), &["FR"])
        .unwrap();
    service.store("a", &extra, Some(CHANGE_SET)).unwrap();

    let reloaded = service.reload(&loaded, &KeyValues::default).unwrap();
    assert_eq!(reloaded.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(reloaded["a"].len(), 2);
    assert_eq!(reloaded["a"].get(Some(CHANGE_SET), &["FR"]), Some(&rate(5)));
}

#[test]
fn list_keys_returns_ascending_ids() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    for id in ["gamma", "alpha", "beta"] {
        let mut key_values = KeyValues::new();
        key_values.put(rate(1), &["DE"]).unwrap();
        service.store(id, &key_values, None).unwrap();
    }

    assert_eq!(service.list_keys().unwrap(), vec!["alpha", "beta", "gamma"]);
}

#[test]
fn custom_delimiter_round_trips_parts() {
    let conn = open_db_in_memory().unwrap();
    let config = StoreConfig::from_json_str(r#"{"pattern_delimiter": ";"}"#).unwrap();
    let service = SqlitePersistenceService::try_new(&conn, &config).unwrap();
    let factory = service.key_values_factory::<Rate>();
    let mut key_values = factory();
    key_values.put(rate(7), &["a|b", "c"]).unwrap();

    service.store(KEY, &key_values, None).unwrap();

    assert_eq!(
        value_rows(&conn),
        vec![(KEY.to_string(), "a|b;c".to_string(), None)]
    );
    let loaded = service.load(KEY, &factory).unwrap().unwrap();
    assert_eq!(loaded.get(None, &["a|b", "c"]), Some(&rate(7)));
}

#[test]
fn service_rejects_config_built_in_code() {
    let conn = open_db_in_memory().unwrap();
    let config = StoreConfig {
        pattern_delimiter: 'a',
        ..StoreConfig::default()
    };

    match SqlitePersistenceService::try_new(&conn, &config) {
        Err(PersistenceError::InvalidConfig(ConfigError::InvalidDelimiter('a'))) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("alphanumeric delimiter must be rejected"),
    }
}

#[test]
fn duplicate_slot_rows_are_invalid_state() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "DROP INDEX uq_property_values_slot_no_change_set;
         INSERT INTO property_keys (id, description) VALUES ('k', NULL);
         INSERT INTO property_values (key_id, pattern, change_set, payload)
         VALUES ('k', 'DE', NULL, '1');
         INSERT INTO property_values (key_id, pattern, change_set, payload)
         VALUES ('k', 'DE', NULL, '2');",
    )
    .unwrap();

    let key = PropertyKey::new("k", None);
    let values = SqliteValueRepository::try_new(&conn).unwrap();
    let err = values.find_one(&key, "DE", None).unwrap_err();
    assert!(matches!(err, RepoError::InvalidState(_)));

    let value = DomainSpecificValue::new("DE", None, Some(rate(1)));
    let err = service(&conn).remove_single("k", &value, None).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidState(_)));
    assert_eq!(value_rows(&conn).len(), 2);
    assert!(key_exists(&conn, "k"));
}

#[test]
fn single_empty_part_reads_back_under_both_spellings() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut key_values = KeyValues::new();
    key_values.put(rate(10), &[""]).unwrap();
    service.store(KEY, &key_values, None).unwrap();

    let loaded = service
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    let none: [&str; 0] = [];
    assert_eq!(loaded.get(None, &[""]), Some(&rate(10)));
    assert_eq!(loaded.get(None, &none), Some(&rate(10)));
    assert_eq!(loaded, key_values);
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("properties.db");
    {
        let conn = open_db(&path).unwrap();
        let mut key_values = KeyValues::new();
        key_values.set_description(Some(DESCRIPTION.to_string()));
        key_values.put(rate(16), &["DE"]).unwrap();
        service(&conn).store(KEY, &key_values, None).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let loaded = service(&conn)
        .load::<Rate, _>(KEY, &KeyValues::default)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.description(), Some(DESCRIPTION));
    assert_eq!(loaded.get(None, &["DE"]), Some(&rate(16)));
}
