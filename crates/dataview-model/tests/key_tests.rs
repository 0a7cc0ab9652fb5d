use dataview_model::EntityKey;
use std::collections::HashSet;
use std::str::FromStr;

#[test]
fn key_new_is_unique() {
    assert_ne!(EntityKey::new(), EntityKey::new());
}

#[test]
fn key_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    assert_eq!(EntityKey::from_uuid(uuid).as_uuid(), uuid);
}

#[test]
fn key_display_and_parse() {
    let key = EntityKey::new();
    let parsed = EntityKey::parse(&key.to_string()).unwrap();
    assert_eq!(key, parsed);
    assert_eq!(EntityKey::from_str(&key.to_string()).unwrap(), key);
}

#[test]
fn key_parse_invalid() {
    assert!(EntityKey::parse("not-a-uuid").is_err());
}

#[test]
fn key_hash_and_eq() {
    let key = EntityKey::new();
    let mut set = HashSet::new();
    set.insert(key);
    set.insert(key);
    assert_eq!(set.len(), 1);
}

#[test]
fn key_serde_is_transparent() {
    let key = EntityKey::new();
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, format!("\"{key}\""));
}
