use dataview_model::{Entity, EntityKey};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn city() -> Entity {
    Entity::new(
        "City",
        json!({
            "Name": "Redmond",
            "Population": 73_000,
            "Capital": false,
            "State": { "Name": "WA", "Code": 53 }
        }),
    )
}

#[test]
fn get_top_level_properties() {
    let e = city();
    assert_eq!(e.get_str("Name"), Some("Redmond"));
    assert_eq!(e.get_number("Population"), Some(73_000.0));
    assert_eq!(e.get_bool("Capital"), Some(false));
}

#[test]
fn get_nested_property() {
    let e = city();
    assert_eq!(e.get_str("State.Name"), Some("WA"));
    assert_eq!(e.get_number("State.Code"), Some(53.0));
}

#[test]
fn missing_property_reads_as_null() {
    let e = city();
    assert!(e.get("Mayor").is_none());
    assert_eq!(e.value("Mayor"), &Value::Null);
    assert_eq!(e.value("State.Missing"), &Value::Null);
}

#[test]
fn set_overwrites_existing_property() {
    let mut e = city();
    e.set("Name", json!("Bellevue"));
    assert_eq!(e.get_str("Name"), Some("Bellevue"));
}

#[test]
fn set_creates_intermediate_objects() {
    let mut e = Entity::new("City", json!({}));
    e.set("Location.Lat", json!(47.6));
    assert_eq!(e.data, json!({ "Location": { "Lat": 47.6 } }));
}

#[test]
fn set_replaces_scalar_parent() {
    let mut e = Entity::new("City", json!({ "Location": 5 }));
    e.set("Location.Lat", json!(1));
    assert_eq!(e.get_number("Location.Lat"), Some(1.0));
}

#[test]
fn with_key_keeps_key() {
    let key = EntityKey::new();
    let e = Entity::with_key(key, "City", json!({}));
    assert_eq!(e.key, key);
    assert_eq!(e.entity_type, "City");
}

#[test]
fn entity_serde_roundtrip() {
    let e = city();
    let json = serde_json::to_string(&e).unwrap();
    let back: Entity = serde_json::from_str(&json).unwrap();
    assert_eq!(back, e);
}
