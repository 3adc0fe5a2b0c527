use super::*;

#[test]
fn encode_segment_passes_through_safe_chars() {
    assert_eq!(url_encode_segment("GLOBAL"), "GLOBAL");
    assert_eq!(url_encode_segment("node-1_a.b~c"), "node-1_a.b~c");
}

#[test]
fn encode_segment_escapes_space_and_unicode() {
    assert_eq!(url_encode_segment("HK 01"), "HK%2001");
    assert_eq!(url_encode_segment("日本"), "%E6%97%A5%E6%9C%AC");
}

#[test]
fn proxy_entry_deserializes_kind_and_members() {
    let json = r#"{"type":"Selector","all":["A","B"]}"#;
    let entry: ProxyEntry = serde_json::from_str(json).unwrap();
    assert_eq!(entry.kind, "Selector");
    assert_eq!(entry.all, vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn proxy_entry_defaults_members_when_absent() {
    let json = r#"{"type":"Direct"}"#;
    let entry: ProxyEntry = serde_json::from_str(json).unwrap();
    assert!(entry.all.is_empty());
}
