//! YAML-specific machinery: parsed-document cache, item identity and the
//! format-preserving span patcher.

pub mod cache;
pub mod span;

use serde_yaml::Value;

/// Render a YAML scalar as the opaque identifier string it compares as.
/// Identifiers are never normalized beyond this rendering, so a numeric id
/// `1603990` and the string `"1603990"` compare equal by design.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolve a record's identifier: the `id` field wins, `alias` is the
/// fallback for records created before Home Assistant assigned ids.
pub fn item_identifier(item: &Value) -> Option<String> {
    item.get("id")
        .and_then(scalar_to_string)
        .or_else(|| item.get("alias").and_then(scalar_to_string))
}

/// Does this record answer to `identifier` via either `id` or `alias`?
pub fn item_matches(item: &Value, identifier: &str) -> bool {
    let by_id = item
        .get("id")
        .and_then(scalar_to_string)
        .is_some_and(|v| v == identifier);
    let by_alias = item
        .get("alias")
        .and_then(scalar_to_string)
        .is_some_and(|v| v == identifier);
    by_id || by_alias
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_identifier_prefers_id() {
        let item: Value = serde_yaml::from_str("id: '1603'\nalias: Wake up\n").unwrap();
        assert_eq!(item_identifier(&item).as_deref(), Some("1603"));
    }

    #[test]
    fn test_item_identifier_falls_back_to_alias() {
        let item: Value = serde_yaml::from_str("alias: Wake up\ntrigger: []\n").unwrap();
        assert_eq!(item_identifier(&item).as_deref(), Some("Wake up"));
    }

    #[test]
    fn test_item_matches_numeric_id_as_string() {
        let item: Value = serde_yaml::from_str("id: 1603990\n").unwrap();
        assert!(item_matches(&item, "1603990"));
        assert!(!item_matches(&item, "1603"));
    }
}
