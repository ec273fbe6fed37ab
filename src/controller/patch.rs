//! # Merge Patches
//!
//! JSON merge patch (RFC 7386) helpers. The sync entry point writes only the
//! delta between the loaded and the recomputed status, so unchanged fields are
//! never sent and an unchanged status produces no write at all.

use serde_json::{Map, Value};

/// Merge patch turning `old` into `new`, or `None` when they are equal.
///
/// Objects are diffed key by key; removed keys become `null`. Any other value
/// (arrays included) is replaced wholesale.
pub fn merge_patch_diff(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) => {
                        if let Some(child) = merge_patch_diff(old_value, new_value) {
                            patch.insert(key.clone(), child);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(new.clone()),
    }
}

/// Apply a merge patch in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Wrap a status delta so it can be sent to the status subresource
pub fn status_patch(old_status: &Value, new_status: &Value) -> Option<Value> {
    merge_patch_diff(old_status, new_status).map(|delta| serde_json::json!({ "status": delta }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_values_produce_no_patch() {
        let value = json!({"summary": {"total": 3}, "conditions": []});
        assert_eq!(merge_patch_diff(&value, &value), None);
    }

    #[test]
    fn test_only_changed_fields_are_included() {
        let old = json!({"summary": {"total": 3, "applied": 3}, "observedGeneration": 1});
        let new = json!({"summary": {"total": 2, "applied": 3}, "observedGeneration": 1});
        assert_eq!(
            merge_patch_diff(&old, &new),
            Some(json!({"summary": {"total": 2}}))
        );
    }

    #[test]
    fn test_removed_keys_become_null() {
        let old = json!({"a": 1, "b": 2});
        let new = json!({"a": 1});
        assert_eq!(merge_patch_diff(&old, &new), Some(json!({"b": null})));
    }

    #[test]
    fn test_arrays_are_replaced() {
        let old = json!({"conditions": [{"type": "A"}]});
        let new = json!({"conditions": [{"type": "A"}, {"type": "B"}]});
        assert_eq!(
            merge_patch_diff(&old, &new),
            Some(json!({"conditions": [{"type": "A"}, {"type": "B"}]}))
        );
    }

    #[test]
    fn test_apply_reverses_diff() {
        let old = json!({"a": {"x": 1, "y": 2}, "b": [1, 2], "c": "gone"});
        let new = json!({"a": {"x": 5, "y": 2}, "b": [3], "d": true});
        let patch = merge_patch_diff(&old, &new).unwrap();
        let mut patched = old.clone();
        apply_merge_patch(&mut patched, &patch);
        assert_eq!(patched, new);
    }

    #[test]
    fn test_status_patch_from_null() {
        let patch = status_patch(&Value::Null, &json!({"summary": {"total": 0}})).unwrap();
        assert_eq!(patch, json!({"status": {"summary": {"total": 0}}}));
    }
}
