//! Path-addressed operations over a JSON tree.
//!
//! Empty objects and `null` mean "no value": writing either deletes the node,
//! and parents left empty by a delete are pruned.

use serde_json::{Map, Value};

use agora_types::paths;

pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Value stored at `path`, if any.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in paths::segments(path) {
        node = node.as_object()?.get(segment)?;
    }
    if is_empty(node) { None } else { Some(node) }
}

/// Store `value` at `path`, replacing whatever was there.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = paths::segments(path).collect();
    set_in(root, &segments, value);
    if root.is_null() {
        *root = Value::Object(Map::new());
    }
}

fn set_in(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = if is_empty(&value) { Value::Null } else { value };
        return;
    };

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    let child = map.entry(head.to_string()).or_insert(Value::Null);
    set_in(child, rest, value);
    if is_empty(child) {
        map.remove(*head);
    }
}
