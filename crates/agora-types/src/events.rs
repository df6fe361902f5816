use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events delivered to a store listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoreEvent {
    /// Full materialization of the subscribed path
    Snapshot(Snapshot),

    /// The listener was cancelled by the store; no further events follow
    Cancelled(StoreFault),
}

/// Everything under one path at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: String,
    /// `None` when nothing is stored at the path.
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn new(path: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Children in store order. A non-object value has no children.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.value
            .as_ref()
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn child_count(&self) -> usize {
        self.value
            .as_ref()
            .and_then(Value::as_object)
            .map_or(0, |map| map.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    PermissionDenied,
    Disconnected,
}

/// Descriptor handed to a listener when its subscription fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFault {
    pub kind: FaultKind,
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for StoreFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}: {}", self.kind, self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn children_follow_key_order() {
        let snap = Snapshot::new("articles", Some(json!({ "b": 2, "a": 1, "c": 3 })));
        let keys: Vec<&str> = snap.children().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(snap.child_count(), 3);
    }

    #[test]
    fn scalar_and_missing_values_have_no_children() {
        assert_eq!(Snapshot::new("x", Some(json!(4))).child_count(), 0);
        assert_eq!(Snapshot::new("x", None).children().count(), 0);
    }
}
