//! value representation and flattening
//!
//! Backends hand out tree-shaped payloads (JSON documents, YAML files, ...). Downstream consumers only
//! understand flat `/`-joined keys, so every tree is converted into a [Value] and then [flatten]ed.
//!
//! The value model contains the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - unsigned integer (u64, only for values above i64::MAX)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//! - other (anything the source format can express that we cannot, kept only for diagnostics)
//!
//! Flattening rules:
//! - object entries become `root/key`
//! - array elements become `root/<index>`, or `root/<name>` when the element is an object with a string `name`
//!   (that `name` entry is then not emitted on its own)
//! - scalars are rendered as strings (`null` becomes `"null"`)
//! - `other` is skipped with a warning, the rest of the tree is still flattened
use crate::backend::Snapshot;

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(indexmap::IndexMap<String, Value>),
    /// Unsupported node, the string describes what was found
    Other(String),
}

impl Value {
    /// The string `name` of an object, used as its path segment inside arrays
    fn element_name(&self) -> Option<&str> {
        let Value::Object(object) = self else {
            return None;
        };

        match object.get("name") {
            Some(Value::String(name)) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Number> for Value {
    fn from(value: serde_json::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }
        if let Some(int) = value.as_u64() {
            return Value::Unsigned(int);
        }

        match value.as_f64() {
            Some(decimal) => Value::Decimal(decimal),
            None => Value::Other(format!("number {value}")),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => n.into(),
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(a) => a.into(),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_yaml::Number> for Value {
    fn from(value: serde_yaml::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }
        if let Some(int) = value.as_u64() {
            return Value::Unsigned(int);
        }

        match value.as_f64() {
            Some(decimal) => Value::Decimal(decimal),
            None => Value::Other(format!("number {value}")),
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => n.into(),
            Yaml::String(s) => s.into(),
            Yaml::Sequence(s) => s.into(),
            Yaml::Mapping(m) => Value::Object(
                m.into_iter()
                    .map(|(k, v)| match yaml_key(&k) {
                        Some(key) => (key, v.into()),
                        None => (format!("{k:?}"), Value::Other("non-scalar mapping key".into())),
                    })
                    .collect(),
            ),
            Yaml::Tagged(tagged) => Value::Other(format!("tagged value {}", tagged.tag)),
        }
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Null => Some("null".into()),
        _ => None,
    }
}

/// Join a parent path and a child segment with `/`
///
/// A root of `/` (or an empty root) does not produce a double slash.
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{parent}/{child}")
}

/// Flatten a tree into a fresh [Snapshot] rooted at `root`
pub fn flatten(root: &str, value: &Value) -> Snapshot {
    let mut snapshot = Snapshot::new();
    flatten_into(root, value, &mut snapshot);
    snapshot
}

/// Flatten a tree into an existing snapshot
///
/// Never fails. Unsupported nodes are skipped and reported through `tracing`.
pub fn flatten_into(root: &str, value: &Value, snapshot: &mut Snapshot) {
    match value {
        Value::Object(object) => {
            for (key, child) in object {
                flatten_into(&join_path(root, key), child, snapshot);
            }
        }
        Value::Array(array) => {
            for (index, element) in array.iter().enumerate() {
                match (element.element_name(), element) {
                    // the name already is the path segment, it is not repeated as a key
                    (Some(name), Value::Object(object)) => {
                        let element_root = join_path(root, name);
                        for (key, child) in object.iter().filter(|(key, _)| *key != "name") {
                            flatten_into(&join_path(&element_root, key), child, snapshot);
                        }
                    }
                    _ => flatten_into(&join_path(root, &index.to_string()), element, snapshot),
                }
            }
        }
        Value::Boolean(b) => {
            snapshot.insert(root.to_string(), b.to_string());
        }
        Value::Integer(i) => {
            snapshot.insert(root.to_string(), i.to_string());
        }
        Value::Unsigned(u) => {
            snapshot.insert(root.to_string(), u.to_string());
        }
        // f64's Display is the shortest representation that round-trips and never uses an exponent
        Value::Decimal(d) => {
            snapshot.insert(root.to_string(), d.to_string());
        }
        Value::String(s) => {
            snapshot.insert(root.to_string(), s.clone());
        }
        Value::Null => {
            snapshot.insert(root.to_string(), "null".to_string());
        }
        Value::Other(description) => {
            tracing::warn!(path = root, %description, "skipping unsupported value");
        }
    }
}
