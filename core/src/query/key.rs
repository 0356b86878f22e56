//! Cache keys.
//!
//! A `QueryKey` is an ordered tuple of typed segments. Two keys address the
//! same cache entry when they are structurally equal, including JSON
//! payload segments, whose objects compare and hash independently of field
//! order. Payload numbers compare by value, so `1` and `1.0` are one key.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Number, Value};

#[derive(Debug, Clone)]
pub enum KeySegment {
    Str(String),
    Int(i64),
    Bool(bool),
    Data(Value),
    Absent,
}

impl PartialEq for KeySegment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (KeySegment::Str(a), KeySegment::Str(b)) => a == b,
            (KeySegment::Int(a), KeySegment::Int(b)) => a == b,
            (KeySegment::Bool(a), KeySegment::Bool(b)) => a == b,
            (KeySegment::Data(a), KeySegment::Data(b)) => values_equal(a, b),
            (KeySegment::Absent, KeySegment::Absent) => true,
            _ => false,
        }
    }
}

impl Eq for KeySegment {}

impl Hash for KeySegment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            KeySegment::Str(s) => s.hash(state),
            KeySegment::Int(n) => n.hash(state),
            KeySegment::Bool(b) => b.hash(state),
            KeySegment::Data(value) => hash_value(value, state),
            KeySegment::Absent => {}
        }
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => canonical_number(n).hash(state),
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            fields.len().hash(state);
            for (key, value) in fields {
                key.hash(state);
                hash_value(value, state);
            }
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => canonical_number(x) == canonical_number(y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, a)| y.get(key).is_some_and(|b| values_equal(a, b)))
        }
        _ => a == b,
    }
}

#[derive(PartialEq, Eq, Hash)]
enum CanonicalNumber {
    Integer(i128),
    Float(u64),
}

/// Integral floats within the `u64`/`i64` range collapse onto integers.
fn canonical_number(n: &Number) -> CanonicalNumber {
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;

    if let Some(i) = n.as_i64() {
        return CanonicalNumber::Integer(i.into());
    }
    if let Some(u) = n.as_u64() {
        return CanonicalNumber::Integer(u.into());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < LIMIT => CanonicalNumber::Integer(f as i128),
        Some(f) => CanonicalNumber::Float(f.to_bits()),
        None => CanonicalNumber::Float(f64::NAN.to_bits()),
    }
}

impl KeySegment {
    fn to_json(&self) -> Value {
        match self {
            KeySegment::Str(s) => Value::from(s.as_str()),
            KeySegment::Int(n) => Value::from(*n),
            KeySegment::Bool(b) => Value::from(*b),
            KeySegment::Data(value) => value.clone(),
            KeySegment::Absent => Value::Null,
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Str(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        KeySegment::Int(value)
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        KeySegment::Int(value.into())
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        KeySegment::Bool(value)
    }
}

/// `null` and a missing payload are the same segment.
impl From<Value> for KeySegment {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => KeySegment::Absent,
            value => KeySegment::Data(value),
        }
    }
}

impl<T: Into<KeySegment>> From<Option<T>> for KeySegment {
    fn from(value: Option<T>) -> Self {
        value.map_or(KeySegment::Absent, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(tag: impl Into<KeySegment>) -> Self {
        Self(vec![tag.into()])
    }

    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    /// Whether `prefix` addresses this key (or a family containing it).
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<Vec<KeySegment>> for QueryKey {
    fn from(segments: Vec<KeySegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = Value::Array(self.0.iter().map(KeySegment::to_json).collect());
        write!(f, "{json}")
    }
}

/// Key constructors for the engine's resources.
pub mod keys {
    use serde_json::Value;

    use super::QueryKey;

    pub const PROCESS_INSTANCES: &str = "processInstances";
    pub const PROCESS_INSTANCE: &str = "processInstance";
    pub const PROCESS_MODELS: &str = "processModels";
    pub const PROCESS_MODEL: &str = "processModel";
    pub const PROCESS_GROUPS: &str = "processGroups";
    pub const PROCESS_GROUP: &str = "processGroup";
    pub const TASKS: &str = "tasks";
    pub const TASK: &str = "task";

    /// Every instance listing, whatever its filters.
    pub fn process_instance_lists() -> QueryKey {
        QueryKey::new(PROCESS_INSTANCES)
    }

    pub fn process_instances(filters: Option<&Value>) -> QueryKey {
        process_instance_lists().with(filters.cloned())
    }

    pub fn process_instance(id: i64) -> QueryKey {
        QueryKey::new(PROCESS_INSTANCE).with(id)
    }

    pub fn process_models() -> QueryKey {
        QueryKey::new(PROCESS_MODELS)
    }

    pub fn process_model(id: &str) -> QueryKey {
        QueryKey::new(PROCESS_MODEL).with(id)
    }

    pub fn process_groups() -> QueryKey {
        QueryKey::new(PROCESS_GROUPS)
    }

    pub fn process_group(id: &str) -> QueryKey {
        QueryKey::new(PROCESS_GROUP).with(id)
    }

    pub fn tasks() -> QueryKey {
        QueryKey::new(TASKS)
    }

    pub fn task(id: &str) -> QueryKey {
        QueryKey::new(TASK).with(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::hash::DefaultHasher;

    fn hash_of(key: &QueryKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn structurally_equal_payloads_are_the_same_key() {
        let a: Value = serde_json::from_str(r#"{"status":"active","page":{"n":1,"size":10}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"page":{"size":10,"n":1},"status":"active"}"#).unwrap();
        let ka = keys::process_instances(Some(&a));
        let kb = keys::process_instances(Some(&b));
        assert_eq!(ka, kb);
        assert_eq!(hash_of(&ka), hash_of(&kb));

        let mut map = HashMap::new();
        map.insert(ka, 1);
        assert_eq!(map.get(&kb), Some(&1));
    }

    #[test]
    fn integral_floats_match_integers() {
        let a = keys::process_instances(Some(&json!({"page": 1, "ids": [2, 3]})));
        let b = keys::process_instances(Some(&json!({"page": 1.0, "ids": [2.0, 3]})));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = keys::process_instances(Some(&json!({"page": 1.5})));
        assert_ne!(keys::process_instances(Some(&json!({"page": 1}))), c);
        assert_eq!(
            keys::process_instances(Some(&json!({"offset": -0.0}))),
            keys::process_instances(Some(&json!({"offset": 0})))
        );
    }

    #[test]
    fn different_payloads_are_different_keys() {
        let a = keys::process_instances(Some(&json!({"status": "active"})));
        let b = keys::process_instances(Some(&json!({"status": "complete"})));
        assert_ne!(a, b);
    }

    #[test]
    fn null_and_missing_filters_coincide() {
        assert_eq!(
            keys::process_instances(None),
            keys::process_instances(Some(&Value::Null))
        );
        assert_ne!(
            keys::process_instances(None),
            keys::process_instances(Some(&json!({})))
        );
    }

    #[test]
    fn segment_types_are_not_conflated() {
        assert_ne!(QueryKey::new("task").with(42), QueryKey::new("task").with("42"));
    }

    #[test]
    fn prefix_matching() {
        let listing = keys::process_instances(Some(&json!({"status": "active"})));
        assert!(listing.starts_with(&keys::process_instance_lists()));
        assert!(!keys::process_instance(42).starts_with(&keys::process_instance_lists()));
        assert!(keys::process_instance(42).starts_with(&keys::process_instance(42)));
        assert!(!keys::process_instance(4).starts_with(&keys::process_instance(42)));
    }

    #[test]
    fn display_is_json_tuple() {
        assert_eq!(keys::process_instance(42).to_string(), r#"["processInstance",42]"#);
        assert_eq!(
            keys::process_instances(None).to_string(),
            r#"["processInstances",null]"#
        );
    }
}
