use crate::types::Type;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Runtime value of a message field, variable or expression
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// String value
    String(String),
    /// Integer value
    Long(i64),
    /// Floating point value
    Double(f64),
    /// Boolean value
    Boolean(bool),
    /// UTC date/time value
    DateTime(DateTime<Utc>),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values, iterated in key order
    Map(BTreeMap<String, Value>),
    /// Absent value
    Null,
}

// -------------------------------------------------------------------------------------------------
// Conversions between `Value` and `serde_json::Value`. Messages enter and leave the engine as JSON,
// so these are the only mapping between the wire shape and the typed runtime values.
// -------------------------------------------------------------------------------------------------

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Long(i) => Self::Number(serde_json::Number::from(i)),
            Value::Double(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Value::Boolean(b) => Self::Bool(b),
            Value::DateTime(dt) => Self::String(dt.to_rfc3339()),
            Value::Array(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            Value::Map(map) => Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
            Value::Null => Self::Null,
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Long(i),
                None => n.as_f64().map_or(Self::Null, Self::Double),
            },
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
            }
            serde_json::Value::Null => Self::Null,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Map(value)
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Value::{Boolean, DateTime, Double, Long, Null, String};
        match (self, other) {
            (String(a), String(b)) => a.partial_cmp(b),
            (Long(a), Long(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (DateTime(a), DateTime(b)) => a.partial_cmp(b),
            (Null, Null) => Some(Ordering::Equal),
            #[allow(clippy::cast_precision_loss)]
            (Long(a), Double(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Double(a), Long(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Long(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Null => write!(f, "null"),
        }
    }
}

impl Value {
    /// Runtime type of this value. Arrays report the unified type of their
    /// elements; `Null` reports `Any`.
    #[must_use]
    pub fn value_type(&self) -> Type {
        match self {
            Self::String(_) => Type::String,
            Self::Long(_) => Type::Long,
            Self::Double(_) => Type::Double,
            Self::Boolean(_) => Type::Boolean,
            Self::DateTime(_) => Type::DateTime,
            Self::Map(_) => Type::Map,
            Self::Null => Type::Any,
            Self::Array(items) => Type::array(
                items
                    .iter()
                    .map(Self::value_type)
                    .reduce(|a, b| a.unify(&b).unwrap_or(Type::Any))
                    .unwrap_or(Type::Any),
            ),
        }
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Null => "null",
        }
    }

    /// Whether this is `Null`
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow as a string slice
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, without conversion
    #[must_use]
    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(i) => Some(*i),
            _ => None,
        }
    }

    /// Floating point value, widening integers
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Long(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean value, without conversion
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Timestamp value
    #[must_use]
    pub const fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Borrow as an array
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow as a map
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_numbers_keep_their_kind() {
        assert_eq!(Value::from(&json!(503)), Value::Long(503));
        assert_eq!(Value::from(&json!(1.5)), Value::Double(1.5));
        assert_eq!(Value::from(&json!("503")), Value::String("503".to_string()));
    }

    #[test]
    fn test_json_object_round_trip() {
        let original = json!({"user": {"name": "ada", "roles": ["admin", "ops"]}, "count": 3});
        let value = Value::from(&original);
        assert_eq!(serde_json::Value::from(value), original);
    }

    #[test]
    fn test_cross_numeric_ordering() {
        assert!(Value::Long(2) < Value::Double(2.5));
        assert_eq!(Value::String("a".into()).partial_cmp(&Value::Long(1)), None);
    }

    #[test]
    fn test_array_value_type_unifies_elements() {
        let mixed = Value::Array(vec![Value::Long(1), Value::Double(2.0)]);
        assert_eq!(mixed.value_type(), Type::array(Type::Double));
        assert_eq!(Value::Array(vec![]).value_type(), Type::array(Type::Any));
    }
}
