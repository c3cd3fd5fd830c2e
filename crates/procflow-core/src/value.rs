//! Attribute values carried by events (`vmap` entries and case/event attributes)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed attribute value, mirroring the attribute kinds of XES and OCEL logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Str(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "boolean",
            AttributeValue::Int(_) => "int",
            AttributeValue::Float(_) => "float",
            AttributeValue::Date(_) => "date",
            AttributeValue::Str(_) => "string",
            AttributeValue::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(n) => Some(*n),
            AttributeValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Convert an arbitrary JSON value, keeping strings that parse as
    /// RFC 3339 timestamps as dates.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => AttributeValue::Date(dt.with_timezone(&Utc)),
                Err(_) => AttributeValue::Str(s.clone()),
            },
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.iter().map(AttributeValue::from_json).collect())
            }
            // Nested objects have no attribute counterpart; keep their text form.
            serde_json::Value::Object(_) => AttributeValue::Str(value.to_string()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(n) => write!(f, "{}", n),
            AttributeValue::Float(n) => write!(f, "{}", n),
            AttributeValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            AttributeValue::Str(s) => write!(f, "{}", s),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Int(n)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Float(n)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(d: DateTime<Utc>) -> Self {
        AttributeValue::Date(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!(3)),
            AttributeValue::Int(3)
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!(2.5)),
            AttributeValue::Float(2.5)
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!("clerk")),
            AttributeValue::Str("clerk".into())
        );
        assert_eq!(
            AttributeValue::from_json(&serde_json::json!(null)),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_from_json_date() {
        let v = AttributeValue::from_json(&serde_json::json!("2024-03-01T10:00:00Z"));
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(v.as_date(), Some(expected));
    }

    #[test]
    fn test_int_reads_as_float() {
        assert_eq!(AttributeValue::Int(4).as_float(), Some(4.0));
        assert_eq!(AttributeValue::Str("4".into()).as_float(), None);
    }

    #[test]
    fn test_display_list() {
        let v = AttributeValue::List(vec![1i64.into(), "x".into()]);
        assert_eq!(v.to_string(), "[1, x]");
    }
}
