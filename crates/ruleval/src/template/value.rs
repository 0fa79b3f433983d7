//! Dynamic values flowing through template execution.

use std::collections::BTreeMap;
use std::fmt;

use crate::client::Sample;
use crate::template::printf::format_float;

/// Shared nil returned for missing map keys.
pub(crate) static NIL: Value = Value::Nil;

/// A value produced or consumed while executing a template.
///
/// Maps are ordered so that ranging over them and printing them is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// The absence of a value. Missing map keys evaluate to nil and print as
    /// empty text.
    #[default]
    Nil,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    Str(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the name of this value's type, as used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "<nil>",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float64",
            Self::Str(_) => "string",
            Self::List(_) => "[]interface {}",
            Self::Map(_) => "map[string]interface {}",
        }
    }

    /// Returns the truth of the value: false for nil, `false`, zero numbers,
    /// and empty strings, lists or maps.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Map(m) => !m.is_empty(),
        }
    }

    /// Converts the value to a float, parsing strings.
    pub(crate) fn to_float(&self) -> Result<f64, String> {
        match self {
            Self::Int(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            Self::Str(s) => s
                .parse::<f64>()
                .map_err(|_| format!("strconv.ParseFloat: parsing {s:?}: invalid syntax")),
            other => Err(format!("can't convert {} to float", other.type_name())),
        }
    }

    /// Builds the map representation of a query sample: `Labels` and `Value`.
    #[must_use]
    pub fn from_sample(sample: &Sample) -> Self {
        let mut map = BTreeMap::new();
        map.insert("Labels".to_string(), Self::from(&sample.labels));
        map.insert("Value".to_string(), Self::Float(sample.value));
        Self::Map(map)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&BTreeMap<String, String>> for Value {
    fn from(labels: &BTreeMap<String, String>) -> Self {
        Self::Map(
            labels
                .iter()
                .map(|(k, v)| (k.clone(), Self::Str(v.clone())))
                .collect(),
        )
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x, None)),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Value::Nil, false ; "nil")]
    #[test_case(Value::Bool(true), true ; "true")]
    #[test_case(Value::Int(0), false ; "zero int")]
    #[test_case(Value::Float(0.5), true ; "nonzero float")]
    #[test_case(Value::from(""), false ; "empty string")]
    #[test_case(Value::from("x"), true ; "string")]
    #[test_case(Value::List(vec![]), false ; "empty list")]
    #[test_case(Value::Map(BTreeMap::new()), false ; "empty map")]
    fn truth(value: Value, expected: bool) {
        assert_eq!(value.is_true(), expected);
    }

    #[test]
    fn display_composites() {
        let list = Value::List(vec![Value::Int(1), Value::from("a"), Value::Bool(false)]);
        assert_eq!(list.to_string(), "[1 a false]");

        let mut labels = BTreeMap::new();
        labels.insert("job".to_string(), "node".to_string());
        labels.insert("instance".to_string(), "a:9100".to_string());
        assert_eq!(Value::from(&labels).to_string(), "map[instance:a:9100 job:node]");
    }

    #[test]
    fn display_nil_is_empty() {
        assert_eq!(Value::Nil.to_string(), "");
    }

    #[test]
    fn to_float_conversions() {
        assert_eq!(Value::Int(3).to_float(), Ok(3.0));
        assert_eq!(Value::from("2.5").to_float(), Ok(2.5));
        assert!(Value::from("abc").to_float().is_err());
        assert!(Value::Nil.to_float().is_err());
    }

    #[test]
    fn sample_map_shape() {
        let sample = Sample::new(4.0).with_label("job", "api");
        let Value::Map(map) = Value::from_sample(&sample) else {
            unreachable!("sample must convert to a map");
        };
        assert_eq!(map.get("Value"), Some(&Value::Float(4.0)));
        assert!(matches!(map.get("Labels"), Some(Value::Map(l)) if l.len() == 1));
    }
}
