use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::core::errors::TypeHintError;

/// Canonical type hint carried by dataset fields, module outputs, metric
/// arguments and response schemas.
///
/// The textual encoding is `Origin[Arg1, Arg2, …]` with capitalized origin
/// names for containers (`List`, `Dict`, `Tuple`) and lowercase scalar names
/// (`str`, `int`, `float`, `bool`). It round-trips through
/// [`FromStr`]/[`Display`](fmt::Display) and therefore through serde.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeHint {
    Str,
    Int,
    Float,
    Bool,
    Any,
    Uuid,
    List(Box<TypeHint>),
    Dict(Box<TypeHint>, Box<TypeHint>),
    Tuple(Vec<TypeHint>),
}

impl TypeHint {
    pub fn list_of(inner: TypeHint) -> Self {
        TypeHint::List(Box::new(inner))
    }

    pub fn dict_of(key: TypeHint, value: TypeHint) -> Self {
        TypeHint::Dict(Box::new(key), Box::new(value))
    }

    /// The container origin without its arguments, used when comparing a
    /// bound field type against the dataset declaration.
    pub fn origin(&self) -> &'static str {
        match self {
            TypeHint::Str => "str",
            TypeHint::Int => "int",
            TypeHint::Float => "float",
            TypeHint::Bool => "bool",
            TypeHint::Any => "Any",
            TypeHint::Uuid => "Uuid",
            TypeHint::List(_) => "List",
            TypeHint::Dict(..) => "Dict",
            TypeHint::Tuple(_) => "Tuple",
        }
    }

    /// The value an empty sample slot starts with, so downstream code can
    /// unconditionally index.
    pub fn default_value(&self) -> Value {
        match self {
            TypeHint::Str | TypeHint::Uuid => Value::String(String::new()),
            TypeHint::Int => Value::from(0),
            TypeHint::Float => Value::from(0.0),
            TypeHint::Bool => Value::Bool(false),
            TypeHint::Any => Value::Null,
            TypeHint::List(_) | TypeHint::Tuple(_) => Value::Array(Vec::new()),
            TypeHint::Dict(..) => Value::Object(Map::new()),
        }
    }

    /// Structural check of a JSON value against the hint. `Any` matches
    /// everything; integers satisfy `float`; container arguments are checked
    /// element-wise.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            TypeHint::Any => true,
            TypeHint::Str | TypeHint::Uuid => value.is_string(),
            TypeHint::Int => value.is_i64() || value.is_u64(),
            TypeHint::Float => value.is_number(),
            TypeHint::Bool => value.is_boolean(),
            TypeHint::List(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| inner.matches(v))),
            TypeHint::Tuple(inners) => value.as_array().is_some_and(|items| {
                items.len() == inners.len()
                    && items.iter().zip(inners).all(|(v, t)| t.matches(v))
            }),
            TypeHint::Dict(_, val_ty) => value
                .as_object()
                .is_some_and(|map| map.values().all(|v| val_ty.matches(v))),
        }
    }

    /// Best-effort coercion used by the JSON scorer: `null` when the value
    /// cannot be made to fit.
    pub fn coerce(&self, value: &Value) -> Value {
        match self {
            TypeHint::Any => value.clone(),
            TypeHint::Str | TypeHint::Uuid => match value {
                Value::String(s) => Value::String(s.clone()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                _ => Value::Null,
            },
            TypeHint::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                Value::Bool(b) => Value::from(*b as i64),
                _ => Value::Null,
            },
            TypeHint::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            TypeHint::Bool => match value {
                Value::Bool(b) => Value::Bool(*b),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    _ => Value::Null,
                },
                _ => Value::Null,
            },
            TypeHint::List(inner) => match value {
                Value::Array(items) => {
                    Value::Array(items.iter().map(|v| inner.coerce(v)).collect())
                }
                _ => Value::Null,
            },
            TypeHint::Tuple(_) => match value {
                Value::Array(_) => value.clone(),
                _ => Value::Null,
            },
            TypeHint::Dict(..) => match value {
                Value::Object(_) => value.clone(),
                _ => Value::Null,
            },
        }
    }

    /// Infers a hint from a concrete JSON value, used when a dataset carries
    /// no manifest.
    pub fn infer(value: &Value) -> TypeHint {
        match value {
            Value::Null => TypeHint::Any,
            Value::Bool(_) => TypeHint::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => TypeHint::Int,
            Value::Number(_) => TypeHint::Float,
            Value::String(_) => TypeHint::Str,
            Value::Array(items) => match items.first() {
                Some(first) => TypeHint::list_of(TypeHint::infer(first)),
                None => TypeHint::list_of(TypeHint::Any),
            },
            Value::Object(_) => TypeHint::dict_of(TypeHint::Str, TypeHint::Any),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeHint::Int | TypeHint::Float)
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::List(inner) => write!(f, "List[{inner}]"),
            TypeHint::Dict(key, value) => write!(f, "Dict[{key}, {value}]"),
            TypeHint::Tuple(inners) => {
                write!(f, "Tuple[")?;
                for (i, inner) in inners.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{inner}")?;
                }
                write!(f, "]")
            }
            other => f.write_str(other.origin()),
        }
    }
}

/// Splits `a, b, c` at bracket depth zero, so `Dict[str, int], str` yields
/// two parts.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

impl FromStr for TypeHint {
    type Err = TypeHintError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let err = || TypeHintError {
            text: text.to_string(),
        };
        if let Some((origin, rest)) = text.split_once('[') {
            let args_str = rest.strip_suffix(']').ok_or_else(err)?;
            let args = split_top_level(args_str)
                .into_iter()
                .map(TypeHint::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            return match (origin.trim(), args.as_slice()) {
                ("List" | "list", [inner]) => Ok(TypeHint::list_of(inner.clone())),
                ("Dict" | "dict", [key, value]) => {
                    Ok(TypeHint::dict_of(key.clone(), value.clone()))
                }
                ("Tuple" | "tuple", _) => Ok(TypeHint::Tuple(args)),
                _ => Err(err()),
            };
        }
        match text {
            "str" | "Str" => Ok(TypeHint::Str),
            "int" | "Int" => Ok(TypeHint::Int),
            "float" | "Float" => Ok(TypeHint::Float),
            "bool" | "Bool" => Ok(TypeHint::Bool),
            "Any" | "any" => Ok(TypeHint::Any),
            "Uuid" | "UUID" => Ok(TypeHint::Uuid),
            "List" | "list" => Ok(TypeHint::list_of(TypeHint::Any)),
            "Dict" | "dict" => Ok(TypeHint::dict_of(TypeHint::Str, TypeHint::Any)),
            _ => Err(err()),
        }
    }
}

impl Serialize for TypeHint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TypeHint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        TypeHint::from_str(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_hint_round_trips() {
        let text = "List[Dict[str, int]]";
        let hint: TypeHint = text.parse().unwrap();
        assert_eq!(hint.to_string(), text);
    }

    #[test]
    fn tuple_splits_at_top_level_only() {
        let hint: TypeHint = "Tuple[Dict[str, int], str]".parse().unwrap();
        assert_eq!(
            hint,
            TypeHint::Tuple(vec![
                TypeHint::dict_of(TypeHint::Str, TypeHint::Int),
                TypeHint::Str,
            ])
        );
    }

    #[test]
    fn default_values_are_indexable() {
        assert_eq!(TypeHint::Str.default_value(), Value::String(String::new()));
        assert_eq!(
            TypeHint::list_of(TypeHint::Str).default_value(),
            Value::Array(vec![])
        );
        assert!(TypeHint::dict_of(TypeHint::Str, TypeHint::Any)
            .default_value()
            .is_object());
    }
}
