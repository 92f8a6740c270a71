//! Port type descriptions and the edge compatibility rules.
//!
//! The type system is nominal with two escape hatches: `any` connects to
//! everything, and unions connect through their members. There is no
//! subtyping between distinct discriminators, so `int` never feeds `float`.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const ANY: &str = "any";
pub const INT: &str = "int";
pub const FLOAT: &str = "float";
pub const BOOL: &str = "bool";
pub const STR: &str = "str";
pub const LIST: &str = "list";
pub const DICT: &str = "dict";
pub const UNION: &str = "union";
pub const ENUM: &str = "enum";
pub const NONE: &str = "none";

/// Declared type of one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<TypeMetadata>,
}

impl TypeMetadata {
    /// A plain (non-generic) type, including domain types such as `"image"`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            optional: false,
            values: None,
            type_args: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self::new(ANY)
    }

    pub fn int() -> Self {
        Self::new(INT)
    }

    pub fn float() -> Self {
        Self::new(FLOAT)
    }

    pub fn bool() -> Self {
        Self::new(BOOL)
    }

    pub fn str() -> Self {
        Self::new(STR)
    }

    pub fn list(element: TypeMetadata) -> Self {
        Self {
            type_args: vec![element],
            ..Self::new(LIST)
        }
    }

    pub fn dict(key: TypeMetadata, value: TypeMetadata) -> Self {
        Self {
            type_args: vec![key, value],
            ..Self::new(DICT)
        }
    }

    pub fn union(alternatives: Vec<TypeMetadata>) -> Self {
        Self {
            type_args: alternatives,
            ..Self::new(UNION)
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: Some(values.into_iter().map(Into::into).collect()),
            ..Self::new(ENUM)
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is(&self, type_name: &str) -> bool {
        self.type_name == type_name
    }

    /// Whether data produced at a port of type `self` may feed a port of
    /// type `target`.
    pub fn connects_to(&self, target: &TypeMetadata) -> bool {
        is_connectable(self, target)
    }

    /// Value-level check used when a resolved input is assigned to a property.
    pub fn accepts(&self, value: &Value) -> bool {
        if self.is(ANY) {
            return true;
        }
        if let Value::Null = value {
            return self.optional || self.is(NONE);
        }

        match self.type_name.as_str() {
            INT => matches!(value, Value::Int(_)),
            FLOAT => matches!(value, Value::Float(_) | Value::Int(_)),
            BOOL => matches!(value, Value::Bool(_)),
            STR => matches!(value, Value::String(_)),
            NONE => false,
            LIST => match value {
                Value::List(items) => match self.type_args.first() {
                    Some(element) => items.iter().all(|item| element.accepts(item)),
                    None => true,
                },
                _ => false,
            },
            DICT => match value {
                Value::Map(map) => match self.type_args.get(1) {
                    Some(element) => map.values().all(|v| element.accepts(v)),
                    None => true,
                },
                _ => false,
            },
            UNION => self.type_args.iter().any(|alt| alt.accepts(value)),
            ENUM => match (value, &self.values) {
                (Value::String(s), Some(values)) => values.iter().any(|v| v == s),
                _ => false,
            },
            domain => match value {
                Value::Ref(asset) => asset.type_name == domain,
                Value::Handle(handle) => handle.type_name == domain,
                Value::Map(map) => {
                    matches!(map.get("type"), Some(Value::String(t)) if t == domain)
                }
                _ => false,
            },
        }
    }
}

/// Edge compatibility between a source port type and a target port type.
///
/// The order of the checks matters: a source union is unpacked first, a
/// target union is only consulted when the discriminators differ.
pub fn is_connectable(source: &TypeMetadata, target: &TypeMetadata) -> bool {
    if source.is(ANY) || target.is(ANY) {
        return true;
    }

    if source.is(UNION) {
        return source
            .type_args
            .iter()
            .any(|alternative| is_connectable(alternative, target));
    }

    if source.type_name == target.type_name {
        return match source.type_name.as_str() {
            LIST | DICT => {
                source.type_args.len() == target.type_args.len()
                    && source
                        .type_args
                        .iter()
                        .zip(&target.type_args)
                        .all(|(s, t)| is_connectable(s, t))
            }
            ENUM => match (&source.values, &target.values) {
                (Some(a), Some(b)) => {
                    a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
                }
                _ => false,
            },
            _ => true,
        };
    }

    if target.is(UNION) {
        return target
            .type_args
            .iter()
            .any(|alternative| is_connectable(source, alternative));
    }

    false
}

impl fmt::Display for TypeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "optional[")?;
        }
        write!(f, "{}", self.type_name)?;
        if let Some(values) = &self.values {
            write!(f, "[{}]", values.join(", "))?;
        } else if !self.type_args.is_empty() {
            let args: Vec<String> = self.type_args.iter().map(|t| t.to_string()).collect();
            write!(f, "[{}]", args.join(", "))?;
        }
        if self.optional {
            write!(f, "]")?;
        }
        Ok(())
    }
}
