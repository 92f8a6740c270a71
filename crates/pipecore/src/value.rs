use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Dynamic value type for node properties and outputs.
///
/// Serializes as plain JSON. Integers become `Int`, other numbers `Float`,
/// and objects that look like an asset reference become `Ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to a domain asset (image, audio, document, ...)
    Ref(AssetRef),
    /// In-process handle that never leaves the engine (loaded model, device buffer)
    Handle(OpaqueHandle),
}

/// Reference to an asset held by an external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
}

impl AssetRef {
    pub fn new(type_name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            uri: uri.into(),
            asset_id: None,
        }
    }

    pub fn with_asset_id(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    fn looks_like(obj: &serde_json::Map<String, serde_json::Value>) -> bool {
        matches!(obj.get("type"), Some(serde_json::Value::String(_)))
            && (obj.contains_key("uri") || obj.contains_key("asset_id"))
    }
}

/// Opaque, non-serializable value shared by reference.
#[derive(Clone)]
pub struct OpaqueHandle {
    pub type_name: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueHandle {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            inner: Arc::new(value),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for OpaqueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueHandle<{}>", self.type_name)
    }
}

impl PartialEq for OpaqueHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the runtime type, in the same vocabulary as `TypeMetadata`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Ref(asset) => &asset.type_name,
            Value::Handle(handle) => &handle.type_name,
        }
    }

    /// False if the value (or anything nested in it) is an opaque handle.
    pub fn is_serializable(&self) -> bool {
        match self {
            Value::Handle(_) => false,
            Value::List(items) => items.iter().all(Value::is_serializable),
            Value::Map(map) => map.values().all(Value::is_serializable),
            _ => true,
        }
    }

    /// Client-facing form: asset references flattened to plain maps.
    /// Returns `None` for values that cannot leave the process.
    pub fn to_client(&self) -> Option<Value> {
        match self {
            Value::Handle(_) => None,
            Value::Ref(asset) => {
                let mut map = HashMap::new();
                map.insert("type".to_string(), Value::String(asset.type_name.clone()));
                map.insert("uri".to_string(), Value::String(asset.uri.clone()));
                if let Some(id) = &asset.asset_id {
                    map.insert("asset_id".to_string(), Value::String(id.clone()));
                }
                Some(Value::Map(map))
            }
            Value::List(items) => Some(Value::List(
                items.iter().filter_map(Value::to_client).collect(),
            )),
            Value::Map(map) => Some(Value::Map(
                map.iter()
                    .filter_map(|(k, v)| v.to_client().map(|v| (k.clone(), v)))
                    .collect(),
            )),
            other => Some(other.clone()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::List(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                if AssetRef::looks_like(&obj) {
                    if let Ok(asset) =
                        serde_json::from_value::<AssetRef>(serde_json::Value::Object(obj.clone()))
                    {
                        return Value::Ref(asset);
                    }
                }
                Value::Map(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null | Value::Handle(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
            Value::Ref(asset) => serde_json::to_value(asset).unwrap_or(serde_json::Value::Null),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<AssetRef> for Value {
    fn from(asset: AssetRef) -> Self {
        Value::Ref(asset)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_kind() {
        assert_eq!(Value::from(json!(5)), Value::Int(5));
        assert_eq!(Value::from(json!(5.5)), Value::Float(5.5));
    }

    #[test]
    fn asset_shaped_objects_become_refs() {
        let value = Value::from(json!({"type": "image", "uri": "file:///a.png"}));
        assert_eq!(value, Value::Ref(AssetRef::new("image", "file:///a.png")));
        assert_eq!(value.type_name(), "image");

        let plain = Value::from(json!({"type": "image", "width": 3}));
        assert!(matches!(plain, Value::Map(_)));
    }

    #[test]
    fn handles_are_dropped_from_client_view() {
        let handle = Value::Handle(OpaqueHandle::new("model", 42u32));
        assert!(!handle.is_serializable());
        assert!(handle.to_client().is_none());

        let nested = Value::List(vec![Value::Int(1), handle]);
        assert_eq!(nested.to_client(), Some(Value::List(vec![Value::Int(1)])));
    }

    #[test]
    fn serializes_as_plain_json() {
        let value = Value::List(vec![Value::Int(1), Value::String("a".into())]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[1,"a"]"#);
    }
}
