//! Closed value model for container contents.
//!
//! Container entries are dispatched on an explicit tag instead of runtime
//! type inspection: a value is either an engine scalar or one of the three
//! container proxies.

use yrs::{Any, Out};

use crate::doc::DocRef;
use crate::error::DocError;
use crate::list::List;
use crate::map::KeyedMap;
use crate::text::Text;

/// The three container kinds a document root (or nested value) can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Map,
    Text,
}

#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Any),
    List(List),
    Map(KeyedMap),
    Text(Text),
}

impl Value {
    /// Plain-data rendering of the value, recursing through containers.
    pub fn to_json(&self) -> Result<Any, DocError> {
        match self {
            Value::Scalar(any) => Ok(any.clone()),
            Value::List(list) => list.to_json(),
            Value::Map(map) => map.to_json(),
            Value::Text(text) => Ok(Any::String(text.get_string()?.into())),
        }
    }

    pub fn as_scalar(&self) -> Option<&Any> {
        match self {
            Value::Scalar(any) => Some(any),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&KeyedMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Any> for Value {
    fn from(any: Any) -> Self {
        Value::Scalar(any)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(Any::Bool(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(Any::Number(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Scalar(Any::BigInt(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(Any::String(value.into()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(Any::String(value.into()))
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<KeyedMap> for Value {
    fn from(map: KeyedMap) -> Self {
        Value::Map(map)
    }
}

impl From<Text> for Value {
    fn from(text: Text) -> Self {
        Value::Text(text)
    }
}

/// Wraps an engine read result so callers always see the proxy abstraction,
/// never a raw engine handle.
pub(crate) fn out_to_value(doc: &DocRef, out: Out) -> Value {
    match out {
        Out::Any(any) => Value::Scalar(any),
        Out::YArray(handle) => Value::List(List::from_handle(doc.clone(), handle)),
        Out::YMap(handle) => Value::Map(KeyedMap::from_handle(doc.clone(), handle)),
        Out::YText(handle) => Value::Text(Text::from_handle(doc.clone(), handle)),
        _ => Value::Scalar(Any::Undefined),
    }
}
