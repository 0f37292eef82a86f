//! Generic wire value and the native codec
//!
//! [`Value`] is the tagged union that crosses the transport boundary. Native
//! Rust data is converted with [`Encode`] and recovered with [`Decode`].
//!
//! Encoding is deliberately lossy in two places:
//! - every numeric type is widened (or truncated) to a signed 64-bit integer;
//! - maps are always emitted in canonical order, sorted by the string form
//!   of their keys, so ordered native maps do not keep their own order.
//!
//! Decoding never re-sorts: map entries come back in wire order.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use super::error::{CodecError, CodecResult};

/// Wire value exchanged with the sequence driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Repr", into = "Repr")]
pub enum Value {
    /// Absent value.
    #[default]
    None,
    /// UTF-8 string.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// Ordered key/value entries.
    Map(Vec<MapEntry>),
    /// Ordered items.
    List(Vec<Value>),
}

/// A single map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapEntry {
    /// Entry key.
    pub key: Value,
    /// Entry value.
    pub value: Value,
}

impl MapEntry {
    /// Create a new entry.
    pub fn new(key: Value, value: Value) -> Self {
        Self { key, value }
    }
}

// JSON shape: null | "s" | 1 | true | {"entries": [...]} | {"items": [...]}
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Map { entries: Vec<MapEntry> },
    List { items: Vec<Value> },
}

impl From<Repr> for Value {
    fn from(repr: Repr) -> Self {
        match repr {
            Repr::None => Value::None,
            Repr::Bool(b) => Value::Bool(b),
            Repr::Int(v) => Value::Int(v),
            Repr::Str(s) => Value::Str(s),
            Repr::Map { entries } => Value::Map(entries),
            Repr::List { items } => Value::List(items),
        }
    }
}

impl From<Value> for Repr {
    fn from(value: Value) -> Self {
        match value {
            Value::None => Repr::None,
            Value::Bool(b) => Repr::Bool(b),
            Value::Int(v) => Repr::Int(v),
            Value::Str(s) => Repr::Str(s),
            Value::Map(entries) => Repr::Map { entries },
            Value::List(items) => Repr::List { items },
        }
    }
}

impl Value {
    /// Name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
            Value::Map(_) => "map",
            Value::List(_) => "list",
        }
    }

    /// Whether this is `Value::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Returns the integer if this is a `Value::Int`.
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    /// Returns the string if this is a `Value::Str`.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::Str(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Returns the boolean if this is a `Value::Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Returns the items if this is a `Value::List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Returns the entries, in wire order, if this is a `Value::Map`.
    pub fn as_entries(&self) -> Option<&[MapEntry]> {
        if let Value::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Look up a map entry by key. Linear in the number of entries.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.as_entries()?
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Build a map from entries in any order; the result is canonically ordered.
    pub fn canonical_map(entries: Vec<MapEntry>) -> Self {
        Value::Map(canonicalize(entries))
    }

    /// Decode into a native type.
    pub fn decode<T: Decode>(&self) -> CodecResult<T> {
        T::decode(self)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Canonical string form. Map keys are sorted by this rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Int(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (idx, entry) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", entry.key, entry.value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn canonicalize(mut entries: Vec<MapEntry>) -> Vec<MapEntry> {
    entries.sort_by_cached_key(|entry| entry.key.to_string());
    entries
}

fn encode_entries<'a, K, V, I>(iter: I) -> Value
where
    K: Encode + ?Sized + 'a,
    V: Encode + ?Sized + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let entries = iter
        .into_iter()
        .map(|(k, v)| MapEntry::new(k.encode(), v.encode()))
        .collect();
    Value::canonical_map(entries)
}

/// Conversion from native data into a wire [`Value`].
pub trait Encode {
    /// Encode `self`. Never fails; lossy cases are documented per type.
    fn encode(&self) -> Value;
}

impl Encode for Value {
    fn encode(&self) -> Value {
        self.clone()
    }
}

impl Encode for () {
    fn encode(&self) -> Value {
        Value::None
    }
}

impl Encode for str {
    fn encode(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl Encode for String {
    fn encode(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl Encode for bool {
    fn encode(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! encode_integer {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                // Values beyond the i64 range wrap (two's complement truncation).
                fn encode(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }
        )*
    };
}

encode_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl Encode for f64 {
    // Fractions truncate toward zero, magnitudes saturate at the i64 bounds
    // and NaN becomes zero.
    fn encode(&self) -> Value {
        if !self.is_finite() {
            tracing::warn!(value = %self, "non-finite float saturates to an integer");
        }
        Value::Int(*self as i64)
    }
}

impl Encode for f32 {
    fn encode(&self) -> Value {
        f64::from(*self).encode()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Value {
        (**self).encode()
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self) -> Value {
        (**self).encode()
    }
}

impl<T: Encode + ?Sized> Encode for Arc<T> {
    fn encode(&self) -> Value {
        (**self).encode()
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self) -> Value {
        match self {
            Some(inner) => inner.encode(),
            None => Value::None,
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self) -> Value {
        Value::List(self.iter().map(Encode::encode).collect())
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self) -> Value {
        self.as_slice().encode()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self) -> Value {
        self.as_slice().encode()
    }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode(&self) -> Value {
        Value::List(self.iter().map(Encode::encode).collect())
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self) -> Value {
        Value::List(self.iter().map(Encode::encode).collect())
    }
}

// Sets have no native order; items are emitted in canonical order.
impl<T: Encode, S> Encode for HashSet<T, S> {
    fn encode(&self) -> Value {
        let mut items: Vec<Value> = self.iter().map(Encode::encode).collect();
        items.sort_by_cached_key(|item| item.to_string());
        Value::List(items)
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode(&self) -> Value {
        encode_entries(self.iter())
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self) -> Value {
        encode_entries(self.iter())
    }
}

impl Encode for serde_json::Value {
    fn encode(&self) -> Value {
        match self {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Int(v)
                } else if let Some(v) = n.as_u64() {
                    v.encode()
                } else {
                    n.as_f64().map(|v| v.encode()).unwrap_or_default()
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Encode::encode).collect())
            }
            serde_json::Value::Object(map) => encode_entries(map.iter()),
        }
    }
}

/// Encode a dynamically typed native value.
///
/// Unsupported types are not fatal: they encode as [`Value::None`] and emit a
/// warning diagnostic.
pub fn encode_any(value: &dyn Any) -> Value {
    macro_rules! try_downcast {
        ($($ty:ty),*) => {
            $(
                if let Some(v) = value.downcast_ref::<$ty>() {
                    return v.encode();
                }
            )*
        };
    }

    try_downcast!(
        Value, String, &'static str, bool, (),
        i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
        Vec<Value>, Vec<String>, Vec<i64>, Vec<bool>,
        HashMap<String, Value>, BTreeMap<String, Value>, serde_json::Value
    );

    tracing::warn!(type_id = ?Any::type_id(value), "unsupported native type, encoding as none");
    Value::None
}

/// Conversion from a wire [`Value`] into native data.
pub trait Decode: Sized {
    /// Decode a wire value.
    fn decode(value: &Value) -> CodecResult<Self>;
}

fn mismatch(expected: &'static str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

impl Decode for Value {
    fn decode(value: &Value) -> CodecResult<Self> {
        Ok(value.clone())
    }
}

impl Decode for () {
    fn decode(value: &Value) -> CodecResult<Self> {
        match value {
            Value::None => Ok(()),
            other => Err(mismatch("none", other)),
        }
    }
}

impl Decode for String {
    fn decode(value: &Value) -> CodecResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl Decode for bool {
    fn decode(value: &Value) -> CodecResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("boolean", value))
    }
}

macro_rules! decode_integer {
    ($($ty:ty),*) => {
        $(
            impl Decode for $ty {
                fn decode(value: &Value) -> CodecResult<Self> {
                    let raw = value.as_int().ok_or_else(|| mismatch("integer", value))?;
                    <$ty>::try_from(raw).map_err(|_| CodecError::OutOfRange {
                        value: raw,
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

decode_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl<T: Decode> Decode for Option<T> {
    fn decode(value: &Value) -> CodecResult<Self> {
        match value {
            Value::None => Ok(None),
            other => T::decode(other).map(Some),
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(value: &Value) -> CodecResult<Self> {
        value
            .as_list()
            .ok_or_else(|| mismatch("list", value))?
            .iter()
            .map(T::decode)
            .collect()
    }
}

impl<K: Decode + Eq + Hash, V: Decode> Decode for HashMap<K, V> {
    fn decode(value: &Value) -> CodecResult<Self> {
        decode_entries(value).map(|entries| entries.into_iter().collect())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(value: &Value) -> CodecResult<Self> {
        decode_entries(value).map(|entries| entries.into_iter().collect())
    }
}

impl Decode for serde_json::Value {
    // Non-string keys are rendered with their canonical string form. Objects
    // keep wire order; a repeated key keeps its first position and last value.
    fn decode(value: &Value) -> CodecResult<Self> {
        Ok(match value {
            Value::None => serde_json::Value::Null,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(serde_json::Value::decode)
                    .collect::<CodecResult<_>>()?,
            ),
            Value::Map(entries) => {
                let mut map = serde_json::Map::new();
                for entry in entries {
                    let key = match &entry.key {
                        Value::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    map.insert(key, serde_json::Value::decode(&entry.value)?);
                }
                serde_json::Value::Object(map)
            }
        })
    }
}

/// Decode map entries in wire order.
pub fn decode_entries<K: Decode, V: Decode>(value: &Value) -> CodecResult<Vec<(K, V)>> {
    value
        .as_entries()
        .ok_or_else(|| mismatch("map", value))?
        .iter()
        .map(|entry| Ok((K::decode(&entry.key)?, V::decode(&entry.value)?)))
        .collect()
}
