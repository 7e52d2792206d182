//! Core protocol types: player identity and the scalar wire values.
//!
//! Every frame on the wire is a flat, ordered list of [`Value`]s. There is
//! no nesting: maps, lists and records travel as JSON text inside a single
//! [`Value::String`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "json")]
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The identifier of a player account.
///
/// Player ids are opaque strings issued by the account layer. They are
/// embedded verbatim in task identities (`BLD-CREATE-b1-p1`), so `Display`
/// prints the raw id with no decoration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wraps a raw player id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One scalar on the wire.
///
/// The variant decides the pattern byte the encoder writes. Note that
/// small non-negative `Int` and `UInt` values share the compact
/// `UIntShort` form and always decode as [`Value::Int`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl Value {
    /// Serializes a composite into its JSON text form.
    ///
    /// This is the only way maps, lists and records reach the wire.
    ///
    /// # Errors
    /// Returns [`ProtocolError::UnsupportedValueType`] if serde cannot
    /// represent the value as JSON (e.g. a map with non-string keys).
    #[cfg(feature = "json")]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ProtocolError> {
        serde_json::to_string(value)
            .map(Value::String)
            .map_err(|e| ProtocolError::UnsupportedValueType(e.to_string()))
    }

    /// A short name for the variant, used in logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Long(_) => "long",
            Value::ULong(_) => "ulong",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(i64::from(v)),
            Value::UInt(v) => Some(i64::from(v)),
            Value::Long(v) => Some(v),
            Value::ULong(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Any numeric variant as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(f64::from(v)),
            Value::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::ULong(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    String => String,
    &str => String,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    bool => Bool,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
}

impl From<&PlayerId> for Value {
    fn from(id: &PlayerId) -> Self {
        Value::String(id.0.clone())
    }
}

/// Scalars map onto the closest wire type; composites are rejected.
#[cfg(feature = "json")]
impl TryFrom<serde_json::Value> for Value {
    type Error = ProtocolError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as Json;
        match value {
            Json::Bool(b) => Ok(Value::Bool(b)),
            Json::String(s) => Ok(Value::String(s)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i32::try_from(i).map_or(Value::Long(i), Value::Int))
                } else if let Some(u) = n.as_u64() {
                    Ok(Value::ULong(u))
                } else {
                    n.as_f64().map(Value::Double).ok_or_else(|| {
                        ProtocolError::UnsupportedValueType(format!("number {n}"))
                    })
                }
            }
            Json::Null => Err(ProtocolError::UnsupportedValueType("null".into())),
            Json::Array(_) => Err(ProtocolError::UnsupportedValueType(
                "array (flatten with Value::json)".into(),
            )),
            Json::Object(_) => Err(ProtocolError::UnsupportedValueType(
                "object (flatten with Value::json)".into(),
            )),
        }
    }
}
