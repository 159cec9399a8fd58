// Untyped argument values carried by published messages
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural type of a message argument.
///
/// Schemas and callback signatures are compared by these descriptors, so two
/// Rust types that marshal into the same variant (`i32` and `i64`) are
/// interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Bool,
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "string")]
    Str,
    Bytes,
    Json,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Bool => "bool",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Str => "str",
            ArgType::Bytes => "bytes",
            ArgType::Json => "json",
        };
        f.write_str(name)
    }
}

/// A single positional argument of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Value::Bool(_) => ArgType::Bool,
            Value::Int(_) => ArgType::Int,
            Value::Float(_) => ArgType::Float,
            Value::Str(_) => ArgType::Str,
            Value::Bytes(_) => ArgType::Bytes,
            Value::Json(_) => ArgType::Json,
        }
    }
}

/// Structural types of an argument list, in order.
pub fn types_of(args: &[Value]) -> Vec<ArgType> {
    args.iter().map(Value::arg_type).collect()
}

/// Formats a type list as `(str, int)` for diagnostics.
pub fn describe(types: &[ArgType]) -> String {
    let inner: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("({})", inner.join(", "))
}

macro_rules! value_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

value_from!(Bool: bool);
value_from!(Int: i8, i16, i32, i64, u8, u16, u32);
value_from!(Float: f32, f64);
value_from!(Str: String, &str);
value_from!(Bytes: Vec<u8>, &[u8]);
value_from!(Json: serde_json::Value);

/// A Rust type a callback parameter can be unmarshalled into.
pub trait Arg: Sized + Send + 'static {
    /// Structural type this parameter accepts.
    const TYPE: ArgType;

    /// Converts a delivered value, or `None` if it has a different shape.
    fn from_value(value: Value) -> Option<Self>;
}

impl Arg for bool {
    const TYPE: ArgType = ArgType::Bool;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

macro_rules! int_arg {
    ($($ty:ty),+) => {
        $(
            impl Arg for $ty {
                const TYPE: ArgType = ArgType::Int;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::Int(i) => <$ty>::try_from(i).ok(),
                        _ => None,
                    }
                }
            }
        )+
    };
}

int_arg!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl Arg for f64 {
    const TYPE: ArgType = ArgType::Float;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl Arg for f32 {
    const TYPE: ArgType = ArgType::Float;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float(f) => {
                let narrowed = f as f32;
                // finite values outside the f32 range overflow to infinity
                if f.is_finite() && !narrowed.is_finite() {
                    None
                } else {
                    Some(narrowed)
                }
            }
            _ => None,
        }
    }
}

impl Arg for String {
    const TYPE: ArgType = ArgType::Str;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Arg for Vec<u8> {
    const TYPE: ArgType = ArgType::Bytes;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl Arg for serde_json::Value {
    const TYPE: ArgType = ArgType::Json;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }
}

/// Anything that can be posted as a message payload.
///
/// Implemented for `Vec<Value>`, `()` and tuples of up to six values
/// convertible into [`Value`], so `bus.post("hello", ("foo", 12))` works.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Value>;
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Vec<Value> {
        self
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! tuple_args {
    ($($name:ident),+) => {
        impl<$($name),+> IntoArgs for ($($name,)+)
        where
            $($name: Into<Value>),+
        {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);
tuple_args!(A, B, C, D, E);
tuple_args!(A, B, C, D, E, F);
