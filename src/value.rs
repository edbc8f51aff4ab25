use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Column type as seen by sinks. Every column is nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Boolean,
    Int,
    UInt,
    Float,
    Text,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Int => "int",
            ScalarType::UInt => "uint",
            ScalarType::Float => "float",
            ScalarType::Text => "text",
        };
        f.write_str(name)
    }
}

/// One cell of a flattened row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// A Rust type that occupies exactly one column.
pub trait Scalar: Sized + Send + Sync + 'static {
    const TYPE: ScalarType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, ValueError>;
}

fn mismatch(expected: ScalarType, found: &Value) -> ValueError {
    match found {
        Value::Null => ValueError::UnexpectedNull { expected },
        other => ValueError::TypeMismatch {
            expected,
            found: other.kind(),
        },
    }
}

impl Scalar for String {
    const TYPE: ScalarType = ScalarType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl Scalar for bool {
    const TYPE: ScalarType = ScalarType::Boolean;

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Boolean(v) => Ok(v),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

macro_rules! signed_scalar {
    ($($ty:ty),*) => {$(
        impl Scalar for $ty {
            const TYPE: ScalarType = ScalarType::Int;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                let wide = match value {
                    Value::Int(v) => v,
                    Value::UInt(v) => i64::try_from(v).map_err(|_| ValueError::OutOfRange {
                        value: v.to_string(),
                        target: stringify!($ty),
                    })?,
                    other => return Err(mismatch(Self::TYPE, &other)),
                };
                <$ty>::try_from(wide).map_err(|_| ValueError::OutOfRange {
                    value: wide.to_string(),
                    target: stringify!($ty),
                })
            }
        }
    )*};
}

macro_rules! unsigned_scalar {
    ($($ty:ty),*) => {$(
        impl Scalar for $ty {
            const TYPE: ScalarType = ScalarType::UInt;

            fn to_value(&self) -> Value {
                Value::UInt(u64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self, ValueError> {
                let wide = match value {
                    Value::UInt(v) => v,
                    Value::Int(v) => u64::try_from(v).map_err(|_| ValueError::OutOfRange {
                        value: v.to_string(),
                        target: stringify!($ty),
                    })?,
                    other => return Err(mismatch(Self::TYPE, &other)),
                };
                <$ty>::try_from(wide).map_err(|_| ValueError::OutOfRange {
                    value: wide.to_string(),
                    target: stringify!($ty),
                })
            }
        }
    )*};
}

signed_scalar!(i8, i16, i32, i64);
unsigned_scalar!(u8, u16, u32, u64);

/// Largest integer magnitude an `f64` holds exactly.
const MAX_EXACT_INT: u64 = 1 << 53;

impl Scalar for f64 {
    const TYPE: ScalarType = ScalarType::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) if v.unsigned_abs() <= MAX_EXACT_INT => Ok(v as f64),
            Value::UInt(v) if v <= MAX_EXACT_INT => Ok(v as f64),
            Value::Int(v) => Err(ValueError::OutOfRange {
                value: v.to_string(),
                target: "f64",
            }),
            Value::UInt(v) => Err(ValueError::OutOfRange {
                value: v.to_string(),
                target: "f64",
            }),
            other => Err(mismatch(Self::TYPE, &other)),
        }
    }
}

impl Scalar for f32 {
    const TYPE: ScalarType = ScalarType::Float;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        let wide = f64::from_value(value)?;
        let narrow = wide as f32;
        if wide.is_finite() && !narrow.is_finite() {
            return Err(ValueError::OutOfRange {
                value: wide.to_string(),
                target: "f32",
            });
        }
        Ok(narrow)
    }
}

impl<S: Scalar> Scalar for Option<S> {
    const TYPE: ScalarType = S::TYPE;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => S::from_value(other).map(Some),
        }
    }
}
