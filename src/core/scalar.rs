// This module implements the built-in primitive conversion table. Every primitive member type
// (bool, char, the fixed-width and pointer-sized integers, f32, f64 and String) is tagged with a
// Primitive, which knows how to read an erased reference into a Scalar and how to write a Scalar
// back as an owned value of its own type. A conversion between two primitives is therefore a
// read followed by a write, with range checks on narrowing, parsing when the source is text,
// and Display formatting when the target is text. Failures are reported as ScalarFault and
// surface to callers as runtime MapError::Conversion faults.

//! Primitive conversion table.

use std::any::Any;

use thiserror::Error;

use super::types::Value;

/// Primitive member types known to the conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Text,
}

/// Intermediate form of a primitive value during conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(char),
    Int(i128),
    Float(f64),
    /// Kept apart from `Float` so text formatting keeps `f32` precision.
    Float32(f32),
    Text(String),
}

/// Why a primitive conversion failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScalarFault {
    /// The value does not fit the target type.
    #[error("{value} is out of range for {}", .target.name())]
    OutOfRange { value: String, target: Primitive },

    /// Text could not be parsed as the target type.
    #[error("cannot parse {text:?} as {}", .target.name())]
    Parse { text: String, target: Primitive },

    /// No conversion exists between these scalar kinds.
    #[error("cannot convert {value} to {}", .target.name())]
    Unsupported { value: String, target: Primitive },
}

impl Scalar {
    fn describe(&self) -> String {
        match self {
            Scalar::Text(text) => format!("{text:?}"),
            other => other.to_text(),
        }
    }

    /// Display form used when converting to `String`.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(value) => value.to_string(),
            Scalar::Char(value) => value.to_string(),
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Float32(value) => value.to_string(),
            Scalar::Text(value) => value.clone(),
        }
    }

    /// Integral form, used for integer targets and enum underlying values.
    pub fn to_int(&self, target: Primitive) -> Result<i128, ScalarFault> {
        match self {
            Scalar::Bool(value) => Ok(i128::from(*value)),
            Scalar::Char(value) => Ok(i128::from(u32::from(*value))),
            Scalar::Int(value) => Ok(*value),
            Scalar::Float(value) => float_to_int(*value, target),
            Scalar::Float32(value) => float_to_int(f64::from(*value), target),
            Scalar::Text(text) => text.trim().parse::<i128>().map_err(|_| ScalarFault::Parse {
                text: text.clone(),
                target,
            }),
        }
    }

    fn to_float(&self, target: Primitive) -> Result<f64, ScalarFault> {
        match self {
            Scalar::Bool(value) => Ok(if *value { 1.0 } else { 0.0 }),
            Scalar::Int(value) => Ok(*value as f64),
            Scalar::Float(value) => Ok(*value),
            Scalar::Float32(value) => Ok(f64::from(*value)),
            Scalar::Text(text) => text.trim().parse::<f64>().map_err(|_| ScalarFault::Parse {
                text: text.clone(),
                target,
            }),
            Scalar::Char(_) => Err(ScalarFault::Unsupported {
                value: self.describe(),
                target,
            }),
        }
    }

    fn to_bool(&self, target: Primitive) -> Result<bool, ScalarFault> {
        match self {
            Scalar::Bool(value) => Ok(*value),
            Scalar::Int(value) => Ok(*value != 0),
            Scalar::Float(value) => Ok(*value != 0.0),
            Scalar::Float32(value) => Ok(*value != 0.0),
            Scalar::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ScalarFault::Parse {
                    text: text.clone(),
                    target,
                }),
            },
            Scalar::Char(_) => Err(ScalarFault::Unsupported {
                value: self.describe(),
                target,
            }),
        }
    }

    fn to_char(&self, target: Primitive) -> Result<char, ScalarFault> {
        match self {
            Scalar::Char(value) => Ok(*value),
            Scalar::Int(value) => u32::try_from(*value)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| ScalarFault::OutOfRange {
                    value: value.to_string(),
                    target,
                }),
            Scalar::Text(text) => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(value), None) => Ok(value),
                    _ => Err(ScalarFault::Parse {
                        text: text.clone(),
                        target,
                    }),
                }
            }
            _ => Err(ScalarFault::Unsupported {
                value: self.describe(),
                target,
            }),
        }
    }
}

fn float_to_int(value: f64, target: Primitive) -> Result<i128, ScalarFault> {
    // Bounds are exclusive so that the truncated value always fits i128.
    if !value.is_finite() || value <= i128::MIN as f64 || value >= i128::MAX as f64 {
        return Err(ScalarFault::OutOfRange {
            value: value.to_string(),
            target,
        });
    }
    Ok(value.trunc() as i128)
}

macro_rules! narrow_int {
    ($scalar:expr, $target:expr, $ty:ty) => {{
        let wide = $scalar.to_int($target)?;
        <$ty>::try_from(wide)
            .map(|value| Box::new(value) as Value)
            .map_err(|_| ScalarFault::OutOfRange {
                value: wide.to_string(),
                target: $target,
            })
    }};
}

macro_rules! read_as {
    ($value:expr, $ty:ty, $wrap:expr) => {
        $value.downcast_ref::<$ty>().map(|value| $wrap(value.clone()))
    };
}

impl Primitive {
    /// Rust name of the primitive type.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::Isize => "isize",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::Usize => "usize",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Text => "String",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Primitive::Bool | Primitive::Char | Primitive::Text)
    }

    pub fn is_integral(self) -> bool {
        self.is_numeric() && !matches!(self, Primitive::F32 | Primitive::F64)
    }

    /// Whether the table has a path from `self` to `target`. A path can still
    /// fault at run time on range or parse errors.
    pub fn converts_to(self, target: Primitive) -> bool {
        match (self, target) {
            (Primitive::Char, Primitive::Bool | Primitive::F32 | Primitive::F64) => false,
            (Primitive::Bool | Primitive::F32 | Primitive::F64, Primitive::Char) => false,
            _ => true,
        }
    }

    /// Read an erased reference of this primitive type.
    pub fn read(self, value: &dyn Any) -> Option<Scalar> {
        match self {
            Primitive::Bool => read_as!(value, bool, Scalar::Bool),
            Primitive::Char => read_as!(value, char, Scalar::Char),
            Primitive::I8 => read_as!(value, i8, |v| Scalar::Int(i128::from(v))),
            Primitive::I16 => read_as!(value, i16, |v| Scalar::Int(i128::from(v))),
            Primitive::I32 => read_as!(value, i32, |v| Scalar::Int(i128::from(v))),
            Primitive::I64 => read_as!(value, i64, |v| Scalar::Int(i128::from(v))),
            Primitive::Isize => read_as!(value, isize, |v| Scalar::Int(v as i128)),
            Primitive::U8 => read_as!(value, u8, |v| Scalar::Int(i128::from(v))),
            Primitive::U16 => read_as!(value, u16, |v| Scalar::Int(i128::from(v))),
            Primitive::U32 => read_as!(value, u32, |v| Scalar::Int(i128::from(v))),
            Primitive::U64 => read_as!(value, u64, |v| Scalar::Int(i128::from(v))),
            Primitive::Usize => read_as!(value, usize, |v| Scalar::Int(v as i128)),
            Primitive::F32 => read_as!(value, f32, Scalar::Float32),
            Primitive::F64 => read_as!(value, f64, Scalar::Float),
            Primitive::Text => read_as!(value, String, Scalar::Text),
        }
    }

    /// Write a scalar as an owned value of this primitive type.
    pub fn write(self, scalar: Scalar) -> Result<Value, ScalarFault> {
        match self {
            Primitive::Bool => Ok(Box::new(scalar.to_bool(self)?)),
            Primitive::Char => Ok(Box::new(scalar.to_char(self)?)),
            Primitive::I8 => narrow_int!(scalar, self, i8),
            Primitive::I16 => narrow_int!(scalar, self, i16),
            Primitive::I32 => narrow_int!(scalar, self, i32),
            Primitive::I64 => narrow_int!(scalar, self, i64),
            Primitive::Isize => narrow_int!(scalar, self, isize),
            Primitive::U8 => narrow_int!(scalar, self, u8),
            Primitive::U16 => narrow_int!(scalar, self, u16),
            Primitive::U32 => narrow_int!(scalar, self, u32),
            Primitive::U64 => narrow_int!(scalar, self, u64),
            Primitive::Usize => narrow_int!(scalar, self, usize),
            Primitive::F32 => {
                let wide = scalar.to_float(self)?;
                let narrow = wide as f32;
                if wide.is_finite() && !narrow.is_finite() {
                    return Err(ScalarFault::OutOfRange {
                        value: wide.to_string(),
                        target: self,
                    });
                }
                Ok(Box::new(narrow))
            }
            Primitive::F64 => Ok(Box::new(scalar.to_float(self)?)),
            Primitive::Text => Ok(Box::new(scalar.to_text())),
        }
    }

    /// Convert an erased value of primitive `from` into primitive `self`.
    pub fn cast_from(self, from: Primitive, value: &dyn Any) -> Result<Option<Value>, ScalarFault> {
        match from.read(value) {
            Some(scalar) => self.write(scalar).map(Some),
            None => Ok(None),
        }
    }
}
