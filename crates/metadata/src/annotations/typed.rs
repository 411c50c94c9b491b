//! Typed annotation codec
//!
//! Encodes a closed set of primitive values as `(type tag, string)` pairs and decodes them back
//! without loss. Anything outside the whitelist is rejected instead of being serialized
//! generically.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::str::FromStr;
use uuid::Uuid;

use crate::clr::ScalarType;
use crate::error::{MetadataError, MetadataResult};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// RFC 3339 for years 0 to 9999; other years carry an explicit sign
const DATETIME_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

/// A primitive value that can be stored in a typed annotation
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    TimeSpan(Duration),
    Guid(Uuid),
}

/// The encoded form of a [`TypedValue`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedAnnotation {
    pub type_tag: String,
    pub value: String,
}

macro_rules! downcast_whitelist {
    ($value:expr, $( $ty:ty => $variant:expr ),+ $(,)?) => {
        $(
            if let Some(inner) = $value.downcast_ref::<$ty>() {
                return Ok($variant(inner.clone()));
            }
        )+
    };
}

impl TypedValue {
    /// Convert an arbitrary value, failing for types outside the whitelist
    pub fn from_any<T: Any>(value: &T) -> MetadataResult<Self> {
        let any = value as &dyn Any;

        if let Some(text) = any.downcast_ref::<&'static str>() {
            return Ok(Self::String((*text).to_string()));
        }

        downcast_whitelist!(any,
            bool => Self::Bool,
            char => Self::Char,
            i8 => Self::I8,
            i16 => Self::I16,
            i32 => Self::I32,
            i64 => Self::I64,
            u8 => Self::U8,
            u16 => Self::U16,
            u32 => Self::U32,
            u64 => Self::U64,
            f32 => Self::F32,
            f64 => Self::F64,
            Decimal => Self::Decimal,
            String => Self::String,
            Vec<u8> => Self::Bytes,
            NaiveDateTime => Self::DateTime,
            DateTime<FixedOffset> => Self::DateTimeOffset,
            Duration => Self::TimeSpan,
            Uuid => Self::Guid,
        );

        Err(MetadataError::UnsupportedType {
            type_name: std::any::type_name::<T>().to_string(),
        })
    }

    /// The default value of a value type; `None` for reference types
    pub fn default_for(scalar: ScalarType) -> Option<Self> {
        let value = match scalar {
            ScalarType::Bool => Self::Bool(false),
            ScalarType::Char => Self::Char('\0'),
            ScalarType::I8 => Self::I8(0),
            ScalarType::I16 => Self::I16(0),
            ScalarType::I32 => Self::I32(0),
            ScalarType::I64 => Self::I64(0),
            ScalarType::U8 => Self::U8(0),
            ScalarType::U16 => Self::U16(0),
            ScalarType::U32 => Self::U32(0),
            ScalarType::U64 => Self::U64(0),
            ScalarType::F32 => Self::F32(0.0),
            ScalarType::F64 => Self::F64(0.0),
            ScalarType::Decimal => Self::Decimal(Decimal::ZERO),
            ScalarType::DateTime => Self::DateTime(NaiveDateTime::default()),
            ScalarType::DateTimeOffset => Self::DateTimeOffset(DateTime::<FixedOffset>::default()),
            ScalarType::TimeSpan => Self::TimeSpan(Duration::zero()),
            ScalarType::Guid => Self::Guid(Uuid::nil()),
            ScalarType::String | ScalarType::Bytes => return None,
        };
        Some(value)
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::Char(_) => ScalarType::Char,
            Self::I8(_) => ScalarType::I8,
            Self::I16(_) => ScalarType::I16,
            Self::I32(_) => ScalarType::I32,
            Self::I64(_) => ScalarType::I64,
            Self::U8(_) => ScalarType::U8,
            Self::U16(_) => ScalarType::U16,
            Self::U32(_) => ScalarType::U32,
            Self::U64(_) => ScalarType::U64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
            Self::Decimal(_) => ScalarType::Decimal,
            Self::String(_) => ScalarType::String,
            Self::Bytes(_) => ScalarType::Bytes,
            Self::DateTime(_) => ScalarType::DateTime,
            Self::DateTimeOffset(_) => ScalarType::DateTimeOffset,
            Self::TimeSpan(_) => ScalarType::TimeSpan,
            Self::Guid(_) => ScalarType::Guid,
        }
    }

    /// Encode to a type tag and value string
    pub fn encode(&self) -> TypedAnnotation {
        let value = match self {
            Self::Bool(value) => value.to_string(),
            Self::Char(value) => value.to_string(),
            Self::I8(value) => value.to_string(),
            Self::I16(value) => value.to_string(),
            Self::I32(value) => value.to_string(),
            Self::I64(value) => value.to_string(),
            Self::U8(value) => value.to_string(),
            Self::U16(value) => value.to_string(),
            Self::U32(value) => value.to_string(),
            Self::U64(value) => value.to_string(),
            // Display prints the shortest string that parses back to the same bits
            Self::F32(value) => value.to_string(),
            Self::F64(value) => value.to_string(),
            Self::Decimal(value) => value.to_string(),
            Self::String(value) => value.clone(),
            Self::Bytes(value) => BASE64.encode(value),
            Self::DateTime(value) => value.format(DATETIME_FORMAT).to_string(),
            Self::DateTimeOffset(value) => value.format(DATETIME_OFFSET_FORMAT).to_string(),
            Self::TimeSpan(value) => format!("{}:{}", value.num_seconds(), value.subsec_nanos()),
            Self::Guid(value) => value.hyphenated().to_string(),
        };

        TypedAnnotation {
            type_tag: self.scalar_type().tag().to_string(),
            value,
        }
    }
}

impl TypedAnnotation {
    pub fn new(type_tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }

    /// Decode back into the original value
    pub fn decode(&self) -> MetadataResult<TypedValue> {
        let scalar = ScalarType::from_tag(&self.type_tag).ok_or_else(|| MetadataError::UnsupportedType {
            type_name: self.type_tag.clone(),
        })?;
        let raw = self.value.as_str();

        let value = match scalar {
            ScalarType::Bool => TypedValue::Bool(self.parse(raw)?),
            ScalarType::Char => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => TypedValue::Char(c),
                    _ => return Err(self.invalid("expected exactly one character")),
                }
            }
            ScalarType::I8 => TypedValue::I8(self.parse(raw)?),
            ScalarType::I16 => TypedValue::I16(self.parse(raw)?),
            ScalarType::I32 => TypedValue::I32(self.parse(raw)?),
            ScalarType::I64 => TypedValue::I64(self.parse(raw)?),
            ScalarType::U8 => TypedValue::U8(self.parse(raw)?),
            ScalarType::U16 => TypedValue::U16(self.parse(raw)?),
            ScalarType::U32 => TypedValue::U32(self.parse(raw)?),
            ScalarType::U64 => TypedValue::U64(self.parse(raw)?),
            ScalarType::F32 => TypedValue::F32(self.parse(raw)?),
            ScalarType::F64 => TypedValue::F64(self.parse(raw)?),
            ScalarType::Decimal => TypedValue::Decimal(self.parse(raw)?),
            ScalarType::String => TypedValue::String(raw.to_string()),
            ScalarType::Bytes => TypedValue::Bytes(
                BASE64
                    .decode(raw)
                    .map_err(|e| self.invalid(e))?,
            ),
            ScalarType::DateTime => TypedValue::DateTime(
                NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT).map_err(|e| self.invalid(e))?,
            ),
            ScalarType::DateTimeOffset => TypedValue::DateTimeOffset(
                DateTime::parse_from_str(raw, DATETIME_OFFSET_FORMAT).map_err(|e| self.invalid(e))?,
            ),
            ScalarType::TimeSpan => TypedValue::TimeSpan(self.decode_time_span(raw)?),
            ScalarType::Guid => TypedValue::Guid(self.parse(raw)?),
        };

        Ok(value)
    }

    fn decode_time_span(&self, raw: &str) -> MetadataResult<Duration> {
        let (seconds, nanos) = raw
            .split_once(':')
            .ok_or_else(|| self.invalid("expected '<seconds>:<nanoseconds>'"))?;
        let seconds: i64 = self.parse(seconds)?;
        let nanos: i32 = self.parse(nanos)?;

        Duration::try_seconds(seconds)
            .and_then(|whole| whole.checked_add(&Duration::nanoseconds(i64::from(nanos))))
            .ok_or_else(|| self.invalid("duration out of range"))
    }

    fn parse<T>(&self, raw: &str) -> MetadataResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| self.invalid(e))
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> MetadataError {
        MetadataError::InvalidAnnotationValue {
            type_tag: self.type_tag.clone(),
            value: self.value.clone(),
            reason: reason.to_string(),
        }
    }
}

impl From<&TypedValue> for TypedAnnotation {
    fn from(value: &TypedValue) -> Self {
        value.encode()
    }
}

macro_rules! typed_value_from {
    ($( $ty:ty => $variant:ident ),+ $(,)?) => {
        $(
            impl From<$ty> for TypedValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

typed_value_from!(
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    Duration => TimeSpan,
    Uuid => Guid,
);

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}
