//! Type conversion registry.
//!
//! Maps `(field type, column db type)` to a function that writes a [`Value`] into a field.
//! Lookups try the exact normalized db type first, then the type-only entry.
//!
//! ```ignore
//! let registry = ConversionRegistry::new();
//! registry.register::<Money, _>(|v| Money::parse(&v.to_string()).map_err(ConvertError::new));
//! ```

use crate::row::normalize_db_type;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// A failed value conversion. Context (column, field) is added by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConvertError {
    message: String,
}

impl ConvertError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unsupported(value: &Value, target: &str) -> Self {
        Self::new(format!("cannot convert {} into {}", value.kind(), target))
    }

    pub(crate) fn destination<T>() -> Self {
        Self::new(format!("destination is not a `{}`", type_name::<T>()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Type-erased conversion into a field.
pub type ConvertFn = Arc<dyn Fn(&Value, &mut dyn Any) -> Result<(), ConvertError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConverterKey {
    type_id: TypeId,
    db_type: Option<String>,
}

/// Thread-safe registry of field conversions.
pub struct ConversionRegistry {
    converters: RwLock<HashMap<ConverterKey, ConvertFn>>,
}

impl std::fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionRegistry {
    /// A registry with the built-in scalar, temporal, uuid and JSON conversions.
    pub fn new() -> Self {
        let registry = Self::empty();
        builtin::install(&registry);
        registry
    }

    /// A registry with no conversions at all.
    pub fn empty() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// Register a conversion for `T` (and `Option<T>`) from any db type.
    pub fn register<T, F>(&self, convert: F)
    where
        T: 'static,
        F: Fn(&Value) -> Result<T, ConvertError> + Send + Sync + 'static,
    {
        self.insert(None, convert);
    }

    /// Register a conversion for `T` (and `Option<T>`) from one db type only.
    ///
    /// The db type is normalized, so `"DECIMAL(10,2)"` registers for `decimal`.
    pub fn register_for<T, F>(&self, db_type: &str, convert: F)
    where
        T: 'static,
        F: Fn(&Value) -> Result<T, ConvertError> + Send + Sync + 'static,
    {
        self.insert(Some(normalize_db_type(db_type)), convert);
    }

    fn insert<T, F>(&self, db_type: Option<String>, convert: F)
    where
        T: 'static,
        F: Fn(&Value) -> Result<T, ConvertError> + Send + Sync + 'static,
    {
        let convert = Arc::new(convert);
        let plain = Arc::clone(&convert);
        let direct: ConvertFn = Arc::new(
            move |value: &Value, field: &mut dyn Any| -> Result<(), ConvertError> {
                let slot = field
                    .downcast_mut::<T>()
                    .ok_or_else(ConvertError::destination::<T>)?;
                *slot = plain(value)?;
                Ok(())
            },
        );
        let optional: ConvertFn = Arc::new(
            move |value: &Value, field: &mut dyn Any| -> Result<(), ConvertError> {
                let slot = field
                    .downcast_mut::<Option<T>>()
                    .ok_or_else(ConvertError::destination::<Option<T>>)?;
                *slot = Some(convert(value)?);
                Ok(())
            },
        );

        let mut converters = self
            .converters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        converters.insert(
            ConverterKey {
                type_id: TypeId::of::<T>(),
                db_type: db_type.clone(),
            },
            direct,
        );
        converters.insert(
            ConverterKey {
                type_id: TypeId::of::<Option<T>>(),
                db_type,
            },
            optional,
        );
    }

    /// Find the conversion for a field type and a (raw or normalized) column db type.
    pub fn resolve(&self, type_id: TypeId, db_type: &str) -> Option<ConvertFn> {
        let converters = self
            .converters
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let exact = ConverterKey {
            type_id,
            db_type: Some(normalize_db_type(db_type)),
        };
        converters
            .get(&exact)
            .or_else(|| {
                converters.get(&ConverterKey {
                    type_id,
                    db_type: None,
                })
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.converters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod builtin {
    use super::*;

    pub(super) fn install(registry: &ConversionRegistry) {
        macro_rules! integers {
            ($($t:ty),+) => {
                $(
                    registry.register::<$t, _>(|v| narrow(to_i128(v)?));
                    registry.register_for::<$t, _>("bit", |v| narrow(bit_or_int(v)?));
                )+
            };
        }
        integers!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

        registry.register::<f64, _>(to_f64);
        registry.register::<f32, _>(|v| to_f64(v).map(|f| f as f32));
        registry.register::<bool, _>(to_bool);
        registry.register_for::<bool, _>("bit", |v| bit_or_int(v).map(|n| n != 0));
        registry.register::<String, _>(to_text);
        registry.register::<Vec<u8>, _>(to_bytes);
        registry.register::<NaiveDate, _>(to_date);
        registry.register::<NaiveTime, _>(to_time);
        registry.register::<NaiveDateTime, _>(to_naive_datetime);
        registry.register::<DateTime<Utc>, _>(|v| to_naive_datetime(v).map(|ts| ts.and_utc()));
        registry.register::<Uuid, _>(to_uuid);
        registry.register::<serde_json::Value, _>(to_json);
        registry.register::<Value, _>(|v| Ok(v.clone()));

        #[cfg(feature = "rust_decimal")]
        registry.register::<rust_decimal::Decimal, _>(to_decimal);
    }

    fn narrow<T: TryFrom<i128>>(n: i128) -> Result<T, ConvertError> {
        T::try_from(n)
            .map_err(|_| ConvertError::new(format!("{n} is out of range for {}", type_name::<T>())))
    }

    fn parse_integer(text: &str) -> Result<i128, ConvertError> {
        let text = text.trim();
        if let Ok(n) = text.parse::<i128>() {
            return Ok(n);
        }
        // decimal/numeric text such as "12.00"
        let f = text
            .parse::<f64>()
            .map_err(|_| ConvertError::new(format!("invalid integer '{text}'")))?;
        float_to_i128(f)
    }

    /// Truncate toward zero. NaN, infinities and values past `i128` are errors.
    fn float_to_i128(f: f64) -> Result<i128, ConvertError> {
        let whole = f.trunc();
        if !whole.is_finite() || whole < i128::MIN as f64 || whole >= i128::MAX as f64 {
            return Err(ConvertError::new(format!("{f} is not a representable integer")));
        }
        Ok(whole as i128)
    }

    pub(super) fn to_i128(value: &Value) -> Result<i128, ConvertError> {
        match value {
            Value::Int(n) => Ok(i128::from(*n)),
            Value::UInt(n) => Ok(i128::from(*n)),
            Value::Bool(b) => Ok(i128::from(*b)),
            Value::Float(f) => float_to_i128(*f),
            Value::Text(s) => parse_integer(s),
            Value::Bytes(b) => parse_integer(&String::from_utf8_lossy(b)),
            other => Err(ConvertError::unsupported(other, "integer")),
        }
    }

    /// `bit` columns arrive as big-endian bytes.
    pub(super) fn bit_or_int(value: &Value) -> Result<i128, ConvertError> {
        match value {
            Value::Bytes(bytes) => {
                if bytes.len() > 16 {
                    return Err(ConvertError::new(format!(
                        "bit value of {} bytes does not fit an integer",
                        bytes.len()
                    )));
                }
                Ok(bytes
                    .iter()
                    .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)) as i128)
            }
            other => to_i128(other),
        }
    }

    pub(super) fn to_f64(value: &Value) -> Result<f64, ConvertError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(n) => Ok(*n as f64),
            Value::UInt(n) => Ok(*n as f64),
            Value::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ConvertError::new(format!("invalid float '{s}'"))),
            Value::Bytes(b) => to_f64(&Value::Text(String::from_utf8_lossy(b).into_owned())),
            other => Err(ConvertError::unsupported(other, "float")),
        }
    }

    pub(super) fn to_bool(value: &Value) -> Result<bool, ConvertError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            Value::UInt(n) => Ok(*n != 0),
            Value::Float(f) => Ok(*f != 0.0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" | "on" => Ok(true),
                "" | "0" | "f" | "false" | "n" | "no" | "off" => Ok(false),
                _ => Err(ConvertError::new(format!("invalid boolean '{s}'"))),
            },
            Value::Bytes(b) => Ok(b.iter().any(|byte| *byte != 0)),
            other => Err(ConvertError::unsupported(other, "bool")),
        }
    }

    fn to_text(value: &Value) -> Result<String, ConvertError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::List(_) => Err(ConvertError::unsupported(value, "String")),
            other => Ok(other.to_string()),
        }
    }

    fn to_bytes(value: &Value) -> Result<Vec<u8>, ConvertError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            Value::Json(json) => {
                serde_json::to_vec(json).map_err(|e| ConvertError::new(e.to_string()))
            }
            other => Err(ConvertError::unsupported(other, "bytes")),
        }
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    fn parse_naive_datetime(text: &str) -> Result<NaiveDateTime, ConvertError> {
        let text = text.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Ok(ts.naive_utc());
        }
        for format in DATETIME_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
                return Ok(ts);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Ok(date.and_time(NaiveTime::MIN));
        }
        Err(ConvertError::new(format!("invalid timestamp '{text}'")))
    }

    fn from_unix(secs: i64) -> Result<NaiveDateTime, ConvertError> {
        DateTime::from_timestamp(secs, 0)
            .map(|ts| ts.naive_utc())
            .ok_or_else(|| ConvertError::new(format!("unix time {secs} is out of range")))
    }

    pub(super) fn to_naive_datetime(value: &Value) -> Result<NaiveDateTime, ConvertError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::TimestampTz(ts) => Ok(ts.naive_utc()),
            Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            Value::Int(secs) => from_unix(*secs),
            Value::UInt(secs) => from_unix(
                i64::try_from(*secs).map_err(|_| ConvertError::new("unix time out of range"))?,
            ),
            Value::Text(s) => parse_naive_datetime(s),
            Value::Bytes(b) => parse_naive_datetime(&String::from_utf8_lossy(b)),
            other => Err(ConvertError::unsupported(other, "timestamp")),
        }
    }

    fn to_date(value: &Value) -> Result<NaiveDate, ConvertError> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .or_else(|_| parse_naive_datetime(s).map(|ts| ts.date())),
            other => to_naive_datetime(other).map(|ts| ts.date()),
        }
    }

    fn to_time(value: &Value) -> Result<NaiveTime, ConvertError> {
        match value {
            Value::Time(t) => Ok(*t),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .or_else(|_| parse_naive_datetime(s).map(|ts| ts.time())),
            other => to_naive_datetime(other).map(|ts| ts.time()),
        }
    }

    fn to_uuid(value: &Value) -> Result<Uuid, ConvertError> {
        match value {
            Value::Uuid(id) => Ok(*id),
            Value::Text(s) => {
                Uuid::parse_str(s.trim()).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::Bytes(b) if b.len() == 16 => {
                Uuid::from_slice(b).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::Bytes(b) => {
                Uuid::try_parse_ascii(b).map_err(|e| ConvertError::new(e.to_string()))
            }
            other => Err(ConvertError::unsupported(other, "uuid")),
        }
    }

    fn to_json(value: &Value) -> Result<serde_json::Value, ConvertError> {
        match value {
            Value::Json(json) => Ok(json.clone()),
            Value::Text(s) => {
                serde_json::from_str(s).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::Bytes(b) => {
                serde_json::from_slice(b).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(n) => Ok(serde_json::Value::from(*n)),
            Value::UInt(n) => Ok(serde_json::Value::from(*n)),
            Value::Float(f) => Ok(serde_json::Value::from(*f)),
            Value::List(items) => items
                .iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            other => Ok(serde_json::Value::String(other.to_string())),
        }
    }

    #[cfg(feature = "rust_decimal")]
    fn to_decimal(value: &Value) -> Result<rust_decimal::Decimal, ConvertError> {
        use rust_decimal::Decimal;
        use std::str::FromStr;

        match value {
            Value::Int(n) => Ok(Decimal::from(*n)),
            Value::UInt(n) => Ok(Decimal::from(*n)),
            Value::Float(f) => {
                Decimal::try_from(*f).map_err(|e| ConvertError::new(e.to_string()))
            }
            Value::Text(s) => {
                Decimal::from_str(s.trim()).map_err(|e| ConvertError::new(e.to_string()))
            }
            other => Err(ConvertError::unsupported(other, "decimal")),
        }
    }
}

#[cfg(test)]
mod tests;
