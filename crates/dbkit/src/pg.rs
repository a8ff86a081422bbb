//! tokio-postgres adapter.
//!
//! Implements [`GenericClient`] for `tokio_postgres::Client` and `Transaction`, binds
//! [`Value`] arguments and decodes driver rows into a [`ResultSet`]. Statements are sent
//! with `$n` placeholders.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::placeholder::Placeholder;
use crate::row::{ColumnMeta, ResultSet};
use crate::value::Value;
use bytes::BytesMut;
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => encode_int(*v, ty, out),
            Value::UInt(v) => match i64::try_from(*v) {
                Ok(v) => encode_int(v, ty, out),
                Err(_) => Err(format!("{v} does not fit a signed PostgreSQL integer").into()),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(v) => v.as_str().to_sql(ty, out),
            Value::Bytes(v) => v.as_slice().to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Time(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::TimestampTz(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::List(_) => Err("list arguments must be expanded before binding".into()),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().as_str().to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

/// Raw column bytes for types without a dedicated decoder.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// NUMERIC rendered as its exact decimal text.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode the binary NUMERIC format: base-10000 digit groups with a weight and display scale.
fn decode_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let word = |pos: usize| -> Result<u16, BoxError> {
        raw.get(pos..pos + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric value".into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + i * 2))
        .collect::<Result<Vec<_>, _>>()?;
    let group = |idx: i32| -> u16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&group(0).to_string());
        for idx in 1..=weight {
            text.push_str(&format!("{:04}", group(idx)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, column: &str) -> OrmResult<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| OrmError::decode(column, e.to_string()))
}

fn decode_cell(row: &Row, idx: usize, column: &str, ty: &Type) -> OrmResult<Value> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx, column)?.map(Value::Bool),
        Type::CHAR => get::<i8>(row, idx, column)?.map(|v| Value::Int(v.into())),
        Type::INT2 => get::<i16>(row, idx, column)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx, column)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx, column)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx, column)?.map(|v| Value::UInt(v.into())),
        Type::FLOAT4 => get::<f32>(row, idx, column)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx, column)?.map(Value::Float),
        Type::NUMERIC => get::<NumericText>(row, idx, column)?.map(|v| Value::Text(v.0)),
        Type::BYTEA => get::<Vec<u8>>(row, idx, column)?.map(Value::Bytes),
        Type::DATE => get::<chrono::NaiveDate>(row, idx, column)?.map(Value::Date),
        Type::TIME => get::<chrono::NaiveTime>(row, idx, column)?.map(Value::Time),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx, column)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx, column)?.map(Value::TimestampTz)
        }
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, column)?.map(Value::Json),
        Type::UUID => get::<uuid::Uuid>(row, idx, column)?.map(Value::Uuid),
        _ if <String as FromSql>::accepts(ty) => get::<String>(row, idx, column)?.map(Value::Text),
        _ => get::<RawBytes>(row, idx, column)?.map(|v| Value::Bytes(v.0)),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Buffer driver rows into a [`ResultSet`]. `columns` comes from the prepared statement so
/// an empty result still carries its metadata.
pub fn decode_rows(columns: &[tokio_postgres::Column], rows: &[Row]) -> OrmResult<ResultSet> {
    let mut set = ResultSet::new(
        columns
            .iter()
            .map(|column| ColumnMeta::new(column.name(), column.type_().name())),
    );
    for row in rows {
        let values = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| decode_cell(row, idx, column.name(), column.type_()))
            .collect::<OrmResult<Vec<_>>>()?;
        set.push_row(values)?;
    }
    Ok(set)
}

fn params(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter().map(|arg| arg as &(dyn ToSql + Sync)).collect()
}

macro_rules! impl_generic_client {
    ($($ty:ty),+ $(,)?) => {$(
        impl GenericClient for $ty {
            async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<ResultSet> {
                let statement = self.prepare(sql).await?;
                let rows = <$ty>::query(self, &statement, &params(args)).await?;
                decode_rows(statement.columns(), &rows)
            }

            async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<u64> {
                Ok(<$ty>::execute(self, sql, &params(args)).await?)
            }

            fn placeholder(&self) -> Placeholder {
                Placeholder::Dollar
            }
        }
    )+};
}

impl_generic_client!(tokio_postgres::Client, tokio_postgres::Transaction<'_>);
