use super::*;
use chrono::NaiveDate;

fn convert_into<T: Default + 'static>(
    registry: &ConversionRegistry,
    db_type: &str,
    value: Value,
) -> Result<T, ConvertError> {
    let convert = registry
        .resolve(TypeId::of::<T>(), db_type)
        .expect("converter registered");
    let mut slot = T::default();
    convert(&value, &mut slot)?;
    Ok(slot)
}

#[test]
fn test_integer_narrowing() {
    let registry = ConversionRegistry::new();
    assert_eq!(convert_into::<i32>(&registry, "int4", Value::Int(42)).unwrap(), 42);
    assert_eq!(convert_into::<u8>(&registry, "int", Value::Text(" 7 ".into())).unwrap(), 7);

    let err = convert_into::<i8>(&registry, "int", Value::Int(300)).unwrap_err();
    assert!(err.message().contains("out of range"));
}

#[test]
fn test_decimal_text_into_integer() {
    let registry = ConversionRegistry::new();
    let n: i64 = convert_into(&registry, "DECIMAL(10,2)", Value::Text("12.75".into())).unwrap();
    assert_eq!(n, 12);
}

#[test]
fn test_non_finite_floats_are_not_integers() {
    let registry = ConversionRegistry::new();
    for value in [
        Value::Float(f64::NAN),
        Value::Float(f64::INFINITY),
        Value::Float(f64::NEG_INFINITY),
        Value::Float(1e40),
        Value::Text("NaN".into()),
        Value::Text("inf".into()),
    ] {
        let err = convert_into::<i64>(&registry, "float8", value.clone()).unwrap_err();
        assert!(err.message().contains("not a representable integer"), "{value:?}");
    }
    let n: i64 = convert_into(&registry, "float8", Value::Float(-3.9)).unwrap();
    assert_eq!(n, -3);
}

#[test]
fn test_bit_column_reads_big_endian_bytes() {
    let registry = ConversionRegistry::new();
    let n: u32 = convert_into(&registry, "BIT(16)", Value::Bytes(vec![0x01, 0x02])).unwrap();
    assert_eq!(n, 0x0102);

    let flag: bool = convert_into(&registry, "bit", Value::Bytes(vec![0x01])).unwrap();
    assert!(flag);
}

#[test]
fn test_optional_destination() {
    let registry = ConversionRegistry::new();
    let name: Option<String> = convert_into(&registry, "text", Value::Text("bob".into())).unwrap();
    assert_eq!(name.as_deref(), Some("bob"));
}

#[test]
fn test_temporal_text_parsing() {
    let registry = ConversionRegistry::new();
    let ts: NaiveDateTime =
        convert_into(&registry, "datetime", Value::Text("2024-03-01 10:20:30".into())).unwrap();
    assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

    let date: NaiveDate =
        convert_into(&registry, "date", Value::Text("2024-03-01".into())).unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
}

#[test]
fn test_json_from_text() {
    let registry = ConversionRegistry::new();
    let json: serde_json::Value =
        convert_into(&registry, "jsonb", Value::Text(r#"{"a":1}"#.into())).unwrap();
    assert_eq!(json["a"], 1);
}

#[test]
fn test_db_type_specific_registration_wins() {
    let registry = ConversionRegistry::new();
    registry.register_for::<String, _>("citext", |v| Ok(v.to_string().to_lowercase()));

    let folded: String = convert_into(&registry, "CITEXT", Value::Text("MiXeD".into())).unwrap();
    assert_eq!(folded, "mixed");
    let plain: String = convert_into(&registry, "text", Value::Text("MiXeD".into())).unwrap();
    assert_eq!(plain, "MiXeD");
}

#[test]
fn test_empty_registry_resolves_nothing() {
    let registry = ConversionRegistry::empty();
    assert!(registry.is_empty());
    assert!(registry.resolve(TypeId::of::<i64>(), "int8").is_none());
}

#[test]
fn test_wrong_destination_type_is_an_error() {
    let registry = ConversionRegistry::new();
    let convert = registry.resolve(TypeId::of::<i64>(), "int8").unwrap();
    let mut wrong = String::new();
    assert!(convert(&Value::Int(1), &mut wrong).is_err());
}
