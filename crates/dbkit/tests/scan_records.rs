//! Scanning result sets into `#[derive(Record)]` structs.

use dbkit::{
    ColumnMeta, ConvertError, OrmError, Record, ResultSet, Scanner, Session, TableMeta, ToValue,
    Value,
};
use serde::Serialize;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Default, PartialEq, Record)]
struct Info {
    email: String,
}

#[derive(Debug, Default, PartialEq, Record)]
struct Account {
    #[orm(primary)]
    id: i64,
    #[orm(flatten)]
    info: Option<Info>,
}

#[derive(Debug, Default, Record)]
struct IdOnly {
    id: i64,
}

#[derive(Debug, Default, Serialize, Record)]
struct Profile {
    #[orm(column = "uid")]
    #[serde(rename = "user_id")]
    id: i64,
    #[serde(rename = "nick")]
    name: String,
    user_name: Option<String>,
    #[orm(skip)]
    #[serde(skip)]
    scratch: String,
}

#[derive(Debug, Default, PartialEq, Record)]
struct Geo {
    lat: f64,
}

#[derive(Debug, Default, PartialEq, Record)]
struct City {
    city: String,
    #[orm(flatten)]
    geo: Option<Box<Geo>>,
}

#[derive(Debug, Default, PartialEq, Record)]
struct Customer {
    #[orm(table = "customer")]
    meta: TableMeta,
    id: i64,
    #[orm(flatten)]
    city: City,
    #[orm(with = "customer_id=id")]
    orders: Vec<i64>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Cents(i64);

impl Scanner for Cents {
    fn scan(&mut self, value: &Value) -> Result<(), ConvertError> {
        let text = value
            .as_str()
            .ok_or_else(|| ConvertError::unsupported(value, "Cents"))?;
        let (whole, frac) = text.split_once('.').unwrap_or((text, "0"));
        let whole: i64 = whole.parse().map_err(|_| ConvertError::new("bad amount"))?;
        let frac: i64 = format!("{frac:0<2}")[..2]
            .parse()
            .map_err(|_| ConvertError::new("bad amount"))?;
        self.0 = whole * 100 + frac;
        Ok(())
    }
}

impl ToValue for Cents {
    fn to_value(&self) -> Value {
        Value::Int(self.0)
    }
}

#[derive(Debug, Default, Record)]
struct Invoice {
    id: i64,
    #[orm(scan)]
    total: Cents,
    #[orm(json)]
    tags: Vec<String>,
}

fn result_set(columns: &[(&str, &str)], rows: Vec<Vec<Value>>) -> ResultSet {
    let mut set = ResultSet::new(
        columns
            .iter()
            .map(|(name, db_type)| ColumnMeta::new(*name, *db_type)),
    );
    for row in rows {
        set.push_row(row).unwrap();
    }
    set
}

#[test]
fn test_flattened_fields_are_filled() {
    let rows = result_set(
        &[("id", "int8"), ("email", "text")],
        vec![vec![Value::Int(1), Value::Text("a@x.io".into())]],
    );
    let session = Session::new();

    let accounts: Vec<Account> = session.scan_all(&mut rows.cursor()).unwrap();
    assert_eq!(
        accounts,
        vec![Account {
            id: 1,
            info: Some(Info {
                email: "a@x.io".into()
            }),
        }]
    );

    // no field for `email`: it is discarded
    let ids: Vec<IdOnly> = session.scan_all(&mut rows.cursor()).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].id, 1);
    let plan = session.plan::<IdOnly>(rows.columns()).unwrap();
    assert_eq!(plan.discarded_columns().collect::<Vec<_>>(), vec!["email"]);
}

#[test]
fn test_null_leaves_optional_levels_unallocated() {
    let rows = result_set(
        &[("id", "int8"), ("email", "text")],
        vec![vec![Value::Int(2), Value::Null]],
    );
    let account: Account = Session::new().scan_one(&mut rows.cursor()).unwrap();
    assert_eq!(account.id, 2);
    assert_eq!(account.info, None);
}

#[test]
fn test_tag_precedence() {
    let rows = result_set(
        &[
            ("user_id", "int8"),
            ("uid", "int8"),
            ("nick", "varchar"),
            ("UserName", "varchar"),
            ("scratch", "text"),
        ],
        vec![vec![
            Value::Int(1),
            Value::Int(2),
            Value::Text("ann".into()),
            Value::Text("Ann Lee".into()),
            Value::Text("ignored".into()),
        ]],
    );
    let session = Session::new();
    let profile: Profile = session.scan_one(&mut rows.cursor()).unwrap();

    // the ORM tag wins over the serde rename
    assert_eq!(profile.id, 2);
    assert_eq!(profile.name, "ann");
    // fuzzy: case and underscores are ignored
    assert_eq!(profile.user_name.as_deref(), Some("Ann Lee"));
    assert_eq!(profile.scratch, "");

    let plan = session.plan::<Profile>(rows.columns()).unwrap();
    let mut discarded: Vec<_> = plan.discarded_columns().collect();
    discarded.sort_unstable();
    assert_eq!(discarded, vec!["scratch", "user_id"]);
}

#[test]
fn test_nested_records_and_skipped_fields() {
    let rows = result_set(
        &[("id", "int4"), ("city", "text"), ("lat", "float8"), ("orders", "int8")],
        vec![
            vec![
                Value::Int(7),
                Value::Text("Oslo".into()),
                Value::Float(59.9),
                Value::Int(3),
            ],
            vec![Value::Int(8), Value::Text("Lima".into()), Value::Null, Value::Null],
        ],
    );
    let session = Session::new();
    let customers: Vec<Customer> = session.scan_all(&mut rows.cursor()).unwrap();

    assert_eq!(customers[0].id, 7);
    assert_eq!(customers[0].city.city, "Oslo");
    assert_eq!(customers[0].city.geo, Some(Box::new(Geo { lat: 59.9 })));
    assert!(customers[0].orders.is_empty());
    assert_eq!(customers[1].city.geo, None);

    let plan = session.plan::<Customer>(rows.columns()).unwrap();
    assert_eq!(plan.mapping_for("lat").unwrap().path, vec![2, 1, 0]);
    assert_eq!(Customer::descriptor().table(), Some("customer"));
    assert_eq!(Customer::descriptor().column_names(), vec!["id", "city", "lat"]);
}

#[test]
fn test_custom_scanner_and_json_fields() {
    let rows = result_set(
        &[("id", "int8"), ("total", "numeric"), ("tags", "jsonb")],
        vec![vec![
            Value::Int(1),
            Value::Text("12.5".into()),
            Value::Json(serde_json::json!(["new", "paid"])),
        ]],
    );
    let session = Session::new();
    let invoice: Invoice = session.scan_one(&mut rows.cursor()).unwrap();
    assert_eq!(invoice.total, Cents(1250));
    assert_eq!(invoice.tags, vec!["new", "paid"]);

    let plan = session.plan::<Invoice>(rows.columns()).unwrap();
    assert!(plan.mapping_for("total").unwrap().user_converted);
    assert!(!plan.mapping_for("id").unwrap().user_converted);
}

#[test]
fn test_single_row_scan_on_empty_result() {
    let rows = result_set(&[("id", "int8"), ("email", "text")], Vec::new());
    let session = Session::new();

    let err = session.scan_one::<Account, _>(&mut rows.cursor()).unwrap_err();
    assert!(err.is_no_rows());

    let all: Vec<Account> = session.scan_all(&mut rows.cursor()).unwrap();
    assert!(all.is_empty());
    assert!(session.scan_opt::<Account, _>(&mut rows.cursor()).unwrap().is_none());
}

#[test]
fn test_no_matching_columns() {
    let rows = result_set(&[("total", "int8")], vec![vec![Value::Int(1)]]);
    let err = Session::new()
        .scan_all::<Account, _>(&mut rows.cursor())
        .unwrap_err();
    assert!(err.is_mapping_empty());
}

#[test]
fn test_conversion_error_names_column_and_field() {
    let rows = result_set(
        &[("id", "text"), ("email", "text")],
        vec![vec![Value::Text("abc".into()), Value::Text("a@x.io".into())]],
    );
    let err = Session::new()
        .scan_one::<Account, _>(&mut rows.cursor())
        .unwrap_err();
    match err {
        OrmError::Conversion {
            column,
            db_type,
            field,
            field_type,
            value,
            ..
        } => {
            assert_eq!(column, "id");
            assert_eq!(db_type, "text");
            assert_eq!(field, "id");
            assert_eq!(field_type, "i64");
            assert_eq!(value, "\"abc\"");
        }
        other => panic!("expected a conversion error, got {other:?}"),
    }
}

#[test]
fn test_plans_are_shared_across_threads() {
    let session = Arc::new(Session::new());
    let rows = Arc::new(result_set(
        &[("id", "int8"), ("email", "text")],
        (0..50)
            .map(|i| vec![Value::Int(i), Value::Text(format!("u{i}@x.io"))])
            .collect(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&session);
            let rows = Arc::clone(&rows);
            thread::spawn(move || {
                let accounts: Vec<Account> = session.scan_all(&mut rows.cursor()).unwrap();
                accounts.len()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 50);
    }

    assert_eq!(session.plan_cache().len(), 1);
    let first = session.plan::<Account>(rows.columns()).unwrap();
    let second = session.plan::<Account>(rows.columns()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_record_as_condition_uses_tags() {
    let profile = Profile {
        id: 3,
        name: "ann".into(),
        user_name: None,
        scratch: "x".into(),
    };
    let entries = Profile::descriptor().entries(&profile);
    assert_eq!(
        entries,
        vec![
            ("uid".to_string(), Value::Int(3)),
            ("nick".to_string(), Value::Text("ann".into())),
            ("user_name".to_string(), Value::Null),
        ]
    );
}
