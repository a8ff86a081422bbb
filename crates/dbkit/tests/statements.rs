//! Building and running statements through a `GenericClient`.

use dbkit::{
    CacheOption, ColumnMeta, GenericClient, MemoryResultCache, OrmResult, Placeholder, Record,
    ResultSet, Session, SessionConfig, SoftDelete, Value, args, where_map,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default, PartialEq, Record)]
#[orm(table = "user")]
struct User {
    #[orm(primary)]
    id: i64,
    #[orm(column = "user_name")]
    name: String,
}

/// Records every statement and answers queries with a fixed result set.
struct FakeClient {
    placeholder: Placeholder,
    rows: ResultSet,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeClient {
    fn new(placeholder: Placeholder, rows: ResultSet) -> Self {
        Self {
            placeholder,
            rows,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenericClient for FakeClient {
    async fn query(&self, sql: &str, args: &[Value]) -> OrmResult<ResultSet> {
        self.calls.lock().unwrap().push((sql.to_string(), args.to_vec()));
        Ok(self.rows.clone())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> OrmResult<u64> {
        self.calls.lock().unwrap().push((sql.to_string(), args.to_vec()));
        Ok(1)
    }

    fn placeholder(&self) -> Placeholder {
        self.placeholder
    }
}

fn users() -> ResultSet {
    ResultSet::new([ColumnMeta::new("id", "int8"), ColumnMeta::new("user_name", "text")])
        .with_row(vec![Value::Int(1), Value::Text("ann".into())])
        .unwrap()
        .with_row(vec![Value::Int(2), Value::Text("bob".into())])
        .unwrap()
}

#[tokio::test]
async fn test_select_rewrites_placeholders_for_postgres() {
    let client = FakeClient::new(Placeholder::Dollar, users());
    let session = Session::new();

    let found: Vec<User> = session
        .model("user")
        .fields_of::<User>()
        .where_(where_map! { "id >" => 0, "user_name like" => "%n%" }, vec![])
        .order_by("id")
        .all(&client)
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[1].name, "bob");

    let calls = client.calls();
    assert_eq!(
        calls[0].0,
        "SELECT id,user_name FROM user WHERE id > $1 AND user_name like $2 ORDER BY id"
    );
    assert_eq!(calls[0].1, args![0, "%n%"]);
}

#[tokio::test]
async fn test_one_and_opt() {
    let client = FakeClient::new(Placeholder::Question, users());
    let session = Session::with_config(SessionConfig::new().with_default_primary_key("id"));

    let user: User = session.model("user").where_pri(1).one(&client).await.unwrap();
    assert_eq!(
        user,
        User {
            id: 1,
            name: "ann".into()
        }
    );
    assert_eq!(client.calls()[0].0, "SELECT * FROM user WHERE id=?");

    let empty = FakeClient::new(Placeholder::Question, ResultSet::new(users().columns().to_vec()));
    let err = session
        .model("user")
        .where_pri(9)
        .one::<User, _>(&empty)
        .await
        .unwrap_err();
    assert!(err.is_no_rows());
    let none = session
        .model("user")
        .where_pri(9)
        .opt::<User, _>(&empty)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_count() {
    let counted = ResultSet::new([ColumnMeta::new("count", "int8")])
        .with_row(vec![Value::Int(42)])
        .unwrap();
    let client = FakeClient::new(Placeholder::Question, counted);
    let session = Session::with_config(
        SessionConfig::new().with_soft_delete("user", SoftDelete::timestamp("deleted_at")),
    );

    let total = session
        .model("user")
        .where_("age >", args![18])
        .count(&client)
        .await
        .unwrap();
    assert_eq!(total, 42);
    assert_eq!(
        client.calls()[0].0,
        "SELECT COUNT(1) FROM user WHERE (age > ?) AND deleted_at IS NULL"
    );
}

#[tokio::test]
async fn test_soft_delete_executes_update() {
    let client = FakeClient::new(Placeholder::Dollar, ResultSet::default());
    let session = Session::with_config(
        SessionConfig::new()
            .with_soft_delete("user", SoftDelete::timestamp("deleted_at"))
            .with_default_primary_key("id"),
    );

    let affected = session.model("user").where_pri(7).delete(&client).await.unwrap();
    assert_eq!(affected, 1);

    let calls = client.calls();
    assert_eq!(
        calls[0].0,
        "UPDATE user SET deleted_at=$1 WHERE (id=$2) AND deleted_at IS NULL"
    );
    assert!(matches!(calls[0].1[0], Value::TimestampTz(_)));

    let err = session.model("user").delete(&client).await.unwrap_err();
    assert!(err.is_missing_guard());
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn test_insert_and_update_records() {
    let client = FakeClient::new(Placeholder::Question, ResultSet::default());
    let session = Session::new();
    let user = User { id: 3, name: "cy".into() };

    session.model("user").data_record(&user).insert(&client).await.unwrap();
    session
        .model("user")
        .data([("user_name", "cyd")])
        .where_(dbkit::Where::record(&User { id: 3, name: String::new() }), vec![])
        .omit_empty()
        .update(&client)
        .await
        .unwrap();

    let calls = client.calls();
    assert_eq!(calls[0].0, "INSERT INTO user(id,user_name) VALUES(?,?)");
    assert_eq!(calls[0].1, args![3, "cy"]);
    assert_eq!(calls[1].0, "UPDATE user SET user_name=? WHERE id=?");
    assert_eq!(calls[1].1, args!["cyd", 3]);
}

#[tokio::test]
async fn test_result_cache_skips_the_driver() {
    let client = FakeClient::new(Placeholder::Question, users());
    let cache = Arc::new(MemoryResultCache::new());
    let session = Session::new().with_result_cache(cache.clone());
    let option = CacheOption::new(Duration::from_secs(60)).named("all-users");

    for _ in 0..3 {
        let found: Vec<User> = session
            .model("user")
            .cache(option.clone())
            .all(&client)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }
    assert_eq!(client.calls().len(), 1);
    assert_eq!(cache.len(), 1);

    // clearing drops the entry and runs the query uncached
    let _: Vec<User> = session
        .model("user")
        .cache(CacheOption::clear("all-users"))
        .all(&client)
        .await
        .unwrap();
    assert!(cache.is_empty());
    assert_eq!(client.calls().len(), 2);

    // statements without a cache option always reach the driver
    let _: Vec<User> = session.model("user").all(&client).await.unwrap();
    assert_eq!(client.calls().len(), 3);
}

#[tokio::test]
async fn test_raw_model_executes_with_appended_conditions() {
    let client = FakeClient::new(Placeholder::Dollar, users());
    let session = Session::new();

    let found: Vec<User> = session
        .raw("SELECT id, user_name FROM user WHERE note <> '?'", vec![])
        .where_("id IN(?)", args![vec![1, 2]])
        .all(&client)
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(
        client.calls()[0].0,
        "SELECT id, user_name FROM user WHERE note <> '?' AND id IN($1,$2)"
    );
}
