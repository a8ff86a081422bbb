//! Generic client trait and statement execution.
//!
//! A [`GenericClient`] runs SQL and hands back a buffered [`ResultSet`]. The `pg` module
//! implements it for tokio-postgres clients and transactions; anything else (another
//! driver, a test double) only needs `query` and `execute`.

use crate::error::{OrmError, OrmResult};
use crate::model::{Model, Statement};
use crate::placeholder::{Placeholder, rewrite};
use crate::record::Record;
use crate::row::ResultSet;
use crate::session::Session;
use crate::value::Value;
use std::any::TypeId;
use std::future::Future;

/// A trait that unifies database clients and transactions.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return every row.
    fn query(
        &self,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = OrmResult<ResultSet>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, args: &[Value]) -> impl Future<Output = OrmResult<u64>> + Send;

    /// Placeholder syntax this client expects. Statements are rewritten before they are sent.
    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }
}

impl Session {
    /// Run a row-returning statement, consulting the result cache when it asks for it.
    pub async fn query_statement<C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<ResultSet> {
        let sql = rewrite(&statement.sql, client.placeholder());
        let (Some(cache), Some(option)) = (self.result_cache(), statement.cache.as_ref()) else {
            return client.query(&sql, &statement.args).await;
        };
        let key = option.key(&statement.sql, &statement.args);
        if option.clear {
            cache.remove(&key);
            tracing::debug!(target: "dbkit.sql", key = %key, "result cache entry removed");
            return client.query(&sql, &statement.args).await;
        }
        if let Some(rows) = cache.get(&key) {
            tracing::trace!(target: "dbkit.sql", key = %key, rows = rows.len(), "result cache hit");
            return Ok(rows);
        }

        let rows = client.query(&sql, &statement.args).await?;
        cache.set(&key, rows.clone(), option.ttl);
        Ok(rows)
    }

    /// Run a statement that returns no rows.
    pub async fn execute<C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<u64> {
        let sql = rewrite(&statement.sql, client.placeholder());
        client.execute(&sql, &statement.args).await
    }

    pub async fn fetch_all<T: Record, C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<Vec<T>> {
        let rows = self.query_statement(client, statement).await?;
        self.scan_all(&mut rows.cursor())
    }

    /// The first row; `NoRows` when there is none.
    pub async fn fetch_one<T: Record, C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<T> {
        let rows = self.query_statement(client, statement).await?;
        self.scan_one(&mut rows.cursor())
    }

    pub async fn fetch_opt<T: Record, C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<Option<T>> {
        let rows = self.query_statement(client, statement).await?;
        self.scan_opt(&mut rows.cursor())
    }

    /// The first column of the first row as an integer.
    pub async fn fetch_count<C: GenericClient>(
        &self,
        client: &C,
        statement: &Statement,
    ) -> OrmResult<i64> {
        let rows = self.query_statement(client, statement).await?;
        let (Some(column), Some(row)) = (rows.columns().first(), rows.rows().first()) else {
            return Ok(0);
        };
        let Some(value) = row.first().filter(|value| !value.is_null()) else {
            return Ok(0);
        };
        let convert = self
            .registry()
            .resolve(TypeId::of::<i64>(), &column.db_type)
            .ok_or_else(|| OrmError::decode(column.name.clone(), "no integer conversion"))?;
        let mut total = 0i64;
        convert(value, &mut total).map_err(|e| OrmError::decode(column.name.clone(), e.message()))?;
        Ok(total)
    }
}

impl Model<'_> {
    /// Select every matching row.
    pub async fn all<T: Record, C: GenericClient>(&self, client: &C) -> OrmResult<Vec<T>> {
        let statement = self.select_statement()?;
        self.session().fetch_all(client, &statement).await
    }

    /// Select one row; `NoRows` when nothing matches.
    pub async fn one<T: Record, C: GenericClient>(&self, client: &C) -> OrmResult<T> {
        let statement = self.select_statement()?;
        self.session().fetch_one(client, &statement).await
    }

    pub async fn opt<T: Record, C: GenericClient>(&self, client: &C) -> OrmResult<Option<T>> {
        let statement = self.select_statement()?;
        self.session().fetch_opt(client, &statement).await
    }

    pub async fn count<C: GenericClient>(&self, client: &C) -> OrmResult<i64> {
        let statement = self.count_statement()?;
        self.session().fetch_count(client, &statement).await
    }

    pub async fn insert<C: GenericClient>(&self, client: &C) -> OrmResult<u64> {
        let statement = self.insert_statement()?;
        self.session().execute(client, &statement).await
    }

    pub async fn update<C: GenericClient>(&self, client: &C) -> OrmResult<u64> {
        let statement = self.update_statement()?;
        self.session().execute(client, &statement).await
    }

    pub async fn delete<C: GenericClient>(&self, client: &C) -> OrmResult<u64> {
        let statement = self.delete_statement()?;
        self.session().execute(client, &statement).await
    }
}
