//! Statement hooks.
//!
//! Hooks see every statement a [`Model`](crate::Model) builds, in registration order. Each
//! hook receives the statement and a [`Next`] handle for the rest of the chain, so it can
//! inspect, rewrite, or stop the statement before it reaches the driver.
//!
//! ```ignore
//! let session = Session::new().with_hook(|stmt: Statement, next: Next<'_>| {
//!     if stmt.kind == StatementKind::Delete {
//!         return Err(OrmError::HookAborted("deletes are disabled".into()));
//!     }
//!     next.run(stmt)
//! });
//! ```

use crate::error::OrmResult;
use crate::model::Statement;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

/// A statement hook.
pub trait Hook: Send + Sync {
    /// Handle `statement`. Call `next.run` to continue the chain.
    fn handle(&self, statement: Statement, next: Next<'_>) -> OrmResult<Statement>;
}

impl<F> Hook for F
where
    F: Fn(Statement, Next<'_>) -> OrmResult<Statement> + Send + Sync,
{
    fn handle(&self, statement: Statement, next: Next<'_>) -> OrmResult<Statement> {
        self(statement, next)
    }
}

/// The remainder of a hook chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Hook>],
}

impl Next<'_> {
    /// Pass `statement` to the next hook, or return it when the chain is done.
    pub fn run(self, statement: Statement) -> OrmResult<Statement> {
        match self.rest.split_first() {
            Some((hook, rest)) => hook.handle(statement, Next { rest }),
            None => Ok(statement),
        }
    }
}

/// Ordered list of hooks.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("len", &self.hooks.len())
            .finish()
    }
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Arc::new(hook));
    }

    pub fn push_arc(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run `statement` through every hook.
    pub fn run(&self, statement: Statement) -> OrmResult<Statement> {
        Next { rest: &self.hooks }.run(statement)
    }
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// A `tracing` hook that emits every statement on the `dbkit.sql` target.
#[derive(Debug, Clone)]
pub struct TracingHook {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingHook {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TracingHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    fn emit(&self, statement: &Statement) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(&statement.sql);
        emit_at_level!(
            self.level,
            target: "dbkit.sql",
            kind = ?statement.kind,
            param_count = statement.args.len(),
            cached = statement.cache.is_some(),
            sql = %sql,
        );
    }
}

impl Hook for TracingHook {
    fn handle(&self, statement: Statement, next: Next<'_>) -> OrmResult<Statement> {
        self.emit(&statement);
        next.run(statement)
    }
}
