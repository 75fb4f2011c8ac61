/// Database Facade Module
///
/// `Database` wraps one configured endpoint. Every operation validates its
/// input, opens a fresh connection, runs the SQL text (every statement in
/// it) and, unless a reader was requested, closes the connection again
/// before returning. Failures leave the `Database` disconnected and reusable.
///
/// A `Database` owns at most one connection at a time. While a `Reader` it
/// issued is open, that reader holds the connection; the next operation,
/// `disconnect` or `dispose` releases it first.

use super::batch::{query_batch, run_batch};
use super::connection::ConnectionString;
use super::reader::{Reader, ReaderSlot};
use super::value::{display_value, FromScalar};
use crate::config::{self, Settings};
use crate::core::events::{ErrorEvent, ExecuteEvent, Observers, ScalarEvent};
use crate::core::{CdbError, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Connection and command facade for one endpoint.
#[derive(Debug)]
pub struct Database {
    server_name: String,
    database_name: String,
    integrated_security: bool,
    connection: Option<Connection>,
    reader: ReaderSlot,
    observers: Observers,
    disposed: bool,
}

impl Database {
    /// Creates a facade for `database_name` on `server_name`
    ///
    /// No connection is opened until the first operation.
    pub fn new(
        server_name: impl Into<String>,
        database_name: impl Into<String>,
        integrated_security: bool,
    ) -> Self {
        Database {
            server_name: server_name.into(),
            database_name: database_name.into(),
            integrated_security,
            connection: None,
            reader: ReaderSlot::default(),
            observers: Observers::default(),
            disposed: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Database::new(
            settings.default_server.clone(),
            settings.default_database.clone(),
            settings.default_security,
        )
    }

    /// Creates a facade from the process-wide default settings
    pub fn with_defaults() -> Self {
        Database::from_settings(config::defaults())
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn set_server_name(&mut self, server_name: impl Into<String>) {
        self.server_name = server_name.into();
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn set_database_name(&mut self, database_name: impl Into<String>) {
        self.database_name = database_name.into();
    }

    pub fn integrated_security(&self) -> bool {
        self.integrated_security
    }

    pub fn set_integrated_security(&mut self, integrated_security: bool) {
        self.integrated_security = integrated_security;
    }

    pub fn connection_string(&self) -> ConnectionString {
        ConnectionString::new(
            self.server_name.clone(),
            self.database_name.clone(),
            self.integrated_security,
        )
    }

    /// `true` while the facade, or a reader it issued, holds an open
    /// connection
    pub fn is_connected(&self) -> bool {
        self.connection.is_some() || self.reader.is_live()
    }

    pub fn on_connect<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.connect.subscribe(move |_| callback());
    }

    /// Also fired when a `Reader` created by this facade closes its connection
    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.disconnect.subscribe(move |_| callback());
    }

    pub fn on_dispose<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.dispose.subscribe(move |_| callback());
    }

    pub fn on_error<F>(&mut self, callback: F)
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.observers.error.subscribe(callback);
    }

    pub fn on_execute<F>(&mut self, callback: F)
    where
        F: Fn(&ExecuteEvent) + Send + Sync + 'static,
    {
        self.observers.execute.subscribe(callback);
    }

    pub fn on_scalar<F>(&mut self, callback: F)
    where
        F: Fn(&ScalarEvent) + Send + Sync + 'static,
    {
        self.observers.scalar.subscribe(callback);
    }

    /// `true` if `sql` is non-blank after trimming
    pub fn validate_sql(&self, sql: &str) -> bool {
        !sql.trim().is_empty()
    }

    /// Runs `sql` as a non-query and returns the number of affected rows
    ///
    /// Every statement in `sql` runs. Rows changed by its INSERT, UPDATE and
    /// DELETE statements are summed; statements that return rows are stepped
    /// through and count as zero.
    ///
    /// # Errors
    ///
    /// `CdbError::Validation` for blank SQL or a missing server/database name,
    /// `CdbError::Database` when the connection or statement fails.
    pub fn execute(&mut self, sql: impl AsRef<str>) -> Result<usize> {
        self.run_non_query(sql.as_ref(), None)
    }

    /// Runs `sql` as a non-query and checks the affected-row count
    ///
    /// The statement is not rolled back when the count differs.
    ///
    /// # Errors
    ///
    /// As `execute`, plus `CdbError::RowCountMismatch` when the statement
    /// affected a different number of rows than `expected`.
    pub fn execute_expect(&mut self, sql: impl AsRef<str>, expected: usize) -> Result<usize> {
        self.run_non_query(sql.as_ref(), Some(expected))
    }

    /// Executes statements in order, stopping at the first failure
    ///
    /// Statements before the failing one have already taken effect.
    /// Returns the total number of affected rows.
    pub fn execute_all<I, S>(&mut self, statements: I, expected: Option<usize>) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut total = 0;
        for sql in statements {
            total += self.run_non_query(sql.as_ref(), expected)?;
        }
        Ok(total)
    }

    /// Dequeues and executes statements one at a time, stopping at the first
    /// failure
    ///
    /// The failing statement has been removed from `queue`; the statements
    /// after it remain queued.
    pub fn execute_queue<S>(&mut self, queue: &mut VecDeque<S>, expected: Option<usize>) -> Result<usize>
    where
        S: AsRef<str>,
    {
        let mut total = 0;
        while let Some(sql) = queue.pop_front() {
            total += self.run_non_query(sql.as_ref(), expected)?;
        }
        Ok(total)
    }

    /// Runs `sql` and converts its single value into `T`
    ///
    /// The value is the first column of the first row of the first
    /// statement that returns rows; the rest of the batch still runs. The
    /// scalar notification fires with the raw value as text before the
    /// conversion is attempted.
    ///
    /// # Errors
    ///
    /// `CdbError::NoValue` when the query yields no row or NULL,
    /// `CdbError::Conversion` when the value does not parse as `T`, and the
    /// validation and connectivity errors of `execute`. A conversion failure
    /// is logged but fires no error notification.
    pub fn scalar<T: FromScalar>(&mut self, sql: impl AsRef<str>) -> Result<T> {
        let raw = self.run_scalar(sql.as_ref())?;
        T::from_scalar(&raw).map_err(|e| {
            warn!("Scalar conversion failed: {}", e);
            e
        })
    }

    /// Like `scalar`, but reports failure as `false` alongside the type's
    /// default output (`""`, `0`, `0001-01-01 00:00:00`, nil GUID, `false`)
    pub fn scalar_or_default<T: FromScalar>(&mut self, sql: impl AsRef<str>) -> (bool, T) {
        match self.scalar(sql) {
            Ok(value) => (true, value),
            Err(_) => (false, T::default_output()),
        }
    }

    /// Runs `sql` as a row-producing statement and hands back a `Reader`
    ///
    /// Any reader this facade issued earlier is released first. The
    /// connection moves into the new reader and stays open until the reader
    /// is disposed or dropped, or until this facade releases it.
    ///
    /// # Errors
    ///
    /// The validation and connectivity errors of `execute`.
    pub fn start_reader(&mut self, sql: impl AsRef<str>) -> Result<Reader> {
        let sql = sql.as_ref();
        self.command(sql)?;

        let Some(connection) = self.connection.take() else {
            return Err(self.fail(CdbError::Validation("no open connection".to_string())));
        };

        match Reader::open(connection, sql, self.observers.disconnect.clone()) {
            Ok(reader) => {
                debug!("Reader started for: {}", sql);
                self.reader = reader.slot();
                Ok(reader)
            }
            Err(e) => {
                // The reader's worker has already closed the connection
                debug!("Disconnected from {}", self.connection_string());
                self.observers.disconnect.notify(&());
                Err(self.report(e))
            }
        }
    }

    /// Releases the outstanding reader and closes the open connection, then
    /// fires the disconnect notification. Safe to call when nothing is
    /// connected.
    pub fn disconnect(&mut self) {
        let released = self.reader.release();
        let closed = match self.connection.take() {
            Some(connection) => {
                if let Err((_, e)) = connection.close() {
                    warn!("Error closing connection: {}", e);
                }
                true
            }
            None => false,
        };

        if released || closed {
            debug!("Disconnected from {}", self.connection_string());
            self.observers.disconnect.notify(&());
        }
    }

    /// Disconnects and fires the dispose notification once
    ///
    /// Later operations open a new connection as usual.
    pub fn dispose(&mut self) {
        self.disconnect();
        if self.disposed {
            return;
        }
        self.disposed = true;
        debug!("Disposed {}", self.connection_string());
        self.observers.dispose.notify(&());
    }

    fn connect(&mut self) -> Result<()> {
        self.disconnect();

        let connection = self
            .connection_string()
            .open()
            .map_err(|e| self.fail(e))?;

        self.connection = Some(connection);
        self.disposed = false;
        self.observers.connect.notify(&());
        Ok(())
    }

    /// Validates `sql` and leaves an open connection ready to run it
    fn command(&mut self, sql: &str) -> Result<&Connection> {
        if !self.validate_sql(sql) {
            return Err(self.report(CdbError::Validation("SQL text is blank".to_string())));
        }
        self.connect()?;

        match self.connection.as_ref() {
            Some(connection) => Ok(connection),
            None => Err(CdbError::Validation("no open connection".to_string())),
        }
    }

    fn run_non_query(&mut self, sql: &str, expected: Option<usize>) -> Result<usize> {
        let outcome = run_batch(self.command(sql)?, sql);
        let result = outcome.map_err(|e| self.fail(e.into()))?;

        self.disconnect();
        self.observers
            .execute
            .notify(&ExecuteEvent::new(sql, result, expected));

        match expected {
            Some(expected) if expected != result => {
                warn!("Expected {} rows, {} affected: {}", expected, result, sql);
                Err(CdbError::RowCountMismatch {
                    expected,
                    actual: result,
                })
            }
            _ => Ok(result),
        }
    }

    fn run_scalar(&mut self, sql: &str) -> Result<Value> {
        let outcome = query_batch(self.command(sql)?, sql);
        let raw = outcome.map_err(|e| self.fail(e.into()))?;

        self.disconnect();

        let raw = raw.ok_or(CdbError::NoValue)?;
        let text = display_value(&raw).ok_or(CdbError::NoValue)?;
        self.observers.scalar.notify(&ScalarEvent::new(sql, text));
        Ok(raw)
    }

    /// Tears down the connection, then reports `err`
    fn fail(&mut self, err: CdbError) -> CdbError {
        self.disconnect();
        self.report(err)
    }

    fn report(&self, err: CdbError) -> CdbError {
        warn!("Database operation failed: {}", err);
        self.observers.error.notify(&ErrorEvent::new(err.to_string()));
        err
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.disconnect();
    }
}
