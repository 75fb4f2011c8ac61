/// Reader Module
///
/// A forward-only, read-once cursor over the result of a row-producing
/// statement. A worker thread owns the connection and the live statement and
/// hands rows over one `read` at a time, so rows are fetched lazily and a
/// failing row surfaces from `read`. The connection stays open until the
/// reader is disposed, dropped, or released by the `Database` that issued it.

use super::batch::{drain, fetch_row, step_to_end};
use super::value::{parse_date_time, type_name};
use crate::core::events::{Handlers, ReadEvent};
use crate::core::{CdbError, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Rows};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;
/// Column reference accepted by the typed accessors.
///
/// Implemented for zero-based positions (`usize`, `i32`) and for column
/// names. An unknown name resolves to `-1`, which every accessor rejects.
pub trait Field {
    fn ordinal(&self, reader: &Reader) -> i64;
}

impl Field for usize {
    fn ordinal(&self, _reader: &Reader) -> i64 {
        *self as i64
    }
}

impl Field for i32 {
    fn ordinal(&self, _reader: &Reader) -> i64 {
        i64::from(*self)
    }
}

impl Field for &str {
    fn ordinal(&self, reader: &Reader) -> i64 {
        i64::from(reader.field_id(self))
    }
}

impl Field for String {
    fn ordinal(&self, reader: &Reader) -> i64 {
        i64::from(reader.field_id(self))
    }
}

type Reply = rusqlite::Result<Option<Vec<Value>>>;

/// Shape of the result set, sent once by the worker when the statement opens
struct Opened {
    columns: Vec<String>,
    has_rows: bool,
}

/// Open result set: the channels to the worker that owns the connection
struct Cursor {
    requests: SyncSender<()>,
    replies: Receiver<Reply>,
    worker: JoinHandle<()>,
    current: Option<Vec<Value>>,
    finished: bool,
}

impl Cursor {
    fn fetch(&mut self) -> Result<Option<Vec<Value>>> {
        self.requests.send(()).map_err(|_| CdbError::ReaderClosed)?;
        match self.replies.recv() {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(CdbError::ReaderClosed),
        }
    }

    /// Stops the worker, which closes the connection on its way out
    fn close(self) {
        let Cursor {
            requests, worker, ..
        } = self;
        drop(requests);
        if worker.join().is_err() {
            warn!("Reader worker panicked");
        }
    }
}

/// Cursor slot shared by a `Reader` and the `Database` that issued it.
///
/// Whichever side releases it first closes the connection; the other side
/// then finds the slot empty.
#[derive(Clone, Default)]
pub(crate) struct ReaderSlot(Arc<Mutex<Option<Cursor>>>);

impl ReaderSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Cursor>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    /// Closes the cursor and its connection; `false` if already released
    pub(crate) fn release(&self) -> bool {
        let cursor = self.lock().take();
        match cursor {
            Some(cursor) => {
                cursor.close();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ReaderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSlot")
            .field("live", &self.is_live())
            .finish()
    }
}

/// Forward-only row reader.
///
/// Created by `Database::start_reader`. Dropping the reader disposes it.
pub struct Reader {
    slot: ReaderSlot,
    columns: Vec<String>,
    has_rows: bool,
    current_row: i32,
    on_read: Handlers<ReadEvent>,
    on_disconnect: Handlers<()>,
}

impl Reader {
    /// Runs `sql` on `connection`, which moves to the reader's worker.
    ///
    /// Statements ahead of the first row-producing one run to completion
    /// first; the ones after it run once its rows are exhausted. On failure
    /// the worker has already closed the connection.
    pub(crate) fn open(connection: Connection, sql: &str, on_disconnect: Handlers<()>) -> Result<Self> {
        let (opened_tx, opened_rx) = mpsc::sync_channel(1);
        let (request_tx, request_rx) = mpsc::sync_channel(0);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);

        let sql = sql.to_string();
        let worker = thread::Builder::new()
            .name("cdb-reader".to_string())
            .spawn(move || serve(connection, &sql, opened_tx, request_rx, reply_tx))?;

        let opened = match opened_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = worker.join();
                return Err(CdbError::ReaderClosed);
            }
        };

        debug!("Reader opened with {} columns", opened.columns.len());

        let cursor = Cursor {
            requests: request_tx,
            replies: reply_rx,
            worker,
            current: None,
            finished: false,
        };

        Ok(Reader {
            slot: ReaderSlot(Arc::new(Mutex::new(Some(cursor)))),
            columns: opened.columns,
            has_rows: opened.has_rows,
            current_row: -1,
            on_read: Handlers::new(),
            on_disconnect,
        })
    }

    /// Handle the issuing `Database` keeps to release this reader
    pub(crate) fn slot(&self) -> ReaderSlot {
        self.slot.clone()
    }

    /// Registers a callback fired after each successful `read`
    pub fn on_read<F>(&mut self, callback: F)
    where
        F: Fn(&ReadEvent) + Send + Sync + 'static,
    {
        self.on_read.subscribe(callback);
    }

    /// `true` if the result set contains at least one row
    pub fn has_rows(&self) -> bool {
        self.has_rows
    }

    /// Zero-based index of the most recently fetched row, `-1` before the
    /// first successful read
    pub fn current_row(&self) -> i32 {
        self.current_row
    }

    /// `true` until the reader is disposed or its `Database` releases it
    pub fn is_open(&self) -> bool {
        self.slot.is_live()
    }

    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Advances to the next row.
    ///
    /// Returns `Ok(true)` and fires the read notification when a row was
    /// fetched, `Ok(false)` once the result set is exhausted.
    ///
    /// # Errors
    ///
    /// `CdbError::ReaderClosed` once the reader has been released, and
    /// `CdbError::Database` when fetching the row fails. After a failed
    /// fetch every later `read` returns `Ok(false)`.
    pub fn read(&mut self) -> Result<bool> {
        let mut guard = self.slot.lock();
        let cursor = guard.as_mut().ok_or(CdbError::ReaderClosed)?;
        if cursor.finished {
            return Ok(false);
        }

        cursor.current = None;
        match cursor.fetch() {
            Ok(Some(row)) => cursor.current = Some(row),
            Ok(None) => {
                cursor.finished = true;
                return Ok(false);
            }
            Err(e) => {
                cursor.finished = true;
                warn!("Reader fetch failed after row {}: {}", self.current_row, e);
                return Err(e);
            }
        }
        drop(guard);

        self.current_row += 1;
        self.on_read.notify(&ReadEvent {
            row: self.current_row,
        });
        Ok(true)
    }

    /// Position of the column called `name`, or `-1` if there is none.
    ///
    /// Matching ignores case and surrounding whitespace on both sides.
    pub fn field_id(&self, name: &str) -> i32 {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(-1)
    }

    /// Raw value of a column in the current row
    pub fn get_value(&self, field: impl Field) -> Result<Value> {
        self.value(field).map(|(_, v)| v)
    }

    pub fn get_string(&self, field: impl Field) -> Result<String> {
        match self.non_null(field)? {
            (_, Value::Text(t)) => Ok(t),
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "string")),
        }
    }

    /// Integer column read as a bit: zero is `false`, anything else `true`
    pub fn get_boolean(&self, field: impl Field) -> Result<bool> {
        match self.non_null(field)? {
            (_, Value::Integer(i)) => Ok(i != 0),
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "bool")),
        }
    }

    pub fn get_decimal(&self, field: impl Field) -> Result<Decimal> {
        match self.non_null(field)? {
            (_, Value::Integer(i)) => Ok(Decimal::from(i)),
            (ordinal, Value::Real(f)) => {
                Decimal::try_from(f).map_err(|_| invalid_cast(ordinal, "REAL", "decimal"))
            }
            (ordinal, Value::Text(t)) => {
                Decimal::from_str(t.trim()).map_err(|_| invalid_cast(ordinal, "TEXT", "decimal"))
            }
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "decimal")),
        }
    }

    pub fn get_int(&self, field: impl Field) -> Result<i32> {
        match self.non_null(field)? {
            (ordinal, Value::Integer(i)) => {
                i32::try_from(i).map_err(|_| invalid_cast(ordinal, "INTEGER", "i32"))
            }
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "i32")),
        }
    }

    pub fn get_date_time(&self, field: impl Field) -> Result<NaiveDateTime> {
        match self.non_null(field)? {
            (ordinal, Value::Text(t)) => {
                parse_date_time(&t).ok_or_else(|| invalid_cast(ordinal, "TEXT", "date-time"))
            }
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "date-time")),
        }
    }

    /// GUID stored as text or as a 16-byte blob
    pub fn get_guid(&self, field: impl Field) -> Result<Uuid> {
        match self.non_null(field)? {
            (ordinal, Value::Text(t)) => {
                Uuid::parse_str(t.trim()).map_err(|_| invalid_cast(ordinal, "TEXT", "guid"))
            }
            (ordinal, Value::Blob(b)) => {
                Uuid::from_slice(&b).map_err(|_| invalid_cast(ordinal, "BLOB", "guid"))
            }
            (ordinal, other) => Err(invalid_cast(ordinal, type_name(&other), "guid")),
        }
    }

    /// Releases the cursor and closes its connection. Safe to call twice,
    /// and after the issuing `Database` has already released it.
    pub fn dispose(&mut self) {
        if !self.slot.release() {
            return;
        }
        debug!("Reader disposed after {} rows", self.current_row + 1);
        self.on_disconnect.notify(&());
    }

    fn value(&self, field: impl Field) -> Result<(usize, Value)> {
        let guard = self.slot.lock();
        let cursor = guard.as_ref().ok_or(CdbError::ReaderClosed)?;

        let ordinal = field.ordinal(self);
        let index = usize::try_from(ordinal)
            .ok()
            .filter(|i| *i < self.columns.len())
            .ok_or(CdbError::InvalidOrdinal(ordinal))?;

        let row = cursor.current.as_ref().ok_or(CdbError::NoCurrentRow)?;
        row.get(index)
            .map(|v| (index, v.clone()))
            .ok_or(CdbError::InvalidOrdinal(ordinal))
    }

    fn non_null(&self, field: impl Field) -> Result<(usize, Value)> {
        match self.value(field)? {
            (index, Value::Null) => Err(CdbError::NullValue(index)),
            found => Ok(found),
        }
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("open", &self.is_open())
            .field("has_rows", &self.has_rows)
            .field("current_row", &self.current_row)
            .field("columns", &self.columns)
            .finish()
    }
}

fn invalid_cast(ordinal: usize, found: &'static str, target: &'static str) -> CdbError {
    CdbError::InvalidCast {
        ordinal,
        found,
        target,
    }
}

/// Worker body: owns the connection until the reader lets go of it
fn serve(
    connection: Connection,
    sql: &str,
    opened: SyncSender<rusqlite::Result<Opened>>,
    requests: Receiver<()>,
    replies: SyncSender<Reply>,
) {
    let outcome = stream(&connection, sql, &opened, &requests, &replies);

    if let Err((_, e)) = connection.close() {
        warn!("Error closing reader connection: {}", e);
    }
    if let Err(e) = outcome {
        let _ = opened.send(Err(e));
    }
}

/// Opens the result set, then answers one row per request.
///
/// Only failures before the result set opens are returned; later ones are
/// sent as replies.
fn stream(
    connection: &Connection,
    sql: &str,
    opened: &SyncSender<rusqlite::Result<Opened>>,
    requests: &Receiver<()>,
    replies: &SyncSender<Reply>,
) -> rusqlite::Result<()> {
    let mut batch = Batch::new(connection, sql);
    let mut stmt = None;
    while let Some(mut next) = batch.next()? {
        if next.column_count() > 0 {
            stmt = Some(next);
            break;
        }
        step_to_end(&mut next)?;
    }

    let columns: Vec<String> = match &stmt {
        Some(stmt) => stmt.column_names().into_iter().map(String::from).collect(),
        None => Vec::new(),
    };
    let width = columns.len();
    let mut rows = stmt.as_mut().map(|stmt| stmt.raw_query());

    // One row ahead, so `has_rows` is known up front
    let mut pending = match rows.as_mut() {
        Some(rows) => fetch_row(rows, width)?,
        None => None,
    };
    let shape = Opened {
        columns,
        has_rows: pending.is_some(),
    };
    if opened.send(Ok(shape)).is_err() {
        return Ok(());
    }

    while requests.recv().is_ok() {
        let reply = match pending.take() {
            Some(row) => Ok(Some(row)),
            None => next_row(&mut rows, &mut batch, width),
        };
        let failed = reply.is_err();
        if replies.send(reply).is_err() || failed {
            break;
        }
    }
    Ok(())
}

/// Next row of the open result set; runs the rest of the batch once the
/// rows run out
fn next_row(rows: &mut Option<Rows<'_>>, batch: &mut Batch<'_, '_>, width: usize) -> Reply {
    let Some(current) = rows.as_mut() else {
        return Ok(None);
    };
    match fetch_row(current, width)? {
        Some(row) => Ok(Some(row)),
        None => {
            *rows = None;
            drain(batch)?;
            Ok(None)
        }
    }
}
