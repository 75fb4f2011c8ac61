/// Batch Module
///
/// SQL text handed to the facade may hold several statements. Each helper
/// here prepares them one at a time, steps every statement to completion
/// and never drops the tail of the text.

use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Rows, Statement};

/// Runs every statement in `sql` and returns the rows changed by its
/// INSERT, UPDATE and DELETE statements.
///
/// Row-producing statements are stepped through and contribute nothing.
pub fn run_batch(connection: &Connection, sql: &str) -> rusqlite::Result<usize> {
    let mut batch = Batch::new(connection, sql);
    let mut affected = 0;

    while let Some(mut stmt) = batch.next()? {
        let before = total_changes(connection)?;
        step_to_end(&mut stmt)?;

        // changes() keeps its old value across DDL and queries
        if total_changes(connection)? != before {
            affected += connection.changes() as usize;
        }
    }

    Ok(affected)
}

/// Runs every statement in `sql` and returns the first column of the first
/// row of the first statement that produces columns.
///
/// `None` when no statement produces columns or that statement yields no row.
pub fn query_batch(connection: &Connection, sql: &str) -> rusqlite::Result<Option<Value>> {
    let mut batch = Batch::new(connection, sql);
    let mut first: Option<Option<Value>> = None;

    while let Some(mut stmt) = batch.next()? {
        let has_columns = stmt.column_count() > 0;
        let mut rows = stmt.raw_query();
        if first.is_none() && has_columns {
            first = Some(match rows.next()? {
                Some(row) => Some(row.get::<_, Value>(0)?),
                None => None,
            });
        }
        while rows.next()?.is_some() {}
    }

    Ok(first.flatten())
}

/// Steps through the statements left in `batch`
pub fn drain(batch: &mut Batch<'_, '_>) -> rusqlite::Result<()> {
    while let Some(mut stmt) = batch.next()? {
        step_to_end(&mut stmt)?;
    }
    Ok(())
}

/// Fetches the next row of `rows` as `width` owned values
pub fn fetch_row(rows: &mut Rows<'_>, width: usize) -> rusqlite::Result<Option<Vec<Value>>> {
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    (0..width)
        .map(|i| row.get::<_, Value>(i))
        .collect::<rusqlite::Result<Vec<_>>>()
        .map(Some)
}

pub fn step_to_end(stmt: &mut Statement<'_>) -> rusqlite::Result<()> {
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {}
    Ok(())
}

fn total_changes(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row("SELECT total_changes()", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, x INTEGER)")
            .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_every_statement_runs() {
        let conn = setup();
        let affected = run_batch(
            &conn,
            "INSERT INTO t (x) VALUES (1); INSERT INTO t (x) VALUES (2);
             INSERT INTO t (x) VALUES (3)",
        )
        .unwrap();

        assert_eq!(affected, 3);
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn test_ddl_and_queries_add_nothing() {
        let conn = setup();
        let affected = run_batch(
            &conn,
            "INSERT INTO t (x) VALUES (1), (2);
             CREATE TABLE u (y INTEGER);
             SELECT * FROM t;
             UPDATE t SET x = 0 WHERE x = 1",
        )
        .unwrap();

        assert_eq!(affected, 3);
        assert_eq!(run_batch(&conn, "SELECT 1").unwrap(), 0);
        assert_eq!(run_batch(&conn, "PRAGMA user_version").unwrap(), 0);
    }

    #[test]
    fn test_error_in_tail_is_returned() {
        let conn = setup();
        let result = run_batch(&conn, "INSERT INTO t (x) VALUES (1); INSERT INTO missing VALUES (1)");

        assert!(result.unwrap_err().to_string().contains("no such table"));
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_query_batch_takes_first_result() {
        let conn = setup();
        let value = query_batch(
            &conn,
            "INSERT INTO t (x) VALUES (7); SELECT x FROM t; INSERT INTO t (x) VALUES (8)",
        )
        .unwrap();

        assert_eq!(value, Some(Value::Integer(7)));
        assert_eq!(count(&conn), 2);

        assert_eq!(query_batch(&conn, "SELECT x FROM t WHERE x > 100").unwrap(), None);
        assert_eq!(query_batch(&conn, "DELETE FROM t").unwrap(), None);
    }
}
