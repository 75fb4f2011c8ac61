//! Property-based tests for the database facade and reader
//!
//! These tests verify, over generated inputs, that:
//! - Blank SQL is rejected before any connection is attempted
//! - Row-count expectations succeed exactly when the counts match
//! - Multi-statement SQL runs every statement
//! - A reader yields one successful read per row, then only `false`
//! - Column name lookup ignores case and surrounding whitespace
//! - Boolean scalars are `true` only for the integer 1

#[cfg(test)]
mod tests {
    use cdb::{CdbError, Database, FromScalar};
    use proptest::prelude::*;
    use rusqlite::types::Value;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // Test infrastructure

    /// Creates a database in a fresh directory with `rows` rows in table `t`
    fn create_db(rows: usize) -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let mut db = Database::new(dir.path().to_string_lossy(), "prop.db", true);
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, x INTEGER)").unwrap();
        for i in 0..rows {
            db.execute(format!("INSERT INTO t (x) VALUES ({})", i)).unwrap();
        }
        (dir, db)
    }

    fn arb_blank_sql() -> impl Strategy<Value = String> {
        "[ \t\r\n]{0,12}"
    }

    fn arb_column_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}".prop_map(|s| format!("c_{}", s))
    }

    /// Re-cases `name` with `mask` and pads it with spaces
    fn disguise(name: &str, mask: &[bool], left: usize, right: usize) -> String {
        let cased: String = name
            .chars()
            .zip(mask.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect();
        format!("{}{}{}", " ".repeat(left), cased, " ".repeat(right))
    }

    proptest! {
        /// Blank SQL fails validation without touching the connection
        #[test]
        fn prop_blank_sql_is_rejected(sql in arb_blank_sql()) {
            let mut db = Database::new("S", "D", false);
            let connects = Arc::new(Mutex::new(0));
            let counter = Arc::clone(&connects);
            db.on_connect(move || *counter.lock().unwrap() += 1);

            prop_assert!(!db.validate_sql(&sql));
            prop_assert!(matches!(db.execute(&sql), Err(CdbError::Validation(_))));
            prop_assert!(matches!(db.scalar::<i32>(&sql), Err(CdbError::Validation(_))));
            prop_assert!(db.start_reader(&sql).is_err());
            prop_assert_eq!(*connects.lock().unwrap(), 0);
        }

        /// Boolean scalars derive from the integer conversion: only 1 is true
        #[test]
        fn prop_boolean_is_exactly_one(i in any::<i32>()) {
            let value = bool::from_scalar(&Value::Integer(i64::from(i))).unwrap();
            prop_assert_eq!(value, i == 1);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Without an expectation any affected-row count is returned and the
        /// notification reports no success; with one, success means the
        /// counts match
        #[test]
        fn prop_expected_count_matches(rows in 0usize..6, expected in 0usize..6) {
            let (_dir, mut db) = create_db(rows);
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&seen);
            db.on_execute(move |e| log.lock().unwrap().push((e.result, e.expected, e.success)));

            prop_assert_eq!(db.execute("UPDATE t SET x = x + 1").unwrap(), rows);

            let checked = db.execute_expect("UPDATE t SET x = x + 1", expected);
            prop_assert_eq!(checked.is_ok(), rows == expected);

            let events = seen.lock().unwrap().clone();
            prop_assert_eq!(events, vec![
                (rows, None, false),
                (rows, Some(expected), rows == expected),
            ]);
        }

        /// Every statement of a multi-statement text runs and is counted
        #[test]
        fn prop_batch_runs_every_statement(n in 1usize..6) {
            let (_dir, mut db) = create_db(0);
            let sql = (0..n)
                .map(|i| format!("INSERT INTO t (x) VALUES ({})", i))
                .collect::<Vec<_>>()
                .join("; ");

            prop_assert_eq!(db.execute(&sql).unwrap(), n);
            let count: i32 = db.scalar("SELECT COUNT(*) FROM t").unwrap();
            prop_assert_eq!(count as usize, n);
        }

        /// `read` succeeds once per row, then keeps returning false
        #[test]
        fn prop_read_count_equals_row_count(rows in 0usize..8) {
            let (_dir, mut db) = create_db(rows);
            let mut reader = db.start_reader("SELECT * FROM t ORDER BY id").unwrap();

            prop_assert_eq!(reader.has_rows(), rows > 0);
            for k in 1..=rows {
                prop_assert!(reader.read().unwrap());
                prop_assert_eq!(reader.current_row(), k as i32 - 1);
            }
            for _ in 0..3 {
                prop_assert!(!reader.read().unwrap());
            }
            reader.dispose();
        }

        /// Column lookup is case- and trim-insensitive; unknown names give -1
        #[test]
        fn prop_field_lookup_is_case_and_trim_insensitive(
            name in arb_column_name(),
            mask in prop::collection::vec(any::<bool>(), 1..8),
            left in 0usize..4,
            right in 0usize..4,
        ) {
            let dir = TempDir::new().unwrap();
            let mut db = Database::new(dir.path().to_string_lossy(), "lookup.db", false);
            db.execute(format!("CREATE TABLE t (other INTEGER, \"{}\" INTEGER)", name)).unwrap();

            let reader = db.start_reader("SELECT * FROM t").unwrap();
            prop_assert_eq!(reader.field_id(&name), 1);
            prop_assert_eq!(reader.field_id(&disguise(&name, &mask, left, right)), 1);
            prop_assert_eq!(reader.field_id(&format!("{}_missing", name)), -1);
        }
    }
}
