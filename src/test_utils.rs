/// # Test Utilities Module
///
/// Testing infrastructure shared by the unit and integration tests:
/// - Isolated on-disk databases in temporary directories
/// - A sample schema with every scalar kind the facade reads
/// - An event log that records every notification a `Database` fires

use crate::core::db::Database;
use crate::core::Result;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Routes `tracing` output to the test harness
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Isolated database test fixture
///
/// The server directory is a fresh `TempDir`, removed when the fixture drops.
pub struct DatabaseFixture {
    pub name: String,
    pub dir: TempDir,
}

impl DatabaseFixture {
    /// Create an empty database named `<name>.db`
    pub fn new(name: &str) -> Result<Self> {
        init_tracing();
        let dir = TempDir::new()?;
        Ok(DatabaseFixture {
            name: format!("{}.db", name),
            dir,
        })
    }

    /// Create fixture with the sample schema and rows
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.setup_sample_schema()?;
        Ok(fixture)
    }

    pub fn server(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// A facade pointed at this fixture
    pub fn database(&self) -> Database {
        Database::new(self.server(), self.name.clone(), true)
    }

    /// Direct connection for setup and verification, bypassing the facade
    pub fn raw_connection(&self) -> Result<Connection> {
        Ok(Connection::open(self.dir.path().join(&self.name))?)
    }

    /// Three accounts, two of them active; `audit` starts empty
    pub fn setup_sample_schema(&self) -> Result<()> {
        self.raw_connection()?.execute_batch(
            "
            CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                balance NUMERIC NOT NULL,
                opened TEXT NOT NULL,
                active INTEGER NOT NULL,
                token TEXT NOT NULL
            );

            INSERT INTO accounts VALUES
                (1, 'alice', 150.25, '2023-04-01 09:30:00', 1, '3f2504e0-4f89-11d3-9a0c-0305e82c3301');
            INSERT INTO accounts VALUES
                (2, 'bob', 0, '2023-05-12 17:45:10', 0, '6ba7b810-9dad-11d1-80b4-00c04fd430c8');
            INSERT INTO accounts VALUES
                (3, 'carol', 980.5, '2024-01-15', 1, '6ba7b811-9dad-11d1-80b4-00c04fd430c8');

            CREATE TABLE audit (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                note TEXT
            );
        ",
        )?;
        Ok(())
    }
}

/// Records every notification a `Database` fires, in order
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Subscribes to every notification of `db`
    pub fn attach(db: &mut Database) -> Self {
        let log = EventLog::default();

        let l = log.clone();
        db.on_connect(move || l.push("connect".to_string()));
        let l = log.clone();
        db.on_disconnect(move || l.push("disconnect".to_string()));
        let l = log.clone();
        db.on_dispose(move || l.push("dispose".to_string()));
        let l = log.clone();
        db.on_error(move |e| l.push(format!("error:{}", e.message)));
        let l = log.clone();
        db.on_execute(move |e| {
            let expected = e.expected.map_or("-".to_string(), |n| n.to_string());
            l.push(format!("execute:{}:{}:{}", e.result, expected, e.success))
        });
        let l = log.clone();
        db.on_scalar(move |e| l.push(format!("scalar:{}", e.value)));

        log
    }

    pub fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of entries equal to `name` or starting with `name:`
    pub fn count(&self, name: &str) -> usize {
        let prefix = format!("{}:", name);
        self.entries()
            .iter()
            .filter(|e| *e == name || e.starts_with(&prefix))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creation() {
        let fixture = DatabaseFixture::new("fixture_create").unwrap();
        assert_eq!(fixture.name, "fixture_create.db");

        let db = fixture.database();
        assert_eq!(db.database_name(), "fixture_create.db");
        assert!(db.integrated_security());
    }

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data("fixture_sample").unwrap();
        let count: i64 = fixture
            .raw_connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .expect("Failed to count accounts");
        assert_eq!(count, 3);
    }

    #[test]
    fn test_event_log_counts() {
        let log = EventLog::default();
        log.push("connect".to_string());
        log.push("error:boom".to_string());
        log.push("connection-lost".to_string());

        assert_eq!(log.count("connect"), 1);
        assert_eq!(log.count("error"), 1);
        log.clear();
        assert!(log.entries().is_empty());
    }
}
