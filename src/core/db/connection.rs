/// Connection Module
///
/// Builds the connection string for an endpoint and opens the underlying
/// SQLite connection from it. A connection string carries exactly three
/// fields: `Data Source` (the server, resolved as a directory), `Initial
/// Catalog` (the database, resolved as a file inside that directory) and
/// `Integrated Security`.

use crate::core::{CdbError, Result};
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

const DATA_SOURCE: &str = "Data Source";
const INITIAL_CATALOG: &str = "Initial Catalog";
const INTEGRATED_SECURITY: &str = "Integrated Security";

/// Connection string for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionString {
    /// Server name (`Data Source`)
    pub data_source: String,
    /// Database name (`Initial Catalog`)
    pub initial_catalog: String,
    /// Use the caller's OS identity instead of credentials
    pub integrated_security: bool,
}

impl ConnectionString {
    pub fn new(
        data_source: impl Into<String>,
        initial_catalog: impl Into<String>,
        integrated_security: bool,
    ) -> Self {
        ConnectionString {
            data_source: data_source.into(),
            initial_catalog: initial_catalog.into(),
            integrated_security,
        }
    }

    /// Checks that both the server and database names are present
    ///
    /// # Errors
    ///
    /// Returns `CdbError::Validation` naming the missing field.
    pub fn validate(&self) -> Result<()> {
        if self.initial_catalog.is_empty() {
            return Err(CdbError::Validation("database name is required".to_string()));
        }
        if self.data_source.is_empty() {
            return Err(CdbError::Validation("server name is required".to_string()));
        }
        Ok(())
    }

    /// Path of the SQLite file this connection string points at
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_source).join(&self.initial_catalog)
    }

    /// Opens a new connection to the endpoint
    ///
    /// The database file is created on first use; the server directory must
    /// already exist.
    ///
    /// # Errors
    ///
    /// Returns `CdbError::Validation` when a name is missing and
    /// `CdbError::Database` when SQLite cannot open the file.
    pub fn open(&self) -> Result<Connection> {
        self.validate()?;

        let path = self.database_path();
        debug!(
            "Opening {:?} (integrated security: {})",
            path, self.integrated_security
        );

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        info!("Connected to {}", self);
        Ok(conn)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={};{}={};{}={}",
            DATA_SOURCE,
            self.data_source,
            INITIAL_CATALOG,
            self.initial_catalog,
            INTEGRATED_SECURITY,
            if self.integrated_security { "True" } else { "False" }
        )
    }
}

impl FromStr for ConnectionString {
    type Err = CdbError;

    /// Parses `key=value` pairs separated by `;`
    ///
    /// Keys are matched case-insensitively and `Server`/`Database` are
    /// accepted as aliases. Unknown keys are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let mut parsed = ConnectionString::default();

        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                CdbError::Config(format!("malformed connection string segment '{}'", pair))
            })?;
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "data source" | "server" => parsed.data_source = value.to_string(),
                "initial catalog" | "database" => parsed.initial_catalog = value.to_string(),
                "integrated security" => {
                    parsed.integrated_security = match value.to_lowercase().as_str() {
                        "true" | "yes" | "sspi" => true,
                        "false" | "no" => false,
                        other => {
                            return Err(CdbError::Config(format!(
                                "invalid integrated security value '{}'",
                                other
                            )))
                        }
                    }
                }
                other => {
                    return Err(CdbError::Config(format!(
                        "unrecognized connection string key '{}'",
                        other
                    )))
                }
            }
        }

        Ok(parsed)
    }
}
