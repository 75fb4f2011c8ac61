/// CDB Error Module
///
/// This module defines the error types for every database operation in the
/// crate. Each failure is recovered at the boundary of the operation that
/// caused it and surfaced as a `CdbError` inside a `Result`.
use thiserror::Error;

/// Error type for the `Database` facade and the `Reader`.
///
/// The variants follow the failure taxonomy of the facade:
/// - Validation failures (blank SQL, missing server or database name)
/// - Connectivity failures from the underlying client
/// - Row-count expectation mismatches
/// - Scalar conversion failures
/// - Reader access failures (bad ordinal, no current row, wrong type)
#[derive(Error, Debug)]
pub enum CdbError {
    /// Errors raised by the underlying SQLite client (open, execute, fetch)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Input rejected before any connection was attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// The statement ran but affected a different number of rows than expected
    #[error("Row count mismatch: expected {expected}, got {actual}")]
    RowCountMismatch { expected: usize, actual: usize },

    /// The scalar query produced no row or a NULL value
    #[error("Scalar query returned no value")]
    NoValue,

    /// A scalar value could not be parsed as the requested type
    #[error("Conversion error: cannot convert '{value}' to {target}")]
    Conversion { value: String, target: &'static str },

    /// Column ordinal outside the result set (including -1 for unknown names)
    #[error("Invalid column ordinal: {0}")]
    InvalidOrdinal(i64),

    /// Column access attempted before the first read or after the last row
    #[error("Invalid attempt to read when no data is present")]
    NoCurrentRow,

    /// The column holds SQL NULL
    #[error("Column {0} is NULL")]
    NullValue(usize),

    /// The stored value has a type the accessor cannot return
    #[error("Invalid cast: column {ordinal} holds {found}, not {target}")]
    InvalidCast {
        ordinal: usize,
        found: &'static str,
        target: &'static str,
    },

    /// The reader has been disposed
    #[error("Reader error: the reader is closed")]
    ReaderClosed,

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors for settings files
    #[error("Settings parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type alias for Result to use CdbError as the error type.
pub type Result<T> = std::result::Result<T, CdbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let db_err = CdbError::Database(rusqlite::Error::ExecuteReturnedResults);
        assert!(db_err.to_string().contains("Database error"));

        let mismatch = CdbError::RowCountMismatch { expected: 3, actual: 2 };
        assert_eq!(mismatch.to_string(), "Row count mismatch: expected 3, got 2");

        let conversion = CdbError::Conversion {
            value: "abc".to_string(),
            target: "i32",
        };
        assert!(conversion.to_string().contains("'abc'"));
        assert!(conversion.to_string().contains("i32"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cdb_err: CdbError = io_err.into();
        match cdb_err {
            CdbError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let cdb_err: CdbError = toml_err.into();
        match cdb_err {
            CdbError::Toml(_) => {}
            _ => panic!("Expected TOML error"),
        }
    }
}
