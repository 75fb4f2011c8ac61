/// Core Module for CDB
///
/// This module contains the database facade, the row reader, the
/// notification payloads and the shared error type.

pub mod db;
pub mod error;
pub mod events;

// Re-export commonly used types for convenience
pub use error::{CdbError, Result};
