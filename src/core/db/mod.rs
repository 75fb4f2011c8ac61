/// Database Module
///
/// This module provides the facade over the SQLite client, organized into
/// focused submodules.
///
/// ## Architecture
///
/// - **Batches** (`batch.rs`): running every statement of a multi-statement SQL text
/// - **Connection strings** (`connection.rs`): endpoint description and opening connections
/// - **Facade** (`database.rs`): statement execution, scalars and reader initiation
/// - **Reader** (`reader.rs`): forward-only cursor with typed column accessors
/// - **Values** (`value.rs`): scalar conversions and their default outputs
///
/// ## Error Handling
///
/// All operations return `CdbError` and leave the facade disconnected on failure.
pub(crate) mod batch;
pub mod connection;
pub mod database;
pub mod reader;
pub mod value;

pub use connection::ConnectionString;
pub use database::Database;
pub use reader::{Field, Reader};
pub use value::FromScalar;
