// Core infrastructure modules
pub mod core;

pub mod config;

#[cfg(test)]
mod test_utils;

pub use crate::config::Settings;
pub use crate::core::db::{ConnectionString, Database, Field, FromScalar, Reader};
pub use crate::core::events::{ErrorEvent, ExecuteEvent, ReadEvent, ScalarEvent};
pub use crate::core::{CdbError, Result};
