/// Notification Module
///
/// Payload records delivered to observers of a `Database` or `Reader`, and
/// the callback lists that deliver them. Payloads are built when an event
/// fires, handed to every registered callback in registration order, then
/// dropped.
use std::fmt;
use std::sync::Arc;

/// Raised when an operation fails; carries the underlying message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorEvent {
            message: message.into(),
        }
    }
}

/// Raised after a non-query statement has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteEvent {
    /// SQL text that was executed
    pub sql: String,
    /// Number of rows the statement affected
    pub result: usize,
    /// Row count the caller asserted, if any
    pub expected: Option<usize>,
    /// `true` only when an expectation was given and `result` matched it
    pub success: bool,
}

impl ExecuteEvent {
    pub fn new(sql: impl Into<String>, result: usize, expected: Option<usize>) -> Self {
        ExecuteEvent {
            sql: sql.into(),
            result,
            expected,
            success: expected == Some(result),
        }
    }
}

/// Raised by a `Reader` each time a row is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadEvent {
    pub row: i32,
}

/// Raised when a scalar query yields a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarEvent {
    pub sql: String,
    /// The raw value rendered as text, before any type conversion
    pub value: String,
}

impl ScalarEvent {
    pub fn new(sql: impl Into<String>, value: impl Into<String>) -> Self {
        ScalarEvent {
            sql: sql.into(),
            value: value.into(),
        }
    }
}

/// A shared observer callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of callbacks for one event name.
pub struct Handlers<T> {
    callbacks: Vec<Callback<T>>,
}

impl<T> Handlers<T> {
    pub fn new() -> Self {
        Handlers {
            callbacks: Vec::new(),
        }
    }

    /// Registers a callback; callbacks fire in registration order
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// Delivers `event` synchronously to every callback
    pub fn notify(&self, event: &T) {
        for callback in &self.callbacks {
            callback(event);
        }
    }
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Handlers::new()
    }
}

impl<T> Clone for Handlers<T> {
    fn clone(&self) -> Self {
        Handlers {
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<T> fmt::Debug for Handlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// The callback lists a `Database` notifies.
///
/// Lifecycle events (connect, disconnect, dispose) carry no payload.
#[derive(Debug, Clone, Default)]
pub struct Observers {
    pub connect: Handlers<()>,
    pub disconnect: Handlers<()>,
    pub dispose: Handlers<()>,
    pub error: Handlers<ErrorEvent>,
    pub execute: Handlers<ExecuteEvent>,
    pub scalar: Handlers<ScalarEvent>,
}
