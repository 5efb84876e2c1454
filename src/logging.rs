//! The `Logger` seam. The engine never constructs one itself — there is no
//! process-wide logger or singleton; an embedder supplies one at
//! [`crate::Connection::open`] time, or nothing (see [`NullLogger`]).

/// A minimal sink an embedder provides for host-observable diagnostics.
/// Mirrors the two-method (`log`, `error`) logging transport the platform
/// collaborator supplies in the original design.
pub trait Logger {
    fn log(&self, message: &str);
    fn error(&self, message: &str);
}

/// Discards everything. The default when no logger is supplied.
#[derive(Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards to `tracing`, at `debug` and `error` levels respectively.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::debug!(target: "docsql_core", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "docsql_core", "{message}");
    }
}
