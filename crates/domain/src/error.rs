//! Error classification shared across the order core.

use serde::Serialize;

/// Broad category of a failure, independent of which layer produced it.
///
/// Callers map these to transport codes; the categories themselves decide
/// whether state may have changed (only `Internal` can leave partial work,
/// and the services are arranged so that it never does).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input. No state change.
    Validation,

    /// Order, product or address absent. No state change.
    NotFound,

    /// The actor does not own the resource or lacks the role.
    Forbidden,

    /// Illegal transition, already-processed payment, concurrent write.
    Conflict,

    /// Not enough stock. Partial reservations are rolled back first.
    InsufficientResource,

    /// Downstream outcome unknown (e.g. payment timeout).
    Unavailable,

    /// Storage or other unexpected failure.
    Internal,
}

/// Implemented by every error type that can reach a caller.
pub trait Classify {
    /// Returns the broad category of the error.
    fn kind(&self) -> ErrorKind;

    /// Returns a stable, machine-readable reason code.
    fn code(&self) -> &'static str;
}
