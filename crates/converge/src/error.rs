//! Error types for reconciliation.
//!
//! Every failure of a reconciliation maps to exactly one [`ErrorKind`].
//! Errors carry the resource they concern and, for remote failures, the
//! operation that failed and the facade error underneath.

use sacloud::{ErrorCategory, ObservedStatus, ResourceRef};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy exposed at the invocation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Credentials or zone rejected
    #[serde(rename = "AuthError")]
    Auth,
    /// A referenced object or catalog entry does not exist
    #[serde(rename = "NotFoundError")]
    NotFound,
    /// Missing or contradictory parameters; nothing was sent remotely
    #[serde(rename = "ValidationError")]
    Validation,
    /// The remote state forbids the requested transition
    #[serde(rename = "PreconditionError")]
    Precondition,
    /// The remote API rejected or failed a call
    #[serde(rename = "RemoteOperationError")]
    RemoteOperation,
    /// An expected status was not observed within the poll budget
    #[serde(rename = "TimeoutError")]
    Timeout,
}

impl ErrorKind {
    /// Name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AuthError",
            Self::NotFound => "NotFoundError",
            Self::Validation => "ValidationError",
            Self::Precondition => "PreconditionError",
            Self::RemoteOperation => "RemoteOperationError",
            Self::Timeout => "TimeoutError",
        }
    }

    /// Get actionable advice for resolving this kind of error.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Auth => "Check the access token, its secret and the zone",
            Self::NotFound => "Verify the id and that it lives in the selected zone",
            Self::Validation => "Fix the parameters; nothing was changed",
            Self::Precondition => "Bring the resource into the required state first",
            Self::RemoteOperation => {
                "Earlier steps were not rolled back; inspect the resource before retrying"
            }
            Self::Timeout => "The resource may still be transitioning; run again to keep waiting",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while reconciling a resource.
#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("cannot reconcile {resource}: {reason}")]
    Precondition { resource: ResourceRef, reason: String },

    #[error("{operation} failed for {resource}: {cause}")]
    RemoteOperation {
        operation: &'static str,
        resource: ResourceRef,
        #[source]
        cause: sacloud::Error,
    },

    #[error(
        "timed out after {attempts} observation(s) waiting for {resource} to become {expected} (last observed: {})",
        last_seen(.last_observed)
    )]
    Timeout {
        resource: ResourceRef,
        expected: ObservedStatus,
        last_observed: Option<ObservedStatus>,
        attempts: u32,
    },
}

fn last_seen(status: &Option<ObservedStatus>) -> String {
    status.map_or_else(|| "nothing".to_string(), |s| s.to_string())
}

impl Error {
    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Precondition { .. } => ErrorKind::Precondition,
            Error::RemoteOperation { .. } => ErrorKind::RemoteOperation,
            Error::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn precondition(resource: &ResourceRef, reason: impl Into<String>) -> Self {
        Error::Precondition {
            resource: resource.clone(),
            reason: reason.into(),
        }
    }

    /// Converter for failures of a mutating call.
    ///
    /// Every facade error becomes [`Error::RemoteOperation`], whatever its
    /// category.
    pub fn remote(
        operation: &'static str,
        resource: &ResourceRef,
    ) -> impl FnOnce(sacloud::Error) -> Self {
        let resource = resource.clone();
        move |cause| Error::RemoteOperation {
            operation,
            resource,
            cause,
        }
    }

    /// Converter for failures of a read-only call.
    ///
    /// Missing objects and rejected credentials keep their meaning; any
    /// other failure is reported as a failed remote operation.
    pub fn lookup(
        operation: &'static str,
        resource: &ResourceRef,
    ) -> impl FnOnce(sacloud::Error) -> Self {
        let resource = resource.clone();
        move |cause| match cause.category() {
            ErrorCategory::NotFound => Error::NotFound(cause.to_string()),
            ErrorCategory::Auth => Error::Auth(cause.to_string()),
            _ => Error::RemoteOperation {
                operation,
                resource,
                cause,
            },
        }
    }
}
