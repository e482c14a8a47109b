//! Error types for SAKURA Cloud API operations.
//!
//! Errors are categorized so callers can tell a missing resource apart from
//! a rejected request or a transport failure without matching on messages.

use thiserror::Error;

use crate::types::ResourceKind;

/// Categories of API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credentials rejected or zone not accessible
    Auth,
    /// Referenced object does not exist
    NotFound,
    /// The API rejected the request
    Api,
    /// Connection, DNS or TLS failure
    Network,
    /// Response body could not be understood
    Decode,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Auth => "Authentication failed",
            Self::NotFound => "Resource not found",
            Self::Api => "Request rejected by the API",
            Self::Network => "Network connectivity issue",
            Self::Decode => "Unexpected API response",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Auth => "Check the access token, its secret and the zone",
            Self::NotFound => "Verify the resource id and the zone it lives in",
            Self::Api => {
                "Check the error details; the resource may be in a state that forbids this operation"
            }
            Self::Network => "Check your internet connection and try again",
            Self::Decode => "The API may have changed; check for a newer release",
        }
    }
}

/// Errors returned by a [`CloudApi`](crate::CloudApi) backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Object lookup by id failed
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// A catalog lookup (icon, plan, archive, address) yielded nothing
    #[error("{what} not found")]
    NoMatch { what: String },

    /// The API answered with an error status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer
    #[error("network error: {0}")]
    Network(String),

    /// The answer could not be decoded
    #[error("invalid API response: {0}")]
    Decode(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Auth { .. } => ErrorCategory::Auth,
            Error::NotFound { .. } | Error::NoMatch { .. } => ErrorCategory::NotFound,
            Error::Api { .. } => ErrorCategory::Api,
            Error::Network(_) => ErrorCategory::Network,
            Error::Decode(_) => ErrorCategory::Decode,
        }
    }

    /// Whether the error means the object is not there.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Build an error from an HTTP status code.
    ///
    /// 401/403 become [`Error::Auth`]; 404 becomes [`Error::NotFound`] when
    /// the request addressed a specific object.
    pub fn from_status(status: u16, target: Option<(ResourceKind, &str)>) -> Self {
        match (status, target) {
            (401 | 403, _) => Error::Auth {
                message: format!("HTTP {status}"),
            },
            (404, Some((kind, id))) => Error::NotFound {
                kind,
                id: id.to_string(),
            },
            _ => Error::Api {
                status,
                message: format!("HTTP {status}"),
            },
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::from_status(code, None),
            ureq::Error::Json(e) => Self::Decode(e.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_auth() {
        let err = Error::from_status(401, None);
        assert_eq!(err.category(), ErrorCategory::Auth);
        let err = Error::from_status(403, Some((ResourceKind::Compute, "1")));
        assert_eq!(err.category(), ErrorCategory::Auth);
    }

    #[test]
    fn test_from_status_not_found_needs_target() {
        let err = Error::from_status(404, Some((ResourceKind::Volume, "45")));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "disk not found: 45");

        let err = Error::from_status(404, None);
        assert_eq!(err.category(), ErrorCategory::Api);
    }

    #[test]
    fn test_no_match_is_not_found() {
        let err = Error::NoMatch {
            what: "icon like 'Ubuntu'".to_string(),
        };
        assert!(err.is_not_found());
    }

    #[test]
    fn test_category_text() {
        for category in [
            ErrorCategory::Auth,
            ErrorCategory::NotFound,
            ErrorCategory::Api,
            ErrorCategory::Network,
            ErrorCategory::Decode,
        ] {
            assert!(!category.description().is_empty());
            assert!(!category.advice().is_empty());
        }
    }
}
