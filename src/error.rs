//! Error types for the WAMP broker.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Broker operations never fail synchronously. Every submitted command
//! returns a [`ResultHandle`](crate::broker::ResultHandle) which settles with
//! [`Result<T>`]:
//!
//! ```ignore
//! use wamp_broker::{Broker, Result};
//!
//! async fn example(broker: &Broker) -> Result<()> {
//!     let value = broker
//!         .call(None, "com.app.add", vec![1.into(), 2.into()], Default::default(), Default::default())
//!         .await?;
//!     println!("{value:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUri`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::NoSession`] |
//! | Operation | [`Error::Operation`] |
//! | Abandonment | [`Error::Abandoned`] |
//! | External | [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::protocol::OperationKind;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when broker configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Topic, procedure or realm is not a valid WAMP URI.
    #[error("Invalid URI: {uri:?}")]
    InvalidUri {
        /// The rejected URI.
        uri: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// A connection attempt failed before a session opened.
    ///
    /// Settles the commands that attempt was carrying.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Session closed while an operation was relaying.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An operation needed a live session and there was none.
    #[error("No live session")]
    NoSession,

    // ========================================================================
    // Operation Errors
    // ========================================================================
    /// The session rejected an individual operation.
    ///
    /// Propagated verbatim to the caller, never retried.
    #[error("{kind} {name} failed: {message}")]
    Operation {
        /// Operation that failed.
        kind: OperationKind,
        /// Topic or procedure URI.
        name: String,
        /// Error URI or message reported by the session.
        message: String,
    },

    // ========================================================================
    // Abandonment
    // ========================================================================
    /// Command was dropped from the queue before a session picked it up.
    #[error("{kind} {name} abandoned before relay")]
    Abandoned {
        /// Operation that was abandoned.
        kind: OperationKind,
        /// Topic or procedure URI.
        name: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URI error.
    #[inline]
    pub fn invalid_uri(uri: impl Into<String>) -> Self {
        Self::InvalidUri { uri: uri.into() }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(
        kind: OperationKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an abandoned error.
    #[inline]
    pub fn abandoned(kind: OperationKind, name: impl Into<String>) -> Self {
        Self::Abandoned {
            kind,
            name: name.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::NoSession
        )
    }

    /// Returns `true` if the session rejected the operation itself.
    #[inline]
    #[must_use]
    pub fn is_operation_error(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    /// Returns `true` if the command never reached a session.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("router unreachable");
        assert_eq!(err.to_string(), "Connection failed: router unreachable");
    }

    #[test]
    fn test_operation_error_display() {
        let err = Error::operation(
            OperationKind::Call,
            "com.app.add",
            "wamp.error.no_such_procedure",
        );
        assert_eq!(
            err.to_string(),
            "call com.app.add failed: wamp.error.no_such_procedure"
        );
        assert!(err.is_operation_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::NoSession.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_abandoned() {
        let err = Error::abandoned(OperationKind::Subscribe, "com.app.topic");
        assert!(err.is_abandoned());
        assert_eq!(err.to_string(), "subscribe com.app.topic abandoned before relay");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_from_url_error() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = url_err.into();
        assert!(matches!(err, Error::Url(_)));
    }
}
