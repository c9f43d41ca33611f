//! Session contract.
//!
//! A [`Session`] is one live WAMP session supplied by the transport
//! provider. Each method issues its request before returning and hands back
//! a future for the outcome, so the order in which the broker calls the
//! session is the order the router observes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::HandleId;
use crate::protocol::{Args, CommandOptions, Endpoint, EventHandler, KwArgs, OperationKind};

// ============================================================================
// Types
// ============================================================================

/// Future returned by every session operation.
pub type SessionFuture<T> = BoxFuture<'static, Result<T>>;

/// Sender for progressive call results.
pub type Progress = tokio::sync::mpsc::UnboundedSender<Value>;

// ============================================================================
// SessionHandle
// ============================================================================

/// A subscription or registration issued by a session.
///
/// Needed to cancel it later. Only meaningful for the session that issued
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Session-assigned identifier.
    pub id: HandleId,
    /// Topic or procedure URI.
    pub uri: String,
    /// `Subscribe` or `Register`.
    pub kind: OperationKind,
}

impl SessionHandle {
    /// Creates a new handle.
    #[inline]
    #[must_use]
    pub fn new(id: HandleId, uri: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id,
            uri: uri.into(),
            kind,
        }
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})#{}", self.kind, self.uri, self.id)
    }
}

// ============================================================================
// Release
// ============================================================================

/// Target of an unsubscribe or unregister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// Cancel exactly this subscription or registration.
    Handle(SessionHandle),
    /// Cancel everything this session holds on the URI.
    Uri(String),
}

impl Release {
    /// Returns the URI being released.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        match self {
            Self::Handle(handle) => &handle.uri,
            Self::Uri(uri) => uri,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live session on the router.
///
/// Implementations must not call back into the broker synchronously from
/// these methods; handler and endpoint invocations happen later, from the
/// transport's own tasks or from the returned futures.
pub trait Session: Send + Sync {
    /// Subscribes `handler` to `topic`.
    fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        options: &CommandOptions,
    ) -> SessionFuture<SessionHandle>;

    /// Cancels one subscription, or every subscription on a topic.
    fn unsubscribe(&self, target: Release) -> SessionFuture<()>;

    /// Registers `endpoint` for `procedure`.
    fn register(
        &self,
        procedure: &str,
        endpoint: Endpoint,
        options: &CommandOptions,
    ) -> SessionFuture<SessionHandle>;

    /// Cancels one registration, or every registration of a procedure.
    fn unregister(&self, target: Release) -> SessionFuture<()>;

    /// Publishes an event; resolves with the publication acknowledgement.
    fn publish(
        &self,
        topic: &str,
        args: Args,
        kwargs: KwArgs,
        options: &CommandOptions,
    ) -> SessionFuture<Value>;

    /// Calls a procedure; resolves with its result.
    ///
    /// Progressive results are sent on `progress` when requested.
    fn call(
        &self,
        procedure: &str,
        args: Args,
        kwargs: KwArgs,
        options: &CommandOptions,
        progress: Option<Progress>,
    ) -> SessionFuture<Value>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = SessionHandle::new(HandleId::new(7), "com.app.topic", OperationKind::Subscribe);
        assert_eq!(handle.to_string(), "subscribe(com.app.topic)#7");
    }

    #[test]
    fn test_release_uri() {
        let handle = SessionHandle::new(HandleId::new(1), "com.app.echo", OperationKind::Register);
        assert_eq!(Release::Handle(handle).uri(), "com.app.echo");
        assert_eq!(Release::Uri("com.app.topic".into()).uri(), "com.app.topic");
    }
}
