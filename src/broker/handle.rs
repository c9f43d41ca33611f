//! Deferred results of submitted commands.
//!
//! Every command gets exactly one [`ResultHandle`] at submission. The handle
//! is returned to the caller immediately and settles once, when the relay
//! completes. Its paired [`Responder`] travels with the command.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::protocol::OperationKind;
use crate::transport::{Progress, SessionHandle};

// ============================================================================
// Outcome
// ============================================================================

/// What a relayed command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Subscribe or register: the handle needed to cancel it.
    Handle(SessionHandle),
    /// Publish or call: the session's result.
    Value(Value),
    /// Unsubscribe or unregister acknowledged.
    Released,
}

impl Outcome {
    /// Returns the session handle, if any.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<&SessionHandle> {
        match self {
            Self::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Converts into a JSON value.
    ///
    /// Handles serialize to their JSON form, releases to `null`.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Handle(handle) => serde_json::to_value(handle).unwrap_or(Value::Null),
            Self::Released => Value::Null,
        }
    }
}

// ============================================================================
// Responder
// ============================================================================

/// Settling half of a [`ResultHandle`].
///
/// Dropping it unsettled makes the handle resolve to [`Error::Abandoned`].
#[derive(Debug)]
pub(crate) struct Responder {
    tx: oneshot::Sender<Result<Outcome>>,
    progress: Option<Progress>,
}

impl Responder {
    /// Settles the handle.
    pub(crate) fn settle(self, result: Result<Outcome>) {
        // Receiver gone means the caller stopped waiting.
        let _ = self.tx.send(result);
    }

    /// Returns the progress sender, if the caller asked for progress.
    pub(crate) fn progress(&self) -> Option<Progress> {
        self.progress.clone()
    }
}

// ============================================================================
// ResultHandle
// ============================================================================

/// Future result of a submitted command.
///
/// Resolves to the command's [`Outcome`], or to the error the session
/// reported. A handle never stays pending forever: a command carried by a
/// failed connection attempt resolves to [`Error::Connection`], and one
/// dropped before reaching a session for any other reason (owner teardown,
/// a deliberate close) resolves to [`Error::Abandoned`].
#[must_use = "a ResultHandle does nothing unless awaited"]
pub struct ResultHandle {
    kind: OperationKind,
    name: String,
    rx: oneshot::Receiver<Result<Outcome>>,
    progress: Option<mpsc::UnboundedReceiver<Value>>,
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl ResultHandle {
    /// Creates an unsettled handle and its responder.
    pub(crate) fn pending(
        kind: OperationKind,
        name: impl Into<String>,
        with_progress: bool,
    ) -> (Self, Responder) {
        let (tx, rx) = oneshot::channel();
        let (progress_tx, progress_rx) = if with_progress {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let handle = Self {
            kind,
            name: name.into(),
            rx,
            progress: progress_rx,
        };
        let responder = Responder {
            tx,
            progress: progress_tx,
        };
        (handle, responder)
    }

    /// Creates a handle that is already settled.
    pub(crate) fn settled(
        kind: OperationKind,
        name: impl Into<String>,
        result: Result<Outcome>,
    ) -> Self {
        let (handle, responder) = Self::pending(kind, name, false);
        responder.settle(result);
        handle
    }

    /// Returns the operation this handle belongs to.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns the topic or procedure URI.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Takes the receiver of progressive results.
    ///
    /// Present only for calls submitted with `receive_progress`.
    pub fn progress(&mut self) -> Option<mpsc::UnboundedReceiver<Value>> {
        self.progress.take()
    }

    /// Waits for a value-producing outcome.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn value(self) -> Result<Value> {
        Ok(self.await?.into_value())
    }

    /// Waits for the session handle of a subscribe or register.
    ///
    /// # Errors
    ///
    /// Returns the command's error, or [`Error::Config`] when awaited on an
    /// operation that yields no handle.
    pub async fn handle(self) -> Result<SessionHandle> {
        let kind = self.kind;
        match self.await? {
            Outcome::Handle(handle) => Ok(handle),
            _ => Err(Error::config(format!("{kind} does not produce a handle"))),
        }
    }
}

impl Future for ResultHandle {
    type Output = Result<Outcome>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(Error::abandoned(this.kind, this.name.clone())),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::identifiers::HandleId;

    #[tokio::test]
    async fn test_settle_resolves_handle() {
        let (handle, responder) = ResultHandle::pending(OperationKind::Call, "com.app.add", false);
        responder.settle(Ok(Outcome::Value(json!(3))));
        assert_eq!(handle.await.unwrap(), Outcome::Value(json!(3)));
    }

    #[test]
    fn test_unsettled_handle_is_pending() {
        let (handle, responder) = ResultHandle::pending(OperationKind::Call, "com.app.add", false);
        let mut task = tokio_test::task::spawn(handle);
        tokio_test::assert_pending!(task.poll());

        responder.settle(Ok(Outcome::Released));
        assert!(task.is_woken());
        tokio_test::assert_ready_ok!(task.poll());
    }

    #[tokio::test]
    async fn test_dropped_responder_abandons() {
        let (handle, responder) =
            ResultHandle::pending(OperationKind::Subscribe, "com.app.topic", false);
        drop(responder);

        let err = handle.await.unwrap_err();
        assert!(err.is_abandoned());
        assert!(err.to_string().contains("com.app.topic"));
    }

    #[tokio::test]
    async fn test_settled_handle() {
        let handle = ResultHandle::settled(
            OperationKind::Publish,
            "bad uri",
            Err(Error::invalid_uri("bad uri")),
        );
        assert!(matches!(handle.await, Err(Error::InvalidUri { .. })));
    }

    #[tokio::test]
    async fn test_progress_channel() {
        let (mut handle, responder) =
            ResultHandle::pending(OperationKind::Call, "com.app.count", true);
        let mut progress = handle.progress().expect("progress requested");
        assert!(handle.progress().is_none());

        responder.progress().unwrap().send(json!(1)).unwrap();
        responder.settle(Ok(Outcome::Value(json!("done"))));

        assert_eq!(progress.recv().await, Some(json!(1)));
        assert_eq!(handle.value().await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_handle_accessor() {
        let session_handle =
            SessionHandle::new(HandleId::new(9), "com.app.topic", OperationKind::Subscribe);
        let handle = ResultHandle::settled(
            OperationKind::Subscribe,
            "com.app.topic",
            Ok(Outcome::Handle(session_handle.clone())),
        );
        assert_eq!(handle.handle().await.unwrap(), session_handle);

        let handle = ResultHandle::settled(
            OperationKind::Unsubscribe,
            "com.app.topic",
            Ok(Outcome::Released),
        );
        assert!(handle.handle().await.is_err());
    }

    #[test]
    fn test_outcome_into_value() {
        assert_eq!(Outcome::Released.into_value(), Value::Null);
        assert_eq!(Outcome::Value(json!(1)).into_value(), json!(1));
        let handle = SessionHandle::new(HandleId::new(2), "a.b", OperationKind::Register);
        assert_eq!(Outcome::Handle(handle).into_value()["uri"], json!("a.b"));
    }
}
