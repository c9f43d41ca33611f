//! Connection lifecycle contract.
//!
//! The transport provider owns the physical link to the router. The broker
//! drives it through [`Transport`] and learns about session changes through
//! the [`SessionListener`] it hands to the [`Connector`].
//!
//! # Lifecycle
//!
//! 1. `Connector::connect` - Build the transport from the merged configuration
//! 2. `Transport::open` - Start connecting (never blocks)
//! 3. `SessionListener::opened` - Session established, queued work drains
//! 4. `SessionListener::closed` - Session gone (`"lost"` for involuntary loss)
//! 5. `Transport::open` again - Another cycle; the broker never terminates

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tracing::trace;

use crate::broker::BrokerConfig;
use crate::error::Result;

use super::Session;

// ============================================================================
// Types
// ============================================================================

/// Details accompanying an open or close notification.
pub type Details = Map<String, Value>;

// ============================================================================
// Transport
// ============================================================================

/// The physical connection to the router.
///
/// All methods return immediately. `open` and `close` report their outcome
/// later through the [`SessionListener`].
pub trait Transport: Send + Sync {
    /// Starts connecting. Ignored while already open or opening.
    fn open(&self);

    /// Closes the session with a reason URI and optional message.
    fn close(&self, reason: &str, message: Option<&str>);

    /// Returns `true` while a session is established.
    fn is_connected(&self) -> bool;

    /// Returns `true` while connected or connecting.
    fn is_open(&self) -> bool;

    /// Returns `true` while the transport is retrying after a failure.
    fn is_retrying(&self) -> bool;
}

// ============================================================================
// Connector
// ============================================================================

/// Factory for transports.
pub trait Connector: Send + Sync {
    /// Builds a transport from the merged configuration.
    ///
    /// Must not start connecting; the broker calls [`Transport::open`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot produce a transport.
    fn connect(&self, config: &BrokerConfig, listener: SessionListener)
    -> Result<Box<dyn Transport>>;
}

// ============================================================================
// SessionObserver
// ============================================================================

/// Receiver of session lifecycle notifications.
///
/// Implemented by the broker. Exposed so transports can be exercised on
/// their own.
pub trait SessionObserver: Send + Sync {
    /// A session was established.
    fn session_opened(self: Arc<Self>, session: Arc<dyn Session>, details: Details);

    /// The session closed or the connection attempt failed.
    fn session_closed(self: Arc<Self>, reason: &str, details: Details);
}

// ============================================================================
// SessionListener
// ============================================================================

/// The `onopen`/`onclose` hooks a transport calls.
///
/// Holds the observer weakly so a transport never keeps the broker alive.
/// Either hook may be called from any thread, including from inside a
/// [`Session`] or [`Transport`] method that is still running.
#[derive(Clone)]
pub struct SessionListener {
    observer: Weak<dyn SessionObserver>,
}

impl SessionListener {
    /// Creates a listener forwarding to `observer`.
    #[must_use]
    pub fn new(observer: Weak<dyn SessionObserver>) -> Self {
        Self { observer }
    }

    /// Reports an established session.
    pub fn opened(&self, session: Arc<dyn Session>, details: Details) {
        match self.observer.upgrade() {
            Some(observer) => observer.session_opened(session, details),
            None => trace!("Session opened after observer dropped"),
        }
    }

    /// Reports a closed session or failed attempt.
    pub fn closed(&self, reason: &str, details: Details) {
        match self.observer.upgrade() {
            Some(observer) => observer.session_closed(reason, details),
            None => trace!(reason, "Session closed after observer dropped"),
        }
    }
}

impl fmt::Debug for SessionListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionListener")
            .field("alive", &(self.observer.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
