//! Payloads, callbacks and URI rules.
//!
//! Incoming traffic reaches application code through two callback types:
//!
//! | Callback | Receives | Returns |
//! |----------|----------|---------|
//! | [`EventHandler`] | [`Event`] published on a subscribed topic | nothing |
//! | [`Endpoint`] | [`Invocation`] of a registered procedure | call result |

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug_span;

use crate::error::{Error, Result};
use crate::identifiers::OwnerId;
use crate::transport::Progress;

// ============================================================================
// Types
// ============================================================================

/// Positional payload.
pub type Args = Vec<Value>;

/// Keyword payload.
pub type KwArgs = Map<String, Value>;

/// Callback for events on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Callback for invocations of a registered procedure.
pub type Endpoint = Arc<dyn Fn(Invocation) -> Result<Value> + Send + Sync>;

/// WAMP loose URI rule: dot-separated, non-empty components without
/// whitespace or `#`.
static URI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s.#]+\.)*([^\s.#]+)$").expect("valid regex"));

// ============================================================================
// Close Reasons
// ============================================================================

/// Close reasons passed to and reported by the transport.
pub mod reason {
    /// Deliberate, normal close.
    pub const NORMAL: &str = "wamp.close.normal";

    /// Close issued by `reconnect`.
    pub const RECONNECT: &str = "wamp.goodbye.reconnect";

    /// Involuntary transport loss.
    pub const LOST: &str = "lost";

    /// Transport closed after a deliberate close.
    pub const CLOSED: &str = "closed";

    /// Router could not be reached.
    pub const UNREACHABLE: &str = "unreachable";

    /// Router does not speak a supported protocol.
    pub const UNSUPPORTED: &str = "unsupported";
}

// ============================================================================
// Event
// ============================================================================

/// An event delivered to a subscription handler.
#[derive(Debug, Clone, Default)]
pub struct Event {
    /// Topic the event was published on.
    pub topic: String,
    /// Positional payload.
    pub args: Args,
    /// Keyword payload.
    pub kwargs: KwArgs,
    /// Router-supplied details.
    pub details: Map<String, Value>,
    /// Owner the handler was bound to, if any.
    pub owner: Option<OwnerId>,
}

// ============================================================================
// Invocation
// ============================================================================

/// A procedure invocation delivered to a registered endpoint.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Procedure being invoked.
    pub procedure: String,
    /// Positional arguments.
    pub args: Args,
    /// Keyword arguments.
    pub kwargs: KwArgs,
    /// Router-supplied details.
    pub details: Map<String, Value>,
    /// Owner the endpoint was bound to, if any.
    pub owner: Option<OwnerId>,
    /// Channel for progressive results, present when the caller asked.
    pub progress: Option<Progress>,
}

impl Invocation {
    /// Sends a progressive result to the caller.
    ///
    /// Returns `false` if the caller did not ask for progress or has gone.
    pub fn notify(&self, value: Value) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|progress| progress.send(value).is_ok())
    }
}

// ============================================================================
// Owner Binding
// ============================================================================

/// Binds an event handler to its owner.
///
/// The returned handler stamps every event with the owner and runs inside
/// a span naming it. Without an owner the handler is returned unchanged.
#[must_use]
pub fn bind_handler(handler: EventHandler, owner: Option<&OwnerId>) -> EventHandler {
    let Some(owner) = owner.cloned() else {
        return handler;
    };

    Arc::new(move |mut event: Event| {
        let _span = debug_span!("event", owner = %owner, topic = %event.topic).entered();
        event.owner = Some(owner.clone());
        handler(event);
    })
}

/// Binds a procedure endpoint to its owner.
#[must_use]
pub fn bind_endpoint(endpoint: Endpoint, owner: Option<&OwnerId>) -> Endpoint {
    let Some(owner) = owner.cloned() else {
        return endpoint;
    };

    Arc::new(move |mut invocation: Invocation| {
        let _span = debug_span!("invocation", owner = %owner, procedure = %invocation.procedure)
            .entered();
        invocation.owner = Some(owner.clone());
        endpoint(invocation)
    })
}

// ============================================================================
// URI Validation
// ============================================================================

/// Returns `true` if `uri` is a valid topic, procedure or realm name.
#[inline]
#[must_use]
pub fn is_valid_uri(uri: &str) -> bool {
    URI_PATTERN.is_match(uri)
}

/// Validates a topic, procedure or realm name.
///
/// # Errors
///
/// Returns [`Error::InvalidUri`] if the name breaks the URI rule.
pub fn validate_uri(uri: &str) -> Result<()> {
    if is_valid_uri(uri) {
        Ok(())
    } else {
        Err(Error::invalid_uri(uri))
    }
}

// ============================================================================
// Tests
// ============================================================================
