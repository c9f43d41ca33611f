//! Shared session coordinator.
//!
//! The [`Broker`] owns the single transport, the command queue and the
//! ownership registry. Every caller submits through it, whether or not a
//! session currently exists.
//!
//! # Phases
//!
//! ```text
//! Disconnected --open()--> Connecting --opened--> Connected
//!      ^                       |                      |
//!      +-------closed----------+-------closed---------+
//! ```
//!
//! A close with reason `"lost"` (or one forced by [`Broker::reconnect`])
//! marks the next open as a recovery. The broker cycles indefinitely.
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::{Broker, CommandOptions, transport::MemoryRouter};
//!
//! # async fn example() -> wamp_broker::Result<()> {
//! let broker = Broker::builder().connector(MemoryRouter::new()).build()?;
//!
//! let sub = broker.subscribe(None, "com.app.topic", |event| println!("{event:?}"), CommandOptions::new());
//! sub.await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::OwnerId;
use crate::protocol::{
    Args, CommandOptions, Event, Invocation, KwArgs, Operation, reason, validate_uri,
};
use crate::transport::{Connector, Details, Session, SessionListener, SessionObserver, Transport};

use super::builder::BrokerBuilder;
use super::command::Command;
use super::config::BrokerConfig;
use super::handle::ResultHandle;
use super::queue::CommandQueue;
use super::registry::{Registry, RegistryEntry};
use super::relay::Relay;
use super::scope::Scope;

// ============================================================================
// Phase
// ============================================================================

/// Connection phase of the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No session and no attempt in flight.
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// A session is live.
    Connected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

// ============================================================================
// Types
// ============================================================================

/// Mutable connection state, changed only under one lock.
struct State {
    /// Configuration for the next transport.
    config: BrokerConfig,

    /// Configuration changed since the transport was built.
    config_dirty: bool,

    /// Current phase.
    phase: Phase,

    /// Transport, built on first open.
    transport: Option<Arc<dyn Transport>>,

    /// Relay for the live session; present iff connected.
    relay: Option<Relay>,

    /// The most recent disconnect was involuntary.
    lost: bool,

    /// A reconnect is closing the session and will reopen it.
    reconnecting: bool,

    /// `close` was called; the next disconnect is deliberate.
    closing: bool,

    /// Commands awaiting a session, plus persistent replicas.
    queue: CommandQueue,
}

/// Internal shared state for the broker.
pub(crate) struct BrokerInner {
    /// Transport factory.
    connector: Arc<dyn Connector>,

    /// Runtime for completion tasks.
    runtime: Handle,

    /// Owner to live-entry mapping, shared with relays.
    registry: Arc<Mutex<Registry>>,

    /// Connection state.
    state: Mutex<State>,

    /// Serializes session calls so the session sees submission order.
    ///
    /// Held across session calls instead of `state`, so a session may call
    /// back into the broker from inside a method. Lock order: `dispatch`,
    /// then `state`, then `registry`.
    dispatch: ReentrantMutex<()>,
}

// ============================================================================
// Broker
// ============================================================================

/// Shared WAMP session broker.
///
/// The broker is responsible for:
/// - Opening the transport lazily and tracking its phase
/// - Queueing operations until a session exists, then relaying them in order
/// - Replaying persistent operations on every reconnect
/// - Releasing each owner's subscriptions and registrations on teardown
///
/// Clones share the same state; build one per process and pass it around.
#[derive(Clone)]
pub struct Broker {
    /// Shared inner state.
    pub(crate) inner: Arc<BrokerInner>,
}

// ============================================================================
// Broker - Display
// ============================================================================

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("phase", &self.phase())
            .field("queued", &self.queued_len())
            .field("registry", &self.registry_len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Broker - Construction
// ============================================================================

impl Broker {
    /// Creates a configuration builder for the broker.
    #[inline]
    #[must_use]
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    /// Creates a broker; nothing connects until [`open`](Self::open).
    pub(crate) fn new(config: BrokerConfig, connector: Arc<dyn Connector>, runtime: Handle) -> Self {
        let inner = BrokerInner {
            connector,
            runtime,
            registry: Arc::new(Mutex::new(Registry::new())),
            state: Mutex::new(State {
                config,
                config_dirty: false,
                phase: Phase::Disconnected,
                transport: None,
                relay: None,
                lost: false,
                reconnecting: false,
                closing: false,
                queue: CommandQueue::new(),
            }),
            dispatch: ReentrantMutex::new(()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }
}

// ============================================================================
// Broker - Lifecycle
// ============================================================================

impl Broker {
    /// Starts a connection attempt unless one is live or in flight.
    ///
    /// Builds the transport from the merged configuration on first use.
    /// Returns `false` only if the transport could not be built.
    pub fn open(&self) -> bool {
        self.inner.open()
    }

    /// Tears down every owner, then closes the session.
    ///
    /// The queue is cleared once the session closes, persistent commands
    /// included; only [`reconnect`](Self::reconnect) and involuntary loss
    /// keep them for replay. No-op unless connected.
    pub fn close(&self, reason: &str, message: Option<&str>) {
        let transport = {
            let _order = self.inner.dispatch.lock();
            let (transport, relay) = {
                let mut state = self.inner.state.lock();
                let Some(transport) = state.transport.clone() else {
                    return;
                };
                if !transport.is_connected() {
                    return;
                }
                state.closing = true;
                (transport, state.relay.clone())
            };
            if let Some(relay) = relay {
                let entries = self.inner.registry.lock().take_all();
                debug!(count = entries.len(), "Releasing all owners before close");
                relay.release_entries(entries);
            }
            transport
        };

        info!(reason, "Closing session");
        transport.close(reason, message);
    }

    /// Closes with `wamp.goodbye.reconnect` and opens again.
    ///
    /// The next open is logged as a recovery. Without a live session this
    /// just opens.
    pub fn reconnect(&self) -> bool {
        let connected = {
            let mut state = self.inner.state.lock();
            let connected = state.transport.as_ref().is_some_and(|t| t.is_connected());
            if connected {
                state.reconnecting = true;
            } else {
                state.lost = true;
            }
            connected
        };

        info!(connected, "Reconnecting");
        if connected {
            self.close(reason::RECONNECT, None);
            true
        } else {
            self.open()
        }
    }

    /// Merges a configuration overlay for the next connection attempt.
    ///
    /// An idle transport is rebuilt on the next open; a live one keeps its
    /// configuration until it closes. An overlay with `"lazy_open": false`
    /// opens immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the overlay does not merge or the result is
    /// invalid; the previous configuration is kept.
    pub fn configure(&self, overlay: &Value) -> Result<()> {
        let open_now = {
            let mut state = self.inner.state.lock();
            let mut config = state.config.clone();
            config.merge(overlay)?;
            config.validate()?;
            state.config = config;
            state.config_dirty = true;
            !state.config.lazy_open
        };

        if open_now {
            self.open();
        }
        Ok(())
    }

    /// Returns `true` while a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport().is_some_and(|t| t.is_connected())
    }

    /// Returns `true` while connected or connecting.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport().is_some_and(|t| t.is_open())
    }

    /// Returns `true` while the transport is retrying.
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.transport().is_some_and(|t| t.is_retrying())
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.state.lock().transport.clone()
    }
}

// ============================================================================
// Broker - Operations
// ============================================================================

impl Broker {
    /// Submits an operation on behalf of `owner`.
    ///
    /// With a live session the operation is relayed now; otherwise it waits
    /// in the queue and a connection attempt starts. An attempt that fails
    /// rejects the non-persistent commands it was carrying with
    /// [`Error::Connection`]. Never fails synchronously: errors settle the
    /// returned handle.
    pub fn submit(
        &self,
        owner: Option<OwnerId>,
        operation: Operation,
        options: CommandOptions,
    ) -> ResultHandle {
        if let Err(e) = validate_uri(operation.name()) {
            debug!(kind = %operation.kind(), name = operation.name(), "Rejected invalid URI");
            return ResultHandle::settled(operation.kind(), operation.name(), Err(e));
        }

        let (command, handle) = Command::new(owner, operation, options);
        let order = self.inner.dispatch.lock();
        let relayed = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if state.config.debug {
                debug!(
                    command = %command.id,
                    owner = ?command.owner,
                    kind = %command.kind(),
                    name = command.name(),
                    persist = command.is_persistent(),
                    "Submitted"
                );
            }

            if let Some(standing) = command.kind().released() {
                let cancelled =
                    state
                        .queue
                        .cancel_standing(command.owner.as_ref(), standing, command.name());
                if cancelled > 0 {
                    debug!(name = command.name(), cancelled, "Cancelled persistent replays");
                }
            }

            match state.relay.clone() {
                Some(relay) => {
                    state.queue.retain_standing(&command);
                    Some((relay, command))
                }
                None => {
                    trace!(command = %command.id, queued = state.queue.len() + 1, "Queued until session opens");
                    state.queue.push(command);
                    None
                }
            }
        };

        match relayed {
            Some((relay, command)) => relay.dispatch(command),
            None => {
                drop(order);
                self.open();
            }
        }
        handle
    }

    /// Subscribes `handler` to `topic`.
    ///
    /// Resolves with the session handle. Owned subscriptions are released
    /// when the owner is torn down.
    pub fn subscribe<F>(
        &self,
        owner: Option<OwnerId>,
        topic: impl Into<String>,
        handler: F,
        options: CommandOptions,
    ) -> ResultHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let operation = Operation::Subscribe {
            topic: topic.into(),
            handler: Arc::new(handler),
        };
        self.submit(owner, operation, options)
    }

    /// Cancels the owner's subscriptions to `topic`.
    pub fn unsubscribe(&self, owner: Option<OwnerId>, topic: impl Into<String>) -> ResultHandle {
        let operation = Operation::Unsubscribe {
            topic: topic.into(),
        };
        self.submit(owner, operation, CommandOptions::new())
    }

    /// Publishes an event to `topic`.
    pub fn publish(
        &self,
        owner: Option<OwnerId>,
        topic: impl Into<String>,
        args: Args,
        kwargs: KwArgs,
        options: CommandOptions,
    ) -> ResultHandle {
        let operation = Operation::Publish {
            topic: topic.into(),
            args,
            kwargs,
        };
        self.submit(owner, operation, options)
    }

    /// Calls `procedure`; resolves with its result.
    pub fn call(
        &self,
        owner: Option<OwnerId>,
        procedure: impl Into<String>,
        args: Args,
        kwargs: KwArgs,
        options: CommandOptions,
    ) -> ResultHandle {
        let operation = Operation::Call {
            procedure: procedure.into(),
            args,
            kwargs,
        };
        self.submit(owner, operation, options)
    }

    /// Registers `endpoint` for `procedure`.
    pub fn register<F>(
        &self,
        owner: Option<OwnerId>,
        procedure: impl Into<String>,
        endpoint: F,
        options: CommandOptions,
    ) -> ResultHandle
    where
        F: Fn(Invocation) -> Result<Value> + Send + Sync + 'static,
    {
        let operation = Operation::Register {
            procedure: procedure.into(),
            endpoint: Arc::new(endpoint),
        };
        self.submit(owner, operation, options)
    }

    /// Cancels the owner's registrations of `procedure`.
    pub fn unregister(&self, owner: Option<OwnerId>, procedure: impl Into<String>) -> ResultHandle {
        let operation = Operation::Unregister {
            procedure: procedure.into(),
        };
        self.submit(owner, operation, CommandOptions::new())
    }
}

// ============================================================================
// Broker - Ownership
// ============================================================================

impl Broker {
    /// Releases everything `owner` holds and forgets its queued commands.
    ///
    /// Each registry entry gets one un-operation by handle. Without a live
    /// session there is nothing to release. Returns the number of releases
    /// issued.
    pub fn teardown_owner(&self, owner: &OwnerId) -> usize {
        let _order = self.inner.dispatch.lock();
        let relay = {
            let mut state = self.inner.state.lock();
            let forgotten = state.queue.forget_owner(owner);
            if !forgotten.is_empty() {
                debug!(%owner, count = forgotten.len(), "Forgot queued commands");
            }
            state.relay.clone()
        };

        let Some(relay) = relay else {
            return 0;
        };
        let entries = self.inner.registry.lock().take_owner(owner);
        let count = entries.len();
        if count > 0 {
            debug!(%owner, count, "Tearing down owner");
        }
        relay.release_entries(entries);
        count
    }

    /// Releases every owner's entries.
    ///
    /// Returns the number of releases issued.
    pub fn teardown_all(&self) -> usize {
        let _order = self.inner.dispatch.lock();
        let Some(relay) = self.inner.state.lock().relay.clone() else {
            return 0;
        };
        let entries = self.inner.registry.lock().take_all();
        let count = entries.len();
        debug!(count, "Tearing down all owners");
        relay.release_entries(entries);
        count
    }

    /// Returns a facade submitting everything as `owner`.
    ///
    /// Dropping the scope tears the owner down.
    #[must_use]
    pub fn scope(&self, owner: OwnerId) -> Scope {
        Scope::new(self.clone(), owner)
    }

    /// Returns a scope with a freshly generated owner.
    #[must_use]
    pub fn scope_generated(&self) -> Scope {
        self.scope(OwnerId::generate())
    }

    /// Returns a scope keyed by component type name and instance id.
    #[must_use]
    pub fn scope_for_component(&self, type_name: &str, instance_id: impl fmt::Display) -> Scope {
        self.scope(OwnerId::from_component(type_name, instance_id))
    }
}

// ============================================================================
// Broker - Inspection
// ============================================================================

impl Broker {
    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Returns the live session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] unless connected.
    pub fn session(&self) -> Result<Arc<dyn Session>> {
        self.inner
            .state
            .lock()
            .relay
            .as_ref()
            .map(Relay::session)
            .ok_or(Error::NoSession)
    }

    /// Returns the number of commands waiting for a session.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.inner.state.lock().queue.unrelayed_len()
    }

    /// Returns the number of persistent commands kept for replay.
    #[must_use]
    pub fn standing_len(&self) -> usize {
        let state = self.inner.state.lock();
        state.queue.len() - state.queue.unrelayed_len()
    }

    /// Returns the number of tracked subscriptions and registrations.
    #[must_use]
    pub fn registry_len(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Returns `owner`'s tracked entries, in registration order.
    #[must_use]
    pub fn owner_entries(&self, owner: &OwnerId) -> Vec<RegistryEntry> {
        self.inner.registry.lock().entries(owner)
    }

    /// Returns the merged configuration.
    #[must_use]
    pub fn config(&self) -> BrokerConfig {
        self.inner.state.lock().config.clone()
    }

    /// Returns `true` if the most recent disconnect was involuntary.
    #[must_use]
    pub fn was_lost(&self) -> bool {
        self.inner.state.lock().lost
    }
}

// ============================================================================
// BrokerInner - Transitions
// ============================================================================

impl BrokerInner {
    fn open(self: &Arc<Self>) -> bool {
        let transport = {
            let mut state = self.state.lock();

            let idle = state.transport.as_ref().is_some_and(|t| !t.is_open());
            if idle && state.config_dirty {
                debug!("Rebuilding transport with new configuration");
                state.transport = None;
            }

            if state.transport.is_none() {
                let observer = Arc::downgrade(self) as Weak<dyn SessionObserver>;
                match self.connector.connect(&state.config, SessionListener::new(observer)) {
                    Ok(transport) => {
                        state.transport = Some(Arc::from(transport));
                        state.config_dirty = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to build transport");
                        return false;
                    }
                }
            }

            let Some(transport) = state.transport.clone() else {
                return false;
            };

            if transport.is_open() {
                return true;
            }
            state.phase = Phase::Connecting;
            transport
        };

        debug!("Opening connection");
        transport.open();
        true
    }
}

impl SessionObserver for BrokerInner {
    fn session_opened(self: Arc<Self>, session: Arc<dyn Session>, mut details: Details) {
        let order = self.dispatch.lock();
        let (relay, backlog, hook) = {
            let mut state = self.state.lock();
            let relay = Relay::new(
                Arc::clone(&session),
                Arc::clone(&self.registry),
                self.runtime.clone(),
            );

            let backlog = state.queue.drain_for_relay();
            let recovered = state.lost;
            if recovered {
                info!(replayed = backlog.len(), "Session re-established after loss");
            } else {
                info!(relayed = backlog.len(), "Session opened, relaying backlog");
            }

            state.relay = Some(relay.clone());
            state.phase = Phase::Connected;
            state.lost = false;
            details.insert("recovered".into(), Value::Bool(recovered));
            (relay, backlog, state.config.on_open.clone())
        };

        for command in backlog {
            relay.dispatch(command);
        }
        drop(order);

        if let Some(hook) = hook {
            hook(&session, &details);
        }
    }

    fn session_closed(self: Arc<Self>, close_reason: &str, details: Details) {
        let (hook, reopen) = {
            let mut state = self.state.lock();
            let reopen = std::mem::take(&mut state.reconnecting);
            let deliberate = std::mem::take(&mut state.closing) && !reopen;
            let was_connected = state.relay.take().is_some();

            state.lost = close_reason == reason::LOST || reopen;
            state.phase = Phase::Disconnected;

            let discarded = self.registry.lock().reset();
            let dropped = if deliberate {
                state.queue.clear()
            } else {
                state.queue.abandon()
            };
            let abandoned = dropped.len();

            // A failed attempt tells its callers why; other drops abandon.
            if !was_connected {
                let message = attempt_failure(close_reason, &details);
                for responder in dropped.into_iter().filter_map(|c| c.responder) {
                    responder.settle(Err(Error::connection(message.clone())));
                }
            }

            if state.lost || !was_connected {
                warn!(
                    reason = close_reason,
                    lost = state.lost,
                    discarded,
                    abandoned,
                    "Session closed"
                );
            } else {
                info!(reason = close_reason, discarded, abandoned, "Session closed");
            }
            (state.config.on_close.clone(), reopen)
        };

        if let Some(hook) = hook {
            hook(close_reason, &details);
        }
        if reopen {
            self.open();
        }
    }
}

/// Describes a failed connection attempt from its close reason and details.
fn attempt_failure(close_reason: &str, details: &Details) -> String {
    match details.get("message").and_then(Value::as_str) {
        Some(message) => format!("{close_reason}: {message}"),
        None => close_reason.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
