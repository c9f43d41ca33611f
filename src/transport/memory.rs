//! In-process router.
//!
//! [`MemoryRouter`] implements [`Connector`], [`Transport`] and [`Session`]
//! without a network: publishes are routed to subscribers and calls to
//! registered endpoints within the process. It keeps a journal of every
//! session operation in the order it was issued, which makes it the
//! reference fake for tests and benches.
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::{Broker, transport::MemoryRouter};
//!
//! let router = MemoryRouter::new();
//! let broker = Broker::builder().connector(router.clone()).build()?;
//!
//! broker.publish(None, "com.app.topic", vec![], Default::default(), Default::default());
//! assert_eq!(router.journal().len(), 1);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::broker::BrokerConfig;
use crate::error::{Error, Result};
use crate::identifiers::HandleId;
use crate::protocol::{
    Args, CommandOptions, Endpoint, Event, EventHandler, Invocation, KwArgs, OperationKind,
    reason,
};

use super::connection::{Connector, Details, SessionListener, Transport};
use super::session::{Progress, Release, Session, SessionFuture, SessionHandle};

// ============================================================================
// Constants
// ============================================================================

/// Error URI for calls to unknown procedures.
const NO_SUCH_PROCEDURE: &str = "wamp.error.no_such_procedure";

/// Error URI for duplicate registrations.
const PROCEDURE_ALREADY_EXISTS: &str = "wamp.error.procedure_already_exists";

/// Error URI for releasing an unknown subscription.
const NO_SUCH_SUBSCRIPTION: &str = "wamp.error.no_such_subscription";

/// Error URI for releasing an unknown registration.
const NO_SUCH_REGISTRATION: &str = "wamp.error.no_such_registration";

// ============================================================================
// JournalEntry
// ============================================================================

/// One session operation as the router received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Session that issued the operation.
    pub session: u64,
    /// Operation kind.
    pub kind: OperationKind,
    /// Topic or procedure URI.
    pub name: String,
    /// Handle created or released, if any.
    pub handle: Option<HandleId>,
}

// ============================================================================
// Router State
// ============================================================================

/// A live subscription.
struct Subscription {
    id: HandleId,
    topic: String,
    session: u64,
    handler: EventHandler,
}

/// A live registration.
struct Registration {
    id: HandleId,
    session: u64,
    endpoint: Endpoint,
}

/// One transport's link to the router.
struct Link {
    listener: SessionListener,
    opening: AtomicBool,
    session: Mutex<Option<Arc<MemorySession>>>,
}

#[derive(Default)]
struct RouterState {
    next_id: u64,
    subscriptions: Vec<Subscription>,
    registrations: FxHashMap<String, Registration>,
    journal: Vec<JournalEntry>,
    links: Vec<Arc<Link>>,
    refusal: Option<String>,
    rejections: FxHashMap<(OperationKind, String), String>,
    severances: FxHashSet<(OperationKind, String)>,
    connect_attempts: usize,
}

impl RouterState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, session: u64, kind: OperationKind, name: &str, handle: Option<HandleId>) {
        self.journal.push(JournalEntry {
            session,
            kind,
            name: name.to_string(),
            handle,
        });
    }

    fn rejection(&self, kind: OperationKind, name: &str) -> Option<Error> {
        self.rejections
            .get(&(kind, name.to_string()))
            .map(|message| Error::operation(kind, name, message.clone()))
    }

    /// Removes everything a session holds.
    fn drop_session(&mut self, session: u64) {
        self.subscriptions.retain(|s| s.session != session);
        self.registrations.retain(|_, r| r.session != session);
    }
}

struct RouterInner {
    auto_accept: bool,
    state: Mutex<RouterState>,
}

impl RouterInner {
    /// Ends `link`'s session as an involuntary loss.
    ///
    /// The listener is notified with no router lock held.
    fn drop_link(&self, link: &Link) -> bool {
        let session = link.session.lock().take();
        let Some(session) = session else {
            return false;
        };
        session.alive.store(false, Ordering::SeqCst);
        self.state.lock().drop_session(session.id);
        debug!(session = session.id, "Memory session lost");
        link.listener.closed(reason::LOST, Details::new());
        true
    }
}

// ============================================================================
// MemoryRouter
// ============================================================================

/// In-process router and transport provider.
///
/// Clones share the same router.
#[derive(Clone)]
pub struct MemoryRouter {
    inner: Arc<RouterInner>,
}

impl fmt::Debug for MemoryRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryRouter")
            .field("auto_accept", &self.inner.auto_accept)
            .field("subscriptions", &state.subscriptions.len())
            .field("registrations", &state.registrations.len())
            .field("links", &state.links.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryRouter - Constructors
// ============================================================================

impl MemoryRouter {
    /// Creates a router that accepts every connection attempt immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_accept(true)
    }

    /// Creates a router that holds connection attempts until [`accept`].
    ///
    /// [`accept`]: MemoryRouter::accept
    #[must_use]
    pub fn manual() -> Self {
        Self::with_auto_accept(false)
    }

    fn with_auto_accept(auto_accept: bool) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                auto_accept,
                state: Mutex::new(RouterState::default()),
            }),
        }
    }
}

// ============================================================================
// MemoryRouter - Controls
// ============================================================================

impl MemoryRouter {
    /// Establishes every pending connection attempt.
    ///
    /// Returns the number of sessions opened.
    pub fn accept(&self) -> usize {
        let links: Vec<Arc<Link>> = self.inner.state.lock().links.clone();
        let mut opened = 0;
        for link in links {
            if link.opening.load(Ordering::SeqCst) && self.establish(&link) {
                opened += 1;
            }
        }
        opened
    }

    /// Drops every live session as an involuntary loss.
    ///
    /// Returns the number of sessions dropped.
    pub fn drop_connections(&self) -> usize {
        let links: Vec<Arc<Link>> = self.inner.state.lock().links.clone();
        links
            .iter()
            .filter(|link| self.inner.drop_link(link))
            .count()
    }

    /// Fails every pending connection attempt as unreachable.
    ///
    /// Returns the number of attempts failed.
    pub fn fail_pending(&self) -> usize {
        let links: Vec<Arc<Link>> = self.inner.state.lock().links.clone();
        let mut failed = 0;
        for link in links {
            if link.opening.swap(false, Ordering::SeqCst) {
                debug!("Memory connection attempt failed");
                link.listener.closed(reason::UNREACHABLE, Details::new());
                failed += 1;
            }
        }
        failed
    }

    /// Refuses future connection attempts with `reason`, or stops refusing.
    pub fn refuse(&self, message: Option<&str>) {
        self.inner.state.lock().refusal = message.map(str::to_string);
    }

    /// Rejects every future `kind` operation on `name` with `error`.
    pub fn reject(&self, kind: OperationKind, name: &str, error: &str) {
        self.inner
            .state
            .lock()
            .rejections
            .insert((kind, name.to_string()), error.to_string());
    }

    /// Drops the session that next issues `kind` on `name`.
    ///
    /// The loss is reported from inside that session call, before it
    /// answers, and the call itself fails. Fires once.
    pub fn sever_on(&self, kind: OperationKind, name: &str) {
        self.inner
            .state
            .lock()
            .severances
            .insert((kind, name.to_string()));
    }

    /// Delivers an event to every subscriber of `topic`, as if another
    /// client had published it.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, topic: &str, args: Args, kwargs: KwArgs) -> usize {
        let handlers = self.handlers_for(topic);
        let count = handlers.len();
        deliver(handlers, topic, args, kwargs, Details::new());
        count
    }
}

// ============================================================================
// MemoryRouter - Inspection
// ============================================================================

impl MemoryRouter {
    /// Returns every session operation received so far.
    #[must_use]
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner.state.lock().journal.clone()
    }

    /// Clears the journal.
    pub fn clear_journal(&self) {
        self.inner.state.lock().journal.clear();
    }

    /// Returns the number of connection attempts started.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.inner.state.lock().connect_attempts
    }

    /// Returns the number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner
            .state
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }

    /// Returns `true` if `procedure` has a live registration.
    #[must_use]
    pub fn is_registered(&self, procedure: &str) -> bool {
        self.inner
            .state
            .lock()
            .registrations
            .contains_key(procedure)
    }
}

// ============================================================================
// MemoryRouter - Internals
// ============================================================================

impl MemoryRouter {
    /// Opens a session on `link` and notifies its listener.
    fn establish(&self, link: &Arc<Link>) -> bool {
        if !link.opening.swap(false, Ordering::SeqCst) {
            return false;
        }

        let id = self.inner.state.lock().next_id();
        let session = Arc::new(MemorySession {
            id,
            router: Arc::downgrade(&self.inner),
            alive: AtomicBool::new(true),
        });
        *link.session.lock() = Some(Arc::clone(&session));

        debug!(session = id, "Memory session established");

        let mut details = Details::new();
        details.insert("session".into(), json!(id));
        link.listener.opened(session, details);
        true
    }

    fn handlers_for(&self, topic: &str) -> Vec<EventHandler> {
        self.inner
            .state
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }
}

impl Connector for MemoryRouter {
    fn connect(
        &self,
        config: &BrokerConfig,
        listener: SessionListener,
    ) -> Result<Box<dyn Transport>> {
        let link = Arc::new(Link {
            listener,
            opening: AtomicBool::new(false),
            session: Mutex::new(None),
        });
        self.inner.state.lock().links.push(Arc::clone(&link));

        trace!(realm = ?config.realm, "Memory transport created");

        Ok(Box::new(MemoryTransport {
            router: self.clone(),
            link,
        }))
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport half of the in-process router.
struct MemoryTransport {
    router: MemoryRouter,
    link: Arc<Link>,
}

impl Transport for MemoryTransport {
    fn open(&self) {
        if self.is_open() {
            return;
        }

        let refusal = {
            let mut state = self.router.inner.state.lock();
            state.connect_attempts += 1;
            state.refusal.clone()
        };

        if let Some(message) = refusal {
            debug!(%message, "Memory router refused connection");
            let mut details = Details::new();
            details.insert("message".into(), Value::String(message));
            self.link.listener.closed(reason::UNREACHABLE, details);
            return;
        }

        self.link.opening.store(true, Ordering::SeqCst);
        if self.router.inner.auto_accept {
            self.router.establish(&self.link);
        }
    }

    fn close(&self, reason: &str, message: Option<&str>) {
        let session = self.link.session.lock().take();
        let Some(session) = session else {
            self.link.opening.store(false, Ordering::SeqCst);
            return;
        };

        session.alive.store(false, Ordering::SeqCst);
        self.router.inner.state.lock().drop_session(session.id);

        let mut details = Details::new();
        details.insert("reason".into(), json!(reason));
        if let Some(message) = message {
            details.insert("message".into(), json!(message));
        }
        debug!(session = session.id, reason, "Memory session closed");
        self.link.listener.closed(reason::CLOSED, details);
    }

    fn is_connected(&self) -> bool {
        self.link.session.lock().is_some()
    }

    fn is_open(&self) -> bool {
        self.is_connected() || self.link.opening.load(Ordering::SeqCst)
    }

    fn is_retrying(&self) -> bool {
        false
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Session half of the in-process router.
struct MemorySession {
    id: u64,
    router: Weak<RouterInner>,
    alive: AtomicBool,
}

impl MemorySession {
    /// Drops this session if `kind` on `name` was marked with `sever_on`.
    fn trip(&self, kind: OperationKind, name: &str) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        let link = {
            let mut state = router.state.lock();
            if !state.severances.remove(&(kind, name.to_string())) {
                return;
            }
            state
                .links
                .iter()
                .find(|link| link.session.lock().as_ref().is_some_and(|s| s.id == self.id))
                .cloned()
        };
        if let Some(link) = link {
            router.drop_link(&link);
        }
    }

    /// Runs `op` against router state if this session is still live.
    fn with_state<T>(&self, op: impl FnOnce(&mut RouterState) -> Result<T>) -> Result<T> {
        let router = self
            .router
            .upgrade()
            .filter(|_| self.alive.load(Ordering::SeqCst))
            .ok_or(Error::ConnectionClosed)?;
        let mut state = router.state.lock();
        op(&mut state)
    }

    fn release(&self, kind: OperationKind, target: Release) -> SessionFuture<()> {
        self.trip(kind, target.uri());
        let session = self.id;
        let result = self.with_state(|state| {
            state.record(
                session,
                kind,
                target.uri(),
                match &target {
                    Release::Handle(handle) => Some(handle.id),
                    Release::Uri(_) => None,
                },
            );
            if let Some(err) = state.rejection(kind, target.uri()) {
                return Err(err);
            }

            let removed = match (kind, &target) {
                (OperationKind::Unsubscribe, Release::Handle(handle)) => {
                    let before = state.subscriptions.len();
                    state
                        .subscriptions
                        .retain(|s| !(s.id == handle.id && s.session == session));
                    before - state.subscriptions.len()
                }
                (OperationKind::Unsubscribe, Release::Uri(topic)) => {
                    let before = state.subscriptions.len();
                    state
                        .subscriptions
                        .retain(|s| !(s.topic == *topic && s.session == session));
                    before - state.subscriptions.len()
                }
                (_, target) => {
                    let owned = state
                        .registrations
                        .get(target.uri())
                        .filter(|r| r.session == session)
                        .filter(|r| match target {
                            Release::Handle(handle) => r.id == handle.id,
                            Release::Uri(_) => true,
                        })
                        .is_some();
                    if owned {
                        state.registrations.remove(target.uri());
                    }
                    usize::from(owned)
                }
            };

            if removed == 0 {
                let error = if kind == OperationKind::Unsubscribe {
                    NO_SUCH_SUBSCRIPTION
                } else {
                    NO_SUCH_REGISTRATION
                };
                return Err(Error::operation(kind, target.uri(), error));
            }
            Ok(())
        });
        future::ready(result).boxed()
    }
}

impl Session for MemorySession {
    fn subscribe(
        &self,
        topic: &str,
        handler: EventHandler,
        _options: &CommandOptions,
    ) -> SessionFuture<SessionHandle> {
        self.trip(OperationKind::Subscribe, topic);
        let session = self.id;
        let result = self.with_state(|state| {
            if let Some(err) = state.rejection(OperationKind::Subscribe, topic) {
                state.record(session, OperationKind::Subscribe, topic, None);
                return Err(err);
            }
            let id = HandleId::new(state.next_id());
            state.record(session, OperationKind::Subscribe, topic, Some(id));
            state.subscriptions.push(Subscription {
                id,
                topic: topic.to_string(),
                session,
                handler,
            });
            Ok(SessionHandle::new(id, topic, OperationKind::Subscribe))
        });
        future::ready(result).boxed()
    }

    fn unsubscribe(&self, target: Release) -> SessionFuture<()> {
        self.release(OperationKind::Unsubscribe, target)
    }

    fn register(
        &self,
        procedure: &str,
        endpoint: Endpoint,
        _options: &CommandOptions,
    ) -> SessionFuture<SessionHandle> {
        self.trip(OperationKind::Register, procedure);
        let session = self.id;
        let result = self.with_state(|state| {
            if let Some(err) = state.rejection(OperationKind::Register, procedure) {
                state.record(session, OperationKind::Register, procedure, None);
                return Err(err);
            }
            if state.registrations.contains_key(procedure) {
                state.record(session, OperationKind::Register, procedure, None);
                return Err(Error::operation(
                    OperationKind::Register,
                    procedure,
                    PROCEDURE_ALREADY_EXISTS,
                ));
            }
            let id = HandleId::new(state.next_id());
            state.record(session, OperationKind::Register, procedure, Some(id));
            state.registrations.insert(
                procedure.to_string(),
                Registration {
                    id,
                    session,
                    endpoint,
                },
            );
            Ok(SessionHandle::new(id, procedure, OperationKind::Register))
        });
        future::ready(result).boxed()
    }

    fn unregister(&self, target: Release) -> SessionFuture<()> {
        self.release(OperationKind::Unregister, target)
    }

    fn publish(
        &self,
        topic: &str,
        args: Args,
        kwargs: KwArgs,
        options: &CommandOptions,
    ) -> SessionFuture<Value> {
        self.trip(OperationKind::Publish, topic);
        let session = self.id;
        let acknowledge = options.acknowledge;
        let issued = self.with_state(|state| {
            state.record(session, OperationKind::Publish, topic, None);
            if let Some(err) = state.rejection(OperationKind::Publish, topic) {
                return Err(err);
            }
            let handlers: Vec<EventHandler> = state
                .subscriptions
                .iter()
                .filter(|s| s.topic == topic)
                .map(|s| Arc::clone(&s.handler))
                .collect();
            Ok((state.next_id(), handlers))
        });

        let topic = topic.to_string();
        async move {
            let (publication, handlers) = issued?;
            let mut details = Details::new();
            details.insert("publication".into(), json!(publication));
            deliver(handlers, &topic, args, kwargs, details);
            Ok(if acknowledge {
                json!(publication)
            } else {
                Value::Null
            })
        }
        .boxed()
    }

    fn call(
        &self,
        procedure: &str,
        args: Args,
        kwargs: KwArgs,
        options: &CommandOptions,
        progress: Option<Progress>,
    ) -> SessionFuture<Value> {
        self.trip(OperationKind::Call, procedure);
        let session = self.id;
        let issued = self.with_state(|state| {
            state.record(session, OperationKind::Call, procedure, None);
            if let Some(err) = state.rejection(OperationKind::Call, procedure) {
                return Err(err);
            }
            state
                .registrations
                .get(procedure)
                .map(|r| Arc::clone(&r.endpoint))
                .ok_or_else(|| Error::operation(OperationKind::Call, procedure, NO_SUCH_PROCEDURE))
        });

        let invocation = Invocation {
            procedure: procedure.to_string(),
            args,
            kwargs,
            details: Details::new(),
            owner: None,
            progress: progress.filter(|_| options.receive_progress),
        };
        async move {
            let endpoint = issued?;
            endpoint(invocation)
        }
        .boxed()
    }
}

/// Invokes `handlers` with one event each.
fn deliver(handlers: Vec<EventHandler>, topic: &str, args: Args, kwargs: KwArgs, details: Details) {
    for handler in handlers {
        handler(Event {
            topic: topic.to_string(),
            args: args.clone(),
            kwargs: kwargs.clone(),
            details: details.clone(),
            owner: None,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
