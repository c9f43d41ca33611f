//! Dispatch of commands onto a live session.
//!
//! A [`Relay`] is bound to one session and one registry epoch. Dispatch
//! issues the session request immediately, in the caller's order, then
//! spawns a completion task that records registry entries and settles the
//! command's handle.
//!
//! | Operation | Session call | Outcome |
//! |-----------|--------------|---------|
//! | subscribe / register | `(name, bound handler, options)` | `Handle`, recorded for owned commands |
//! | unsubscribe / unregister | by handle for tracked entries, else by name | `Released` |
//! | publish / call | `(name, args, kwargs, options)` | `Value` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::future::{BoxFuture, try_join_all};
use futures_util::{FutureExt, TryFutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::identifiers::{CommandId, OwnerId};
use crate::protocol::{Operation, OperationKind};
use crate::transport::{Release, Session, SessionFuture, SessionHandle};

use super::command::Command;
use super::handle::{Outcome, Responder};
use super::registry::{Registry, RegistryEntry};

// ============================================================================
// Relay
// ============================================================================

/// Executes commands against one session.
#[derive(Clone)]
pub(crate) struct Relay {
    session: Arc<dyn Session>,
    registry: Arc<Mutex<Registry>>,
    epoch: u64,
    runtime: Handle,
}

impl Relay {
    /// Binds a relay to `session` under the registry's current epoch.
    pub(crate) fn new(
        session: Arc<dyn Session>,
        registry: Arc<Mutex<Registry>>,
        runtime: Handle,
    ) -> Self {
        let epoch = registry.lock().epoch();
        Self {
            session,
            registry,
            epoch,
            runtime,
        }
    }

    /// Returns the session this relay dispatches to.
    pub(crate) fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.session)
    }

    /// Relays one command.
    ///
    /// The session request is issued before this returns.
    pub(crate) fn dispatch(&self, command: Command) {
        let Command {
            id,
            owner,
            operation,
            options,
            responder,
        } = command;
        let kind = operation.kind();
        let name = operation.name().to_string();

        trace!(command = %id, %kind, %name, "Relaying command");

        let outcome: BoxFuture<'static, Result<Outcome>> = match operation {
            Operation::Subscribe { topic, handler } => {
                let issued = self.session.subscribe(&topic, handler, &options);
                self.standing(id, owner, issued)
            }
            Operation::Register {
                procedure,
                endpoint,
            } => {
                let issued = self.session.register(&procedure, endpoint, &options);
                self.standing(id, owner, issued)
            }
            Operation::Unsubscribe { topic } => self
                .release_named(owner.as_ref(), kind, &topic)
                .map_ok(|()| Outcome::Released)
                .boxed(),
            Operation::Unregister { procedure } => self
                .release_named(owner.as_ref(), kind, &procedure)
                .map_ok(|()| Outcome::Released)
                .boxed(),
            Operation::Publish {
                topic,
                args,
                kwargs,
            } => self
                .session
                .publish(&topic, args, kwargs, &options)
                .map_ok(Outcome::Value)
                .boxed(),
            Operation::Call {
                procedure,
                args,
                kwargs,
            } => {
                let progress = responder.as_ref().and_then(Responder::progress);
                self.session
                    .call(&procedure, args, kwargs, &options, progress)
                    .map_ok(Outcome::Value)
                    .boxed()
            }
        };

        self.runtime.spawn(async move {
            let result = outcome.await;
            match &result {
                Ok(_) => trace!(command = %id, %kind, %name, "Command completed"),
                Err(e) if responder.is_some() => {
                    debug!(command = %id, %kind, %name, error = %e, "Command failed");
                }
                // Replays have no caller left to tell.
                Err(e) => warn!(command = %id, %kind, %name, error = %e, "Replay failed"),
            }
            if let Some(responder) = responder {
                responder.settle(result);
            }
        });
    }

    /// Releases registry entries by handle without waiting for the outcome.
    ///
    /// Failures are logged; the entries are already gone from the registry.
    pub(crate) fn release_entries(&self, entries: Vec<RegistryEntry>) {
        for entry in entries {
            let Some(kind) = entry.kind.release() else {
                continue;
            };
            debug!(owner = %entry.owner, handle = %entry.handle, "Auto {kind}");

            let issued = self.release(kind, Release::Handle(entry.handle.clone()));
            self.runtime.spawn(async move {
                if let Err(e) = issued.await {
                    debug!(owner = %entry.owner, handle = %entry.handle, error = %e, "Auto {kind} failed");
                }
            });
        }
    }

    /// Records the handle of an owned subscribe or register on success.
    fn standing(
        &self,
        id: CommandId,
        owner: Option<OwnerId>,
        issued: SessionFuture<SessionHandle>,
    ) -> BoxFuture<'static, Result<Outcome>> {
        let registry = Arc::clone(&self.registry);
        let epoch = self.epoch;

        async move {
            let handle = issued.await?;
            if let Some(owner) = owner {
                let entry = RegistryEntry::new(owner, handle.clone());
                if !registry.lock().record(epoch, entry) {
                    debug!(command = %id, %handle, "Session ended before handle arrived");
                }
            }
            Ok(Outcome::Handle(handle))
        }
        .boxed()
    }

    /// Releases what an un-operation names.
    ///
    /// An owner's tracked entries are released one by one, by handle.
    /// Without tracked entries the release goes to the session by name,
    /// and any entry of that name becomes stale.
    fn release_named(
        &self,
        owner: Option<&OwnerId>,
        kind: OperationKind,
        name: &str,
    ) -> SessionFuture<()> {
        let Some(standing) = kind.released() else {
            return self.release(kind, Release::Uri(name.to_string()));
        };

        let entries = owner
            .map(|owner| self.registry.lock().take_named(owner, standing, name))
            .unwrap_or_default();

        if entries.is_empty() {
            let forgotten = self.registry.lock().forget_named(standing, name);
            if forgotten > 0 {
                trace!(%kind, name, forgotten, "Dropped entries released by name");
            }
            return self.release(kind, Release::Uri(name.to_string()));
        }

        let issued: Vec<SessionFuture<()>> = entries
            .into_iter()
            .map(|entry| self.release(kind, Release::Handle(entry.handle)))
            .collect();
        try_join_all(issued).map_ok(|_| ()).boxed()
    }

    /// Issues the session un-operation for `kind`.
    fn release(&self, kind: OperationKind, target: Release) -> SessionFuture<()> {
        match kind {
            OperationKind::Unregister => self.session.unregister(target),
            _ => self.session.unsubscribe(target),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
