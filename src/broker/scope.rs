//! Per-owner facade.
//!
//! A [`Scope`] is what a component holds: every operation it submits is
//! owned by the scope's [`OwnerId`], and dropping the scope tears the owner
//! down, releasing its subscriptions and registrations on the shared
//! session.
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::{Broker, CommandOptions};
//!
//! # async fn example(broker: &Broker) -> wamp_broker::Result<()> {
//! let panel = broker.scope_for_component("StatusPanel", 7);
//! panel.subscribe("com.app.status", |event| println!("{:?}", event.args), CommandOptions::new()).await?;
//!
//! drop(panel); // unsubscribes
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::error::Result;
use crate::identifiers::OwnerId;
use crate::protocol::{Args, CommandOptions, Event, Invocation, KwArgs};

use super::core::Broker;
use super::handle::ResultHandle;
use super::registry::RegistryEntry;

// ============================================================================
// Scope
// ============================================================================

/// Operations bound to one owner.
///
/// Not `Clone`: the scope's lifetime is the owner's lifetime.
pub struct Scope {
    broker: Broker,
    owner: OwnerId,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("owner", &self.owner)
            .field("entries", &self.entries().len())
            .finish()
    }
}

impl Scope {
    pub(crate) fn new(broker: Broker, owner: OwnerId) -> Self {
        Self { broker, owner }
    }

    /// Returns the owner identity.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Returns the shared broker.
    #[inline]
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Returns this owner's tracked subscriptions and registrations.
    #[must_use]
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.broker.owner_entries(&self.owner)
    }

    /// Subscribes `handler` to `topic`.
    pub fn subscribe<F>(
        &self,
        topic: impl Into<String>,
        handler: F,
        options: CommandOptions,
    ) -> ResultHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.broker
            .subscribe(Some(self.owner.clone()), topic, handler, options)
    }

    /// Cancels this owner's subscriptions to `topic`.
    pub fn unsubscribe(&self, topic: impl Into<String>) -> ResultHandle {
        self.broker.unsubscribe(Some(self.owner.clone()), topic)
    }

    /// Publishes an event to `topic`.
    pub fn publish(
        &self,
        topic: impl Into<String>,
        args: Args,
        kwargs: KwArgs,
        options: CommandOptions,
    ) -> ResultHandle {
        self.broker
            .publish(Some(self.owner.clone()), topic, args, kwargs, options)
    }

    /// Calls `procedure`.
    pub fn call(
        &self,
        procedure: impl Into<String>,
        args: Args,
        kwargs: KwArgs,
        options: CommandOptions,
    ) -> ResultHandle {
        self.broker
            .call(Some(self.owner.clone()), procedure, args, kwargs, options)
    }

    /// Registers `endpoint` for `procedure`.
    pub fn register<F>(
        &self,
        procedure: impl Into<String>,
        endpoint: F,
        options: CommandOptions,
    ) -> ResultHandle
    where
        F: Fn(Invocation) -> Result<Value> + Send + Sync + 'static,
    {
        self.broker
            .register(Some(self.owner.clone()), procedure, endpoint, options)
    }

    /// Cancels this owner's registrations of `procedure`.
    pub fn unregister(&self, procedure: impl Into<String>) -> ResultHandle {
        self.broker.unregister(Some(self.owner.clone()), procedure)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let released = self.broker.teardown_owner(&self.owner);
        trace!(owner = %self.owner, released, "Scope dropped");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::OperationKind;
    use crate::transport::MemoryRouter;

    fn broker(router: &MemoryRouter) -> Broker {
        Broker::builder()
            .connector(router.clone())
            .build()
            .expect("build broker")
    }

    #[tokio::test]
    async fn test_operations_are_owned() {
        let router = MemoryRouter::new();
        let broker = broker(&router);
        let scope = broker.scope(OwnerId::new("panel-1"));

        scope
            .subscribe("com.app.topic", |_: Event| {}, CommandOptions::new())
            .await
            .unwrap();
        scope
            .register("com.app.echo", |inv: Invocation| Ok(json!(inv.args)), CommandOptions::new())
            .await
            .unwrap();

        let entries = scope.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.owner.as_str() == "panel-1"));
    }

    #[tokio::test]
    async fn test_drop_tears_down_owner() {
        let router = MemoryRouter::new();
        let broker = broker(&router);
        let scope = broker.scope_generated();
        let other = broker.scope_generated();
        assert_ne!(scope.owner(), other.owner());

        scope
            .subscribe("com.app.topic", |_: Event| {}, CommandOptions::new())
            .await
            .unwrap();
        other
            .subscribe("com.app.topic", |_: Event| {}, CommandOptions::new())
            .await
            .unwrap();
        router.clear_journal();

        drop(scope);

        let journal = router.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].kind, OperationKind::Unsubscribe);
        assert_eq!(router.subscription_count("com.app.topic"), 1);
        assert_eq!(broker.registry_len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_by_name() {
        let router = MemoryRouter::new();
        let broker = broker(&router);
        let scope = broker.scope_for_component("StatusPanel", 3);
        assert_eq!(scope.owner().as_str(), "status-panel-3");

        scope
            .register("com.app.status", |_: Invocation| Ok(Value::Null), CommandOptions::new())
            .await
            .unwrap();
        scope.unregister("com.app.status").await.unwrap();

        assert!(!router.is_registered("com.app.status"));
        assert!(scope.entries().is_empty());
    }

    #[tokio::test]
    async fn test_publish_and_call() -> anyhow::Result<()> {
        let router = MemoryRouter::new();
        let broker = broker(&router);
        let scope = broker.scope(OwnerId::new("p"));

        scope
            .register(
                "com.app.double",
                |inv: Invocation| Ok(json!(inv.args[0].as_i64().unwrap_or(0) * 2)),
                CommandOptions::new(),
            )
            .await?;

        let ack = scope
            .publish("com.app.topic", vec![json!(1)], KwArgs::new(), CommandOptions::new())
            .value()
            .await?;
        assert!(ack.is_u64());

        let doubled = scope
            .call("com.app.double", vec![json!(21)], KwArgs::new(), CommandOptions::new())
            .value()
            .await?;
        assert_eq!(doubled, json!(42));
        Ok(())
    }

    #[tokio::test]
    async fn test_drop_before_session_forgets_queue() {
        let router = MemoryRouter::manual();
        let broker = broker(&router);
        let scope = broker.scope(OwnerId::new("p"));

        let pending = scope.subscribe("com.app.topic", |_: Event| {}, CommandOptions::persistent());
        assert_eq!(broker.queued_len(), 1);

        drop(scope);
        assert_eq!(broker.queued_len(), 0);
        assert!(pending.await.unwrap_err().is_abandoned());

        router.accept();
        assert_eq!(router.subscription_count("com.app.topic"), 0);
    }
}
