//! Builder pattern for broker configuration.
//!
//! Provides a fluent API for configuring and creating [`Broker`] instances.
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::{Broker, transport::MemoryRouter};
//!
//! # async fn example() -> wamp_broker::Result<()> {
//! let broker = Broker::builder()
//!     .url("ws://127.0.0.1:8080/ws")
//!     .realm("realm1")
//!     .connector(MemoryRouter::new())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::{Connector, Details, Session};

use super::config::BrokerConfig;
use super::core::Broker;

// ============================================================================
// BrokerBuilder
// ============================================================================

/// Builder for configuring a [`Broker`] instance.
///
/// Use [`Broker::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct BrokerBuilder {
    /// Merged configuration so far.
    config: BrokerConfig,
    /// First overlay that failed to merge, reported by `build`.
    merge_error: Option<String>,
    /// Transport factory.
    connector: Option<Arc<dyn Connector>>,
}

impl fmt::Debug for BrokerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerBuilder")
            .field("config", &self.config)
            .field("connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BrokerBuilder Implementation
// ============================================================================

impl BrokerBuilder {
    /// Creates a new broker builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a JSON configuration overlay.
    ///
    /// Later overlays win. Unknown keys are passed to the connector.
    ///
    /// # Arguments
    ///
    /// * `overlay` - JSON object, e.g. `{"realm": "realm1", "max_retries": 5}`
    #[must_use]
    pub fn config(mut self, overlay: &Value) -> Self {
        if let Err(e) = self.config.merge(overlay)
            && self.merge_error.is_none()
        {
            self.merge_error = Some(e.to_string());
        }
        self
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the router URL.
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket URL (e.g., "wss://router.example.com/ws")
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = Some(url.into());
        self
    }

    /// Sets the realm to join.
    #[inline]
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Enables per-operation debug logging.
    #[inline]
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Sets whether the first connection waits for the first operation.
    ///
    /// With `false`, `build` starts connecting immediately.
    #[inline]
    #[must_use]
    pub fn lazy_open(mut self, lazy: bool) -> Self {
        self.config.lazy_open = lazy;
        self
    }

    /// Sets the hook called once a session opens and the queue has drained.
    ///
    /// `details` carries `"recovered": true` when the previous session was
    /// lost rather than closed.
    #[must_use]
    pub fn on_open<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<dyn Session>, &Details) + Send + Sync + 'static,
    {
        self.config.on_open = Some(Arc::new(hook));
        self
    }

    /// Sets the hook called once a session closes.
    #[must_use]
    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Details) + Send + Sync + 'static,
    {
        self.config.on_close = Some(Arc::new(hook));
        self
    }

    /// Sets the transport factory.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Builds the broker with validation.
    ///
    /// Must be called inside a Tokio runtime; completion tasks are spawned
    /// on it.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if an overlay failed to merge, no connector is
    ///   set, or there is no current Tokio runtime
    /// - [`Error::Url`] / [`Error::Config`] if the router URL is invalid
    /// - [`Error::InvalidUri`] if the realm is invalid
    pub fn build(self) -> Result<Broker> {
        if let Some(message) = self.merge_error {
            return Err(Error::config(message));
        }

        let connector = self.connector.ok_or_else(|| {
            Error::config(
                "Connector is required. Use .connector() to set it.\n\
                 Example: Broker::builder().connector(MemoryRouter::new())",
            )
        })?;

        self.config.validate()?;

        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Broker must be built inside a Tokio runtime"))?;

        let lazy_open = self.config.lazy_open;
        let broker = Broker::new(self.config, connector, runtime);
        if !lazy_open {
            broker.open();
        }
        Ok(broker)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::MemoryRouter;

    #[test]
    fn test_new_creates_default_builder() {
        let builder = BrokerBuilder::new();
        assert!(builder.config.lazy_open);
        assert!(builder.connector.is_none());
    }

    #[test]
    fn test_setters() {
        let builder = BrokerBuilder::new()
            .url("ws://localhost:8080/ws")
            .realm("realm1")
            .debug(true)
            .lazy_open(false);

        assert_eq!(builder.config.url.as_deref(), Some("ws://localhost:8080/ws"));
        assert_eq!(builder.config.realm.as_deref(), Some("realm1"));
        assert!(builder.config.debug);
        assert!(!builder.config.lazy_open);
    }

    #[test]
    fn test_config_overlays_merge() {
        let builder = BrokerBuilder::new()
            .config(&json!({ "realm": "a", "retry": { "max": 1 } }))
            .config(&json!({ "realm": "b" }));

        assert_eq!(builder.config.realm.as_deref(), Some("b"));
        assert_eq!(builder.config.transport["retry"], json!({ "max": 1 }));
    }

    #[test]
    fn test_build_fails_without_connector() {
        let err = BrokerBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("Connector"));
    }

    #[test]
    fn test_build_fails_outside_runtime() {
        let err = BrokerBuilder::new()
            .connector(MemoryRouter::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Tokio runtime"));
    }

    #[tokio::test]
    async fn test_build_reports_bad_overlay() {
        let err = BrokerBuilder::new()
            .config(&json!("not an object"))
            .connector(MemoryRouter::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_build_validates_url() {
        let err = BrokerBuilder::new()
            .url("http://localhost")
            .connector(MemoryRouter::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }

    #[tokio::test]
    async fn test_build_eager_open() {
        let router = MemoryRouter::new();
        let broker = BrokerBuilder::new()
            .lazy_open(false)
            .connector(router.clone())
            .build()
            .unwrap();

        assert!(broker.is_connected());
        assert_eq!(router.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_build_lazy_by_default() {
        let router = MemoryRouter::new();
        let broker = BrokerBuilder::new().connector(router.clone()).build().unwrap();

        assert!(!broker.is_open());
        assert_eq!(router.connect_attempts(), 0);
    }
}
