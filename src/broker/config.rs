//! Broker configuration.
//!
//! [`BrokerConfig`] is the merged option set the next connection attempt is
//! built from. Overlays merge with later values winning: the known keys are
//! replaced, transport-specific objects merge key by key.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use wamp_broker::BrokerConfig;
//!
//! let mut config = BrokerConfig::default();
//! config.merge(&json!({ "url": "ws://127.0.0.1:8080/ws", "realm": "realm1" }))?;
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::validate_uri;
use crate::transport::{Details, Session};

// ============================================================================
// Hooks
// ============================================================================

/// Called after a session opens and the queue has drained.
pub type OpenHook = Arc<dyn Fn(&Arc<dyn Session>, &Details) + Send + Sync>;

/// Called after a session closes and broker state is cleared.
pub type CloseHook = Arc<dyn Fn(&str, &Details) + Send + Sync>;

// ============================================================================
// BrokerConfig
// ============================================================================

/// Options for the shared session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Logs every submitted operation at debug level.
    pub debug: bool,

    /// Defers the first connection attempt to the first operation.
    pub lazy_open: bool,

    /// Router URL (`ws://` or `wss://`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Realm to join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Transport-specific fields, passed through to the connector.
    #[serde(flatten)]
    pub transport: Map<String, Value>,

    /// Session-opened hook.
    #[serde(skip)]
    pub on_open: Option<OpenHook>,

    /// Session-closed hook.
    #[serde(skip)]
    pub on_close: Option<CloseHook>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            lazy_open: true,
            url: None,
            realm: None,
            transport: Map::new(),
            on_open: None,
            on_close: None,
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("debug", &self.debug)
            .field("lazy_open", &self.lazy_open)
            .field("url", &self.url)
            .field("realm", &self.realm)
            .field("transport", &self.transport)
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

// ============================================================================
// BrokerConfig - Parsing & Merging
// ============================================================================

impl BrokerConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is not a valid configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Merges an overlay into this configuration.
    ///
    /// Hooks are kept; everything else in `overlay` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `overlay` is not an object, or
    /// [`Error::Json`] if a known key has the wrong type.
    pub fn merge(&mut self, overlay: &Value) -> Result<()> {
        if !overlay.is_object() {
            return Err(Error::config("Configuration overlay must be a JSON object"));
        }

        let mut base = serde_json::to_value(&*self)?;
        deep_merge(&mut base, overlay);
        let merged: Self = serde_json::from_value(base)?;

        self.debug = merged.debug;
        self.lazy_open = merged.lazy_open;
        self.url = merged.url;
        self.realm = merged.realm;
        self.transport = merged.transport;
        Ok(())
    }

    /// Validates the router URL and realm.
    ///
    /// Both are optional; a connector may supply its own.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Config`] if `url` is not `ws://` or `wss://`
    /// - [`Error::InvalidUri`] if `realm` is not a valid URI
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            let parsed = Url::parse(url)?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(Error::config(format!(
                    "Router URL must use ws:// or wss://, got {}://",
                    parsed.scheme()
                )));
            }
        }

        if let Some(realm) = &self.realm {
            validate_uri(realm)?;
        }

        Ok(())
    }
}

/// Merges `overlay` into `base`, recursing into objects.
fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert!(!config.debug);
        assert!(config.lazy_open);
        assert!(config.url.is_none());
        assert!(config.transport.is_empty());
    }

    #[test]
    fn test_from_json_keeps_transport_fields() {
        let config = BrokerConfig::from_json(
            r#"{"url": "ws://localhost:8080/ws", "realm": "realm1", "max_retries": 5}"#,
        )
        .unwrap();

        assert!(config.lazy_open);
        assert_eq!(config.realm.as_deref(), Some("realm1"));
        assert_eq!(config.transport.get("max_retries"), Some(&json!(5)));
    }

    #[test]
    fn test_merge_later_values_win() {
        let mut config = BrokerConfig::default();
        config
            .merge(&json!({ "debug": true, "realm": "realm1", "retry": { "max": 3, "delay": 1.5 } }))
            .unwrap();
        config
            .merge(&json!({ "realm": "realm2", "retry": { "max": 10 } }))
            .unwrap();

        assert!(config.debug);
        assert_eq!(config.realm.as_deref(), Some("realm2"));
        assert_eq!(config.transport["retry"], json!({ "max": 10, "delay": 1.5 }));
    }

    #[test]
    fn test_merge_keeps_hooks() {
        let mut config = BrokerConfig {
            on_close: Some(Arc::new(|_: &str, _: &Details| {})),
            ..Default::default()
        };
        config.merge(&json!({ "lazy_open": false })).unwrap();

        assert!(!config.lazy_open);
        assert!(config.on_close.is_some());
    }

    #[test]
    fn test_merge_rejects_non_object() {
        let mut config = BrokerConfig::default();
        let err = config.merge(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = config.merge(&json!({ "debug": "yes" })).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = BrokerConfig {
            url: Some("wss://router.example.com/ws".into()),
            realm: Some("com.example".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.url = Some("http://router.example.com".into());
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        config.url = Some("not a url".into());
        assert!(matches!(config.validate(), Err(Error::Url(_))));

        config.url = None;
        config.realm = Some("bad realm".into());
        assert!(matches!(config.validate(), Err(Error::InvalidUri { .. })));
    }

    #[test]
    fn test_debug_hides_hooks() {
        let config = BrokerConfig {
            on_open: Some(Arc::new(|_: &Arc<dyn Session>, _: &Details| {})),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("on_open: true"));
    }
}
