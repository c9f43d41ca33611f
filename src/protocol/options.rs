//! Per-command options.
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::CommandOptions;
//!
//! let options = CommandOptions::new()
//!     .with_persist()
//!     .with_option("match", "prefix");
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// CommandOptions
// ============================================================================

/// Options attached to a single broker command.
///
/// `acknowledge` is forced on at submission so every relay yields a
/// completion. `persist` is broker-local and never forwarded to the session.
/// Unknown fields are carried in `extra` and passed through to the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Ask the router to acknowledge the operation.
    #[serde(default)]
    pub acknowledge: bool,

    /// Keep the command queued and replay it on every reconnect.
    #[serde(default, skip_serializing)]
    pub persist: bool,

    /// Ask for progressive call results.
    #[serde(default, rename = "receive_progress")]
    pub receive_progress: bool,

    /// Transport-specific options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Constructors
// ============================================================================

impl CommandOptions {
    /// Creates options with every flag off.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options for a standing command replayed on every reconnect.
    #[inline]
    #[must_use]
    pub fn persistent() -> Self {
        Self {
            persist: true,
            ..Default::default()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl CommandOptions {
    /// Marks the command for replay on every reconnect.
    #[inline]
    #[must_use]
    pub fn with_persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Requests progressive results for a call.
    #[inline]
    #[must_use]
    pub fn with_receive_progress(mut self) -> Self {
        self.receive_progress = true;
        self
    }

    /// Adds a transport-specific option.
    #[inline]
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns a transport-specific option.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
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
    fn test_default_flags_off() {
        let options = CommandOptions::new();
        assert!(!options.acknowledge);
        assert!(!options.persist);
        assert!(!options.receive_progress);
        assert!(options.extra.is_empty());
    }

    #[test]
    fn test_persistent() {
        assert!(CommandOptions::persistent().persist);
        assert!(CommandOptions::new().with_persist().persist);
    }

    #[test]
    fn test_extra_options_flatten() {
        let options = CommandOptions::new().with_option("match", "prefix");
        assert_eq!(options.get("match"), Some(&json!("prefix")));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["match"], json!("prefix"));
    }

    #[test]
    fn test_persist_not_forwarded() {
        let json = serde_json::to_value(CommandOptions::persistent()).unwrap();
        assert!(json.get("persist").is_none());
    }

    #[test]
    fn test_deserialize_with_unknown_fields() {
        let options: CommandOptions =
            serde_json::from_value(json!({ "persist": true, "disclose_me": true })).unwrap();
        assert!(options.persist);
        assert_eq!(options.get("disclose_me"), Some(&json!(true)));
    }
}
