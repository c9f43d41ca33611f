//! Operation definitions.
//!
//! Every broker request is one of six operations. [`Operation`] carries the
//! typed payload of each; [`OperationKind`] is its payload-free tag used in
//! logs, errors and registry entries.
//!
//! | Kind | Payload | Relay result |
//! |------|---------|--------------|
//! | `subscribe` | topic, handler | session handle |
//! | `unsubscribe` | topic | release acknowledgement |
//! | `publish` | topic, args, kwargs | value |
//! | `call` | procedure, args, kwargs | value |
//! | `register` | procedure, endpoint | session handle |
//! | `unregister` | procedure | release acknowledgement |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use super::message::{Args, Endpoint, EventHandler, KwArgs};

// ============================================================================
// OperationKind
// ============================================================================

/// Tag of a broker operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Subscribe to a topic.
    Subscribe,
    /// Cancel a subscription.
    Unsubscribe,
    /// Publish an event.
    Publish,
    /// Call a procedure.
    Call,
    /// Register a procedure endpoint.
    Register,
    /// Cancel a registration.
    Unregister,
}

impl OperationKind {
    /// Returns the protocol name of the operation.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
            Self::Call => "call",
            Self::Register => "register",
            Self::Unregister => "unregister",
        }
    }

    /// Returns `true` for operations that yield a session handle.
    #[inline]
    #[must_use]
    pub const fn is_standing(&self) -> bool {
        matches!(self, Self::Subscribe | Self::Register)
    }

    /// Returns `true` for operations that cancel a standing one.
    #[inline]
    #[must_use]
    pub const fn is_release(&self) -> bool {
        matches!(self, Self::Unsubscribe | Self::Unregister)
    }

    /// Returns the operation that cancels this one.
    ///
    /// `None` for operations that leave nothing standing.
    #[inline]
    #[must_use]
    pub const fn release(&self) -> Option<Self> {
        match self {
            Self::Subscribe => Some(Self::Unsubscribe),
            Self::Register => Some(Self::Unregister),
            _ => None,
        }
    }

    /// Returns the standing operation an un-operation cancels.
    #[inline]
    #[must_use]
    pub const fn released(&self) -> Option<Self> {
        match self {
            Self::Unsubscribe => Some(Self::Subscribe),
            Self::Unregister => Some(Self::Register),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Operation
// ============================================================================

/// A broker operation with its typed payload.
#[derive(Clone)]
pub enum Operation {
    /// Subscribe `handler` to `topic`.
    Subscribe {
        /// Topic URI.
        topic: String,
        /// Callback for incoming events.
        handler: EventHandler,
    },

    /// Cancel subscriptions on `topic`.
    Unsubscribe {
        /// Topic URI.
        topic: String,
    },

    /// Publish an event to `topic`.
    Publish {
        /// Topic URI.
        topic: String,
        /// Positional payload.
        args: Args,
        /// Keyword payload.
        kwargs: KwArgs,
    },

    /// Call `procedure`.
    Call {
        /// Procedure URI.
        procedure: String,
        /// Positional arguments.
        args: Args,
        /// Keyword arguments.
        kwargs: KwArgs,
    },

    /// Register `endpoint` for `procedure`.
    Register {
        /// Procedure URI.
        procedure: String,
        /// Callback for incoming invocations.
        endpoint: Endpoint,
    },

    /// Cancel registrations of `procedure`.
    Unregister {
        /// Procedure URI.
        procedure: String,
    },
}

impl Operation {
    /// Returns the operation tag.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Subscribe { .. } => OperationKind::Subscribe,
            Self::Unsubscribe { .. } => OperationKind::Unsubscribe,
            Self::Publish { .. } => OperationKind::Publish,
            Self::Call { .. } => OperationKind::Call,
            Self::Register { .. } => OperationKind::Register,
            Self::Unregister { .. } => OperationKind::Unregister,
        }
    }

    /// Returns the topic or procedure URI.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Subscribe { topic, .. }
            | Self::Unsubscribe { topic }
            | Self::Publish { topic, .. } => topic,
            Self::Call { procedure, .. }
            | Self::Register { procedure, .. }
            | Self::Unregister { procedure } => procedure,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish {
                topic,
                args,
                kwargs,
            } => f
                .debug_struct("Publish")
                .field("topic", topic)
                .field("args", args)
                .field("kwargs", kwargs)
                .finish(),
            Self::Call {
                procedure,
                args,
                kwargs,
            } => f
                .debug_struct("Call")
                .field("procedure", procedure)
                .field("args", args)
                .field("kwargs", kwargs)
                .finish(),
            other => f
                .debug_struct(match other.kind() {
                    OperationKind::Subscribe => "Subscribe",
                    OperationKind::Unsubscribe => "Unsubscribe",
                    OperationKind::Register => "Register",
                    _ => "Unregister",
                })
                .field("name", &other.name())
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::protocol::{Event, Invocation};

    #[test]
    fn test_kind_names() {
        assert_eq!(OperationKind::Subscribe.to_string(), "subscribe");
        assert_eq!(OperationKind::Unregister.as_str(), "unregister");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_value(OperationKind::Register).unwrap();
        assert_eq!(json, json!("register"));
    }

    #[test]
    fn test_release_pairs() {
        assert_eq!(
            OperationKind::Subscribe.release(),
            Some(OperationKind::Unsubscribe)
        );
        assert_eq!(
            OperationKind::Unregister.released(),
            Some(OperationKind::Register)
        );
        assert_eq!(OperationKind::Call.release(), None);
        assert!(OperationKind::Register.is_standing());
        assert!(OperationKind::Unsubscribe.is_release());
        assert!(!OperationKind::Publish.is_standing());
    }

    #[test]
    fn test_operation_name_and_kind() {
        let op = Operation::Subscribe {
            topic: "com.app.topic".into(),
            handler: Arc::new(|_: Event| {}),
        };
        assert_eq!(op.kind(), OperationKind::Subscribe);
        assert_eq!(op.name(), "com.app.topic");

        let op = Operation::Call {
            procedure: "com.app.add".into(),
            args: vec![json!(1)],
            kwargs: Default::default(),
        };
        assert_eq!(op.kind(), OperationKind::Call);
        assert_eq!(op.name(), "com.app.add");
    }

    #[test]
    fn test_operation_debug_hides_callbacks() {
        let op = Operation::Register {
            procedure: "com.app.echo".into(),
            endpoint: Arc::new(|inv: Invocation| Ok(inv.args.into())),
        };
        let text = format!("{op:?}");
        assert!(text.starts_with("Register"));
        assert!(text.contains("com.app.echo"));
    }
}
