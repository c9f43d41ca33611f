//! The unit of work the broker queues and relays.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::identifiers::{CommandId, OwnerId};
use crate::protocol::{CommandOptions, Operation, OperationKind, bind_endpoint, bind_handler};

use super::handle::{ResultHandle, Responder};

// ============================================================================
// Command
// ============================================================================

/// One pending or relayed operation.
///
/// Carries the responder of its [`ResultHandle`] until the first relay.
/// Persistent commands are replayed as replicas without a responder, so the
/// handle settles at most once.
pub(crate) struct Command {
    /// Sequential id for logs.
    pub id: CommandId,
    /// Owner for registry bookkeeping; `None` is global.
    pub owner: Option<OwnerId>,
    /// What to do.
    pub operation: Operation,
    /// Options, with `acknowledge` already forced on.
    pub options: CommandOptions,
    /// Settles the caller's handle.
    pub responder: Option<Responder>,
}

impl Command {
    /// Creates a command and the handle returned to its caller.
    ///
    /// Handlers and endpoints are bound to the owner here, so every replay
    /// carries the same binding.
    pub(crate) fn new(
        owner: Option<OwnerId>,
        operation: Operation,
        mut options: CommandOptions,
    ) -> (Self, ResultHandle) {
        options.acknowledge = true;

        let operation = match operation {
            Operation::Subscribe { topic, handler } => Operation::Subscribe {
                topic,
                handler: bind_handler(handler, owner.as_ref()),
            },
            Operation::Register {
                procedure,
                endpoint,
            } => Operation::Register {
                procedure,
                endpoint: bind_endpoint(endpoint, owner.as_ref()),
            },
            other => other,
        };

        let with_progress =
            operation.kind() == OperationKind::Call && options.receive_progress;
        let (handle, responder) =
            ResultHandle::pending(operation.kind(), operation.name(), with_progress);

        let command = Self {
            id: CommandId::next(),
            owner,
            operation,
            options,
            responder: Some(responder),
        };
        (command, handle)
    }

    /// Returns the operation tag.
    #[inline]
    pub(crate) fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Returns the topic or procedure URI.
    #[inline]
    pub(crate) fn name(&self) -> &str {
        self.operation.name()
    }

    /// Returns `true` if the command replays on every reconnect.
    #[inline]
    pub(crate) fn is_persistent(&self) -> bool {
        self.options.persist
    }

    /// Returns `true` if the command has never been relayed.
    #[inline]
    pub(crate) fn is_unrelayed(&self) -> bool {
        self.responder.is_some()
    }

    /// Returns `true` if the command belongs to `owner`.
    #[inline]
    pub(crate) fn is_owned_by(&self, owner: &OwnerId) -> bool {
        self.owner.as_ref() == Some(owner)
    }

    /// Returns a copy for future replays, without the responder.
    pub(crate) fn replica(&self) -> Self {
        Self {
            id: self.id,
            owner: self.owner.clone(),
            operation: self.operation.clone(),
            options: self.options.clone(),
            responder: None,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("operation", &self.operation)
            .field("persist", &self.options.persist)
            .field("unrelayed", &self.is_unrelayed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::protocol::Event;

    fn subscribe(topic: &str) -> Operation {
        Operation::Subscribe {
            topic: topic.into(),
            handler: Arc::new(|_: Event| {}),
        }
    }

    #[test]
    fn test_new_forces_acknowledge() {
        let (command, handle) = Command::new(None, subscribe("com.app.topic"), CommandOptions::new());
        assert!(command.options.acknowledge);
        assert!(command.is_unrelayed());
        assert_eq!(handle.kind(), OperationKind::Subscribe);
        assert_eq!(handle.name(), "com.app.topic");
    }

    #[test]
    fn test_replica_has_no_responder() {
        let owner = OwnerId::new("panel-1");
        let (command, _handle) = Command::new(
            Some(owner.clone()),
            subscribe("com.app.topic"),
            CommandOptions::persistent(),
        );

        let replica = command.replica();
        assert_eq!(replica.id, command.id);
        assert!(replica.is_persistent());
        assert!(!replica.is_unrelayed());
        assert!(replica.is_owned_by(&owner));
    }

    #[test]
    fn test_progress_only_for_calls() {
        let options = CommandOptions::new().with_receive_progress();

        let (_, mut handle) = Command::new(
            None,
            Operation::Call {
                procedure: "com.app.count".into(),
                args: vec![],
                kwargs: Default::default(),
            },
            options.clone(),
        );
        assert!(handle.progress().is_some());

        let (_, mut handle) = Command::new(None, subscribe("com.app.topic"), options);
        assert!(handle.progress().is_none());
    }
}
