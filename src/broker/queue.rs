//! Commands waiting for a session.
//!
//! The queue holds two kinds of command in one submission-ordered list:
//!
//! - unrelayed commands, submitted while no session existed
//! - replicas of persistent commands, replayed on every reconnect
//!
//! Unrelayed commands exist only while there is no session: the next drain
//! relays them all.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::identifiers::OwnerId;
use crate::protocol::OperationKind;

use super::command::Command;

// ============================================================================
// CommandQueue
// ============================================================================

/// FIFO of commands awaiting a session.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a command submitted while disconnected.
    pub(crate) fn push(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Keeps a replica of a persistent command relayed while connected.
    pub(crate) fn retain_standing(&mut self, command: &Command) {
        if command.is_persistent() {
            self.commands.push_back(command.replica());
        }
    }

    /// Takes every command for relay, in submission order.
    ///
    /// Persistent commands leave a replica behind for the next drain.
    pub(crate) fn drain_for_relay(&mut self) -> Vec<Command> {
        let drained: Vec<Command> = self.commands.drain(..).collect();
        self.commands.extend(
            drained
                .iter()
                .filter(|command| command.is_persistent())
                .map(Command::replica),
        );
        drained
    }

    /// Drops every non-persistent command.
    ///
    /// Returns the dropped commands. Dropping them unsettled resolves their
    /// handles to [`Error::Abandoned`](crate::Error::Abandoned).
    pub(crate) fn abandon(&mut self) -> Vec<Command> {
        let (kept, dropped): (VecDeque<Command>, VecDeque<Command>) = self
            .commands
            .drain(..)
            .partition(|command| command.is_persistent());
        self.commands = kept;
        dropped.into()
    }

    /// Drops every command belonging to `owner`.
    pub(crate) fn forget_owner(&mut self, owner: &OwnerId) -> Vec<Command> {
        let (dropped, kept): (VecDeque<Command>, VecDeque<Command>) = self
            .commands
            .drain(..)
            .partition(|command| command.is_owned_by(owner));
        self.commands = kept;
        dropped.into()
    }

    /// Cancels standing `kind` commands for `name` after an explicit release.
    ///
    /// Replicas are dropped. Unrelayed commands lose their persistence, so
    /// they still relay once ahead of the release that follows them. With
    /// no owner every command for `name` is cancelled, matching a release
    /// by name on the session. Returns the number of replicas dropped.
    pub(crate) fn cancel_standing(
        &mut self,
        owner: Option<&OwnerId>,
        kind: OperationKind,
        name: &str,
    ) -> usize {
        let matches = |command: &Command| {
            command.kind() == kind
                && command.name() == name
                && owner.is_none_or(|owner| command.is_owned_by(owner))
        };

        for command in self.commands.iter_mut().filter(|c| c.is_unrelayed()) {
            if matches(&*command) {
                command.options.persist = false;
            }
        }

        let before = self.commands.len();
        self.commands
            .retain(|command| command.is_unrelayed() || !matches(command));
        before - self.commands.len()
    }

    /// Drops every command, replicas included.
    pub(crate) fn clear(&mut self) -> Vec<Command> {
        self.commands.drain(..).collect()
    }

    /// Returns the number of queued commands, replicas included.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns the number of commands never relayed.
    pub(crate) fn unrelayed_len(&self) -> usize {
        self.commands.iter().filter(|c| c.is_unrelayed()).count()
    }

    /// Returns the URIs of queued commands, in order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.name().to_string()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
