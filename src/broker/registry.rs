//! Ownership registry.
//!
//! Tracks which subscriptions and registrations each owner created on the
//! current session, so they can be released together when the owner goes
//! away.
//!
//! Entries are only valid for the session that issued their handles. The
//! registry carries an epoch that advances on every [`Registry::reset`]; a
//! relay records its entry only if the epoch it started under is still
//! current.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::identifiers::OwnerId;
use crate::protocol::OperationKind;
use crate::transport::SessionHandle;

// ============================================================================
// RegistryEntry
// ============================================================================

/// A live subscription or registration and its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Owner that created it.
    pub owner: OwnerId,
    /// Topic or procedure URI.
    pub name: String,
    /// `Subscribe` or `Register`.
    pub kind: OperationKind,
    /// Handle needed to cancel it.
    pub handle: SessionHandle,
}

impl RegistryEntry {
    /// Creates an entry for a handle issued to `owner`.
    #[must_use]
    pub fn new(owner: OwnerId, handle: SessionHandle) -> Self {
        Self {
            owner,
            name: handle.uri.clone(),
            kind: handle.kind,
            handle,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Owner to live-entry mapping for one session at a time.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    epoch: u64,
    entries: FxHashMap<OwnerId, Vec<RegistryEntry>>,
}

impl Registry {
    /// Creates an empty registry at epoch zero.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the current session epoch.
    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Discards every entry and starts a new epoch.
    ///
    /// Used when the session goes away: its handles are meaningless, so
    /// nothing is released. Returns the number of entries discarded.
    pub(crate) fn reset(&mut self) -> usize {
        self.epoch += 1;
        let discarded = self.len();
        self.entries.clear();
        discarded
    }

    /// Appends an entry to its owner's list.
    ///
    /// Returns `false` without recording if `epoch` is stale.
    pub(crate) fn record(&mut self, epoch: u64, entry: RegistryEntry) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.entries
            .entry(entry.owner.clone())
            .or_default()
            .push(entry);
        true
    }

    /// Removes and returns every entry of `owner`.
    pub(crate) fn take_owner(&mut self, owner: &OwnerId) -> Vec<RegistryEntry> {
        self.entries.remove(owner).unwrap_or_default()
    }

    /// Removes and returns the entries of `owner` with this kind and name.
    pub(crate) fn take_named(
        &mut self,
        owner: &OwnerId,
        kind: OperationKind,
        name: &str,
    ) -> Vec<RegistryEntry> {
        let Some(list) = self.entries.get_mut(owner) else {
            return Vec::new();
        };

        let (taken, kept): (Vec<_>, Vec<_>) = list
            .drain(..)
            .partition(|entry| entry.kind == kind && entry.name == name);
        *list = kept;

        if list.is_empty() {
            self.entries.remove(owner);
        }
        taken
    }

    /// Drops every owner's entries with this kind and name.
    ///
    /// Returns the number of entries dropped.
    pub(crate) fn forget_named(&mut self, kind: OperationKind, name: &str) -> usize {
        let before = self.len();
        self.entries.retain(|_, list| {
            list.retain(|entry| !(entry.kind == kind && entry.name == name));
            !list.is_empty()
        });
        before - self.len()
    }

    /// Removes and returns every entry of every owner.
    pub(crate) fn take_all(&mut self) -> Vec<RegistryEntry> {
        self.entries.drain().flat_map(|(_, list)| list).collect()
    }

    /// Returns the total number of entries.
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns the number of entries held by `owner`.
    pub(crate) fn owner_len(&self, owner: &OwnerId) -> usize {
        self.entries.get(owner).map_or(0, Vec::len)
    }

    /// Returns a copy of `owner`'s entries, in registration order.
    pub(crate) fn entries(&self, owner: &OwnerId) -> Vec<RegistryEntry> {
        self.entries.get(owner).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::HandleId;

    fn entry(owner: &str, id: u64, name: &str, kind: OperationKind) -> RegistryEntry {
        RegistryEntry::new(
            OwnerId::new(owner),
            SessionHandle::new(HandleId::new(id), name, kind),
        )
    }

    #[test]
    fn test_record_groups_by_owner() {
        let mut registry = Registry::new();
        let epoch = registry.epoch();

        assert!(registry.record(epoch, entry("p", 1, "com.app.topic", OperationKind::Subscribe)));
        assert!(registry.record(epoch, entry("q", 2, "com.app.topic", OperationKind::Subscribe)));
        assert!(registry.record(epoch, entry("p", 3, "com.app.echo", OperationKind::Register)));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.owner_len(&OwnerId::new("p")), 2);
        assert_eq!(registry.owner_len(&OwnerId::new("q")), 1);
    }

    #[test]
    fn test_take_owner_leaves_others() {
        let mut registry = Registry::new();
        registry.record(0, entry("p", 1, "com.app.topic", OperationKind::Subscribe));
        registry.record(0, entry("q", 2, "com.app.topic", OperationKind::Subscribe));

        let taken = registry.take_owner(&OwnerId::new("p"));
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].handle.id, HandleId::new(1));
        assert_eq!(registry.owner_len(&OwnerId::new("p")), 0);
        assert_eq!(registry.owner_len(&OwnerId::new("q")), 1);

        assert!(registry.take_owner(&OwnerId::new("p")).is_empty());
    }

    #[test]
    fn test_take_named_matches_kind_and_name() {
        let mut registry = Registry::new();
        let owner = OwnerId::new("p");
        registry.record(0, entry("p", 1, "com.app.a", OperationKind::Subscribe));
        registry.record(0, entry("p", 2, "com.app.a", OperationKind::Register));
        registry.record(0, entry("p", 3, "com.app.a", OperationKind::Subscribe));
        registry.record(0, entry("p", 4, "com.app.b", OperationKind::Subscribe));

        let taken = registry.take_named(&owner, OperationKind::Subscribe, "com.app.a");
        let ids: Vec<u64> = taken.iter().map(|e| e.handle.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 3]);

        let left: Vec<u64> = registry
            .entries(&owner)
            .iter()
            .map(|e| e.handle.id.as_u64())
            .collect();
        assert_eq!(left, vec![2, 4]);
    }

    #[test]
    fn test_take_named_drops_empty_owner() {
        let mut registry = Registry::new();
        let owner = OwnerId::new("p");
        registry.record(0, entry("p", 1, "com.app.a", OperationKind::Subscribe));

        registry.take_named(&owner, OperationKind::Subscribe, "com.app.a");
        assert_eq!(registry.len(), 0);
        assert!(registry.take_named(&owner, OperationKind::Subscribe, "com.app.a").is_empty());
    }

    #[test]
    fn test_reset_rejects_stale_epoch() {
        let mut registry = Registry::new();
        let stale = registry.epoch();
        registry.record(stale, entry("p", 1, "com.app.a", OperationKind::Subscribe));

        assert_eq!(registry.reset(), 1);
        assert_eq!(registry.len(), 0);
        assert!(!registry.record(stale, entry("p", 2, "com.app.a", OperationKind::Subscribe)));
        assert!(registry.record(registry.epoch(), entry("p", 3, "com.app.a", OperationKind::Subscribe)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_forget_named_spans_owners() {
        let mut registry = Registry::new();
        registry.record(0, entry("p", 1, "com.app.a", OperationKind::Subscribe));
        registry.record(0, entry("q", 2, "com.app.a", OperationKind::Subscribe));
        registry.record(0, entry("q", 3, "com.app.a", OperationKind::Register));

        assert_eq!(registry.forget_named(OperationKind::Subscribe, "com.app.a"), 2);
        assert_eq!(registry.owner_len(&OwnerId::new("p")), 0);
        assert_eq!(registry.owner_len(&OwnerId::new("q")), 1);
    }

    #[test]
    fn test_take_all_empties_registry() {
        let mut registry = Registry::new();
        registry.record(0, entry("p", 1, "com.app.a", OperationKind::Subscribe));
        registry.record(0, entry("q", 2, "com.app.b", OperationKind::Register));

        let mut taken = registry.take_all();
        taken.sort_by_key(|e| e.handle.id);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].kind, OperationKind::Register);
        assert_eq!(registry.len(), 0);
    }
}
