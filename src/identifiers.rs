//! Type-safe identifiers for broker entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`OwnerId`] | Component on whose behalf subscriptions are made |
//! | [`CommandId`] | Submitted command, for log correlation |
//! | [`HandleId`] | Subscription or registration issued by a session |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Prefix stripped from component-derived keys.
const COMPONENT_PREFIX: &str = "vm-";

/// Uppercase ASCII and Latin-1 uppercase letters.
static UPPERCASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z\u{00C0}-\u{00D6}\u{00D8}-\u{00DE}]").expect("valid regex"));

/// Counter for command IDs.
static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// OwnerId
// ============================================================================

/// Identity of a calling component.
///
/// Used only for registry bookkeeping: every subscription or registration
/// made under an owner is released when that owner is torn down. Commands
/// without an owner are global and never tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(Arc<str>);

impl OwnerId {
    /// Generates a fresh, collision-free owner identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Wraps an explicit identity supplied by the adapter layer.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Derives a deterministic key from a component type name and instance id.
    ///
    /// The type name is kebab-cased, then the leading `-` left by an
    /// initial capital and a leading `vm-` are stripped, so
    /// `("VmProfileCard", 7)` becomes `profile-card-7` and `("Vue", 5)`
    /// becomes `vue-5`.
    #[must_use]
    pub fn from_component(type_name: &str, instance_id: impl fmt::Display) -> Self {
        let kebab = UPPERCASE.replace_all(type_name, |caps: &regex::Captures<'_>| {
            format!("-{}", caps[0].to_lowercase())
        });
        let key = format!("{kebab}-{instance_id}");
        let key = key.trim_start_matches('-');
        let key = key.strip_prefix(COMPONENT_PREFIX).unwrap_or(key);
        Self(Arc::from(key))
    }

    /// Returns the identity as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for OwnerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OwnerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// Sequential identifier of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    /// Allocates the next command ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// HandleId
// ============================================================================

/// Identifier of a subscription or registration, assigned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    /// Creates a handle ID from a session-assigned value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_owners_are_distinct() {
        assert_ne!(OwnerId::generate(), OwnerId::generate());
    }

    #[test]
    fn test_from_component_kebab_cases_and_strips_prefix() {
        let owner = OwnerId::from_component("VmProfileCard", 7);
        assert_eq!(owner.as_str(), "profile-card-7");
    }

    #[test]
    fn test_from_component_trims_leading_dash() {
        let owner = OwnerId::from_component("Vue", 5);
        assert_eq!(owner.as_str(), "vue-5");
    }

    #[test]
    fn test_owner_serializes_as_string() {
        let owner = OwnerId::new("panel-1");
        let json = serde_json::to_value(&owner).unwrap();
        assert_eq!(json, serde_json::json!("panel-1"));

        let back: OwnerId = serde_json::from_value(json).unwrap();
        assert_eq!(back, owner);
    }

    #[test]
    fn test_from_component_lowercase_name() {
        let owner = OwnerId::from_component("sidebar", 3);
        assert_eq!(owner.as_str(), "sidebar-3");
    }

    #[test]
    fn test_from_component_latin1_uppercase() {
        let owner = OwnerId::from_component("ÉtatPanel", 1);
        assert_eq!(owner.as_str(), "état-panel-1");
    }

    #[test]
    fn test_from_component_is_stable_and_distinct() {
        let a = OwnerId::from_component("Chat", 1);
        let b = OwnerId::from_component("Chat", 1);
        let c = OwnerId::from_component("Chat", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_command_ids_increase() {
        let a = CommandId::next();
        let b = CommandId::next();
        assert!(b > a);
    }

    #[test]
    fn test_handle_id_display() {
        assert_eq!(HandleId::new(42).to_string(), "42");
    }
}
