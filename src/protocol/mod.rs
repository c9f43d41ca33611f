//! Broker protocol types.
//!
//! This module defines what a caller hands to the broker and what the
//! broker hands back to handlers. The wire format itself belongs to the
//! session provider.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | [`Operation`] variants and their [`OperationKind`] tags |
//! | `message` | Payloads, callbacks, close reasons, URI validation |
//! | `options` | Per-command [`CommandOptions`] |

// ============================================================================
// Submodules
// ============================================================================

/// Operation definitions.
pub mod command;

/// Payloads, callbacks and URI rules.
pub mod message;

/// Per-command options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Operation, OperationKind};
pub use message::{
    Args, Endpoint, Event, EventHandler, Invocation, KwArgs, bind_endpoint, bind_handler,
    is_valid_uri, reason, validate_uri,
};
pub use options::CommandOptions;
