//! Session and transport layer.
//!
//! The broker never speaks the wire protocol itself. A transport provider
//! supplies three pieces:
//!
//! ```text
//! ┌──────────────┐  connect(config, listener)  ┌──────────────┐
//! │    Broker    │────────────────────────────►│  Connector   │
//! │              │                             └──────┬───────┘
//! │              │  open / close / is_*               │ builds
//! │              │────────────────────────────►┌──────▼───────┐
//! │              │◄──── opened(session) ───────│  Transport   │
//! │              │◄──── closed(reason) ────────│              │
//! │              │                             └──────────────┘
//! │              │  subscribe / publish / ...  ┌──────────────┐
//! │    Relay     │────────────────────────────►│   Session    │
//! └──────────────┘                             └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Transport`], [`Connector`] and the [`SessionListener`] hooks |
//! | `session` | [`Session`] contract, [`SessionHandle`], [`Release`] |
//! | `memory` | In-process [`MemoryRouter`] |

// ============================================================================
// Submodules
// ============================================================================

/// Connection lifecycle contract.
pub mod connection;

/// In-process router.
pub mod memory;

/// Session contract.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connector, Details, SessionListener, SessionObserver, Transport};
pub use memory::{JournalEntry, MemoryRouter};
pub use session::{Progress, Release, Session, SessionFuture, SessionHandle};
