//! WAMP broker - one shared session for many components.
//!
//! This library sits between application components and a single
//! publish/subscribe + RPC session over a WAMP-style protocol. Components
//! call `subscribe`, `publish`, `call`, `register` and their inverses
//! whether or not the session exists yet; the broker queues, relays and
//! cleans up after them.
//!
//! # Architecture
//!
//! ```text
//! Component --submit--> Broker --no session--> CommandQueue
//!                         |                         |
//!                         +--session live--> Relay <+ (drain on open, FIFO)
//!                                              |
//!                                 Session <----+----> Registry (owner -> handles)
//! ```
//!
//! Key design principles:
//!
//! - One [`Broker`] per process; clones share state
//! - Every operation returns a [`ResultHandle`] immediately and never fails
//!   synchronously
//! - Persistent commands replay on every reconnect
//! - Owned subscriptions and registrations are released when their owner
//!   is torn down (explicitly, or by dropping its [`Scope`])
//! - The wire protocol belongs to a [`Connector`](transport::Connector);
//!   [`MemoryRouter`](transport::MemoryRouter) is the in-process one
//!
//! # Quick Start
//!
//! ```ignore
//! use wamp_broker::{Broker, CommandOptions, Result, transport::MemoryRouter};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let broker = Broker::builder()
//!         .realm("realm1")
//!         .connector(MemoryRouter::new())
//!         .build()?;
//!
//!     let panel = broker.scope_generated();
//!     panel
//!         .subscribe("com.app.ticks", |event| println!("tick {:?}", event.args), CommandOptions::persistent())
//!         .await?;
//!
//!     broker
//!         .publish(None, "com.app.ticks", vec![1.into()], Default::default(), CommandOptions::new())
//!         .await?;
//!
//!     drop(panel); // releases the subscription
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`broker`] | [`Broker`], [`Scope`], configuration and result handles |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Owner, command and handle IDs |
//! | [`protocol`] | Operations, options, payloads and URI rules |
//! | [`transport`] | Session/transport contracts and the in-memory router |

// ============================================================================
// Modules
// ============================================================================

/// Shared session broker.
///
/// Use [`Broker::builder()`] to create a configured broker.
pub mod broker;

/// Error types and result aliases.
///
/// Every submitted command settles with [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers for owners, commands and session handles.
pub mod identifiers;

/// Operations, options and payloads.
pub mod protocol;

/// Session and transport contracts.
///
/// Implement [`transport::Connector`] to plug in a real router connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Broker types
pub use broker::{
    Broker, BrokerBuilder, BrokerConfig, Outcome, Phase, RegistryEntry, ResultHandle, Scope,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, HandleId, OwnerId};

// Protocol types
pub use protocol::{
    Args, CommandOptions, Endpoint, Event, EventHandler, Invocation, KwArgs, Operation,
    OperationKind,
};
