//! Shared session broker.
//!
//! This module provides the main entry point: one [`Broker`] per process,
//! shared by every component that publishes, subscribes, calls or
//! registers.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Broker`] | Connection manager, queue and ownership registry |
//! | [`BrokerBuilder`] | Fluent configuration builder |
//! | [`BrokerConfig`] | Mergeable configuration |
//! | [`Scope`] | Per-owner facade, tears down on drop |
//! | [`ResultHandle`] | Deferred result of a submitted command |
//!
//! # Example
//!
//! ```ignore
//! use wamp_broker::{Broker, CommandOptions, Result, transport::MemoryRouter};
//!
//! # async fn example() -> Result<()> {
//! let broker = Broker::builder()
//!     .realm("realm1")
//!     .connector(MemoryRouter::new())
//!     .build()?;
//!
//! let panel = broker.scope_generated();
//! panel.subscribe("com.app.ticks", |event| println!("{:?}", event.args), CommandOptions::persistent()).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for broker configuration.
pub mod builder;

/// Queued and relayed command entity.
mod command;

/// Mergeable broker configuration.
pub mod config;

/// Core broker implementation.
pub mod core;

/// Deferred command results.
pub mod handle;

/// Pending-command queue.
mod queue;

/// Ownership registry.
pub mod registry;

/// Command dispatch onto a live session.
mod relay;

/// Per-owner facade.
pub mod scope;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BrokerBuilder;
pub use config::{BrokerConfig, CloseHook, OpenHook};
pub use core::{Broker, Phase};
pub use handle::{Outcome, ResultHandle};
pub use registry::RegistryEntry;
pub use scope::Scope;
