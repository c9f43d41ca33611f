//! Shared session walkthrough against the in-memory router.
//!
//! Demonstrates:
//! - Queueing operations before the session opens
//! - Persistent subscriptions surviving a lost session
//! - Calling a registered procedure with progressive results
//! - Per-owner teardown when a scope is dropped
//!
//! Usage:
//!   cargo run --example pubsub
//!   cargo run --example pubsub -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tracing_subscriber::EnvFilter;
use wamp_broker::protocol::reason;
use wamp_broker::transport::MemoryRouter;
use wamp_broker::{Broker, CommandOptions, Event, Invocation, KwArgs, Result};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let debug = std::env::args().any(|a| a == "--debug");
    init_logging(debug);

    if let Err(e) = run(debug).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(debug: bool) -> Result<()> {
    println!("=== Shared Session Broker ===\n");

    // ========================================================================
    // Create Broker
    // ========================================================================

    let router = MemoryRouter::manual();
    let broker = Broker::builder()
        .realm("realm1")
        .debug(debug)
        .on_open(|_, details| println!("        [hook] session open {details:?}"))
        .on_close(|reason, _| println!("        [hook] session closed: {reason}"))
        .connector(router.clone())
        .build()?;

    // ========================================================================
    // Queue Before Open
    // ========================================================================

    println!("[1] Queueing before the router accepts...");
    let ticks = Arc::new(AtomicUsize::new(0));
    let panel = broker.scope_for_component("TickerPanel", 1);

    let counter = Arc::clone(&ticks);
    let subscribed = panel.subscribe(
        "com.demo.tick",
        move |event: Event| {
            counter.fetch_add(1, Ordering::SeqCst);
            println!("        tick {:?} for {:?}", event.args, event.owner);
        },
        CommandOptions::persistent(),
    );
    let registered = panel.register(
        "com.demo.countdown",
        |inv: Invocation| {
            let from = inv.args.first().and_then(|v| v.as_u64()).unwrap_or(3);
            for n in (1..=from).rev() {
                inv.notify(json!(n));
            }
            Ok(json!("liftoff"))
        },
        CommandOptions::new(),
    );
    println!("        queued: {}, phase: {}", broker.queued_len(), broker.phase());

    router.accept();
    subscribed.await?;
    registered.await?;
    println!("        ✓ drained, registry: {}\n", broker.registry_len());

    // ========================================================================
    // Publish & Call
    // ========================================================================

    println!("[2] Publishing and calling...");
    router.emit("com.demo.tick", vec![json!(1)], KwArgs::new());

    let mut call = broker.call(
        None,
        "com.demo.countdown",
        vec![json!(3)],
        KwArgs::new(),
        CommandOptions::new().with_receive_progress(),
    );
    let mut progress = call.progress();
    let result = call.value().await?;
    if let Some(progress) = progress.as_mut() {
        while let Ok(step) = progress.try_recv() {
            println!("        progress {step}");
        }
    }
    println!("        ✓ call returned {result}\n");

    // ========================================================================
    // Lost Session
    // ========================================================================

    println!("[3] Dropping the connection...");
    router.drop_connections();
    println!("        phase: {}, lost: {}", broker.phase(), broker.was_lost());

    broker.open();
    router.accept();
    tokio::task::yield_now().await;
    router.emit("com.demo.tick", vec![json!(2)], KwArgs::new());
    println!(
        "        ✓ replayed, subscribers: {}\n",
        router.subscription_count("com.demo.tick")
    );

    // ========================================================================
    // Teardown
    // ========================================================================

    println!("[4] Dropping the panel scope...");
    drop(panel);
    tokio::task::yield_now().await;
    println!(
        "        ✓ registered: {}, ticks seen: {}\n",
        router.is_registered("com.demo.countdown"),
        ticks.load(Ordering::SeqCst)
    );

    broker.close(reason::NORMAL, Some("demo finished"));
    println!("=== Done ===");
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "wamp_broker=debug"
    } else {
        "wamp_broker=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
