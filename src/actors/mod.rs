//! Actor-based collection
//!
//! Long-running parts of the hub run as independent tokio tasks that are
//! controlled through channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────┐
//!                 │   Hub (main)     │
//!                 └────────┬─────────┘
//!                          │ spawns
//!          ┌───────────────┼────────────────┐
//!          │               │                │
//!  ┌───────▼────────┐      │       ┌────────▼────────┐
//!  │ FleetCollector │      │       │   Heartbeat     │
//!  │ (one task per  │      │       │   (pings)       │
//!  │  target/cycle) │      │       └────────┬────────┘
//!  └───────┬────────┘      │                │
//!          └───────────────┼────────────────┘
//!                 ┌────────▼─────────┐
//!                 │   Broadcaster    │ (FleetEvent)
//!                 └────────┬─────────┘
//!                          │ subscribe
//!                 ┌────────▼─────────┐
//!                 │ WebSocket viewers│
//!                 └──────────────────┘
//! ```
//!
//! New alerts leave the collector through a bounded mpsc queue to the
//! `Notifier`, which talks to Discord or a webhook on its own task.
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the collector has an mpsc command channel for control messages
//!    (including connection tests, which therefore never overlap a cycle)
//! 2. **Events**: fleet events go out over a broadcast channel for fan-out
//! 3. **Request/Response**: oneshot channels carry cycle reports back

pub mod broadcast;
pub mod collector;
pub mod messages;
pub mod notifier;
