//! # compd
//!
//! Coordination daemon for a live, timed competition.
//!
//! Several independently running controllers share one key/value store and
//! its publish/subscribe channels. Together they agree on a single pausable
//! competition clock, a single published phase state and a single match
//! schedule.
//!
//! ## Core Concepts
//!
//! - **Competition clock**: logical seconds since kickoff, derived from the
//!   wall clock through an append-only log of sync points. It stands still
//!   while paused.
//! - **Phase state machine**: on every tick the orchestrating controller
//!   looks up the match whose window contains the current competition time and
//!   publishes `DOWNTIME`, `MATCH <phase>` or `FAIL` transitions.
//! - **Match scheduler**: insertion, cancellation and delay of matches, with
//!   cascading shifts that keep match windows from ever overlapping.
//! - **Controllers**: each one owns a disjoint set of commands on the shared
//!   `comp.command` channel and runs in its own serialized loop.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use compd::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(CompdConfig::default());
//!     let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.store.redis_url).await?);
//!
//!     let state = StateController::new(store.clone(), Arc::new(WallClock), config.clone());
//!     let runtime = ControllerRuntime::new(state, store, config);
//!     let shutdown = runtime.shutdown_handle();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         shutdown.send(()).ok();
//!     });
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "compd";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bus;
pub mod command;
pub mod common;
pub mod components;
pub mod config;
pub mod controllers;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;
pub mod time;

/// A prelude module for easy importing of the most common types.
pub mod prelude {
    pub use crate::command::CommandEnvelope;
    pub use crate::common::{CompTime, MatchId, RealTime};
    pub use crate::components::phase::{ArenaState, GlobalState, MatchPhase, MatchTiming};
    pub use crate::config::{ClockResolution, CompdConfig};
    pub use crate::controllers::{ArenaController, StateController};
    pub use crate::engine::{Controller, ControllerRuntime};
    pub use crate::error::{CompdError, Rejection, Result};
    pub use crate::events::CompEvent;
    pub use crate::store::{MemoryStore, RedisStore, Store};
    pub use crate::time::{ManualClock, TimeSource, WallClock};
}
