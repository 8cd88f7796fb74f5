//! Contains the building blocks the controllers are assembled from.
//!
//! The clock, the schedule and the phase state machine are owned by the
//! orchestrating controller; the phase types are shared by everything that
//! reads the published state.

pub mod clock;
pub mod phase;
pub mod schedule;
pub mod scheduler;
pub mod state_machine;
pub mod teams;
