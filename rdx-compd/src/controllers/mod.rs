//! The controllers shipped with the daemon.

pub mod arena;
pub mod state;

pub use self::arena::ArenaController;
pub use self::state::StateController;
