//! Contains common, primitive types shared by every controller.
//!
//! Times are whole seconds. Two time domains exist side by side: wall-clock
//! ("real") time and logical competition time, which starts at zero on kickoff
//! and stands still while the competition is paused. Keeping them as distinct
//! aliases makes signatures say which domain a value lives in.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

/// Wall-clock seconds since the Unix epoch.
pub type RealTime = i64;

/// Logical seconds of competition time since kickoff.
pub type CompTime = i64;

new_key_type! {
    /// Uniquely identifies a live subscription on the in-memory bus.
    pub struct SubscriberId;
}

/// The unique name of a scheduled match, e.g. `"A1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
