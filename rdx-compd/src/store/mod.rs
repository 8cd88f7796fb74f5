//! The shared key/value store and its publish/subscribe channels.
//!
//! Every controller talks to the rest of the system through a [`Store`]. The
//! trait exposes exactly the operations the controllers need, so the clock,
//! scheduler and state machine can run against the [`MemoryStore`] in tests
//! and against Redis in production.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::bus::BusMessage;
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;

/// A live feed of messages from the channels a listener subscribed to. The
/// stream ends when the underlying connection is lost.
pub type MessageStream = Pin<Box<dyn Stream<Item = BusMessage> + Send>>;

#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Appends to the list under `key`, creating it if needed.
    async fn rpush(&self, key: &str, value: &str) -> Result<()>;

    /// Inclusive range with Redis index semantics (`-1` is the last element).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn llen(&self, key: &str) -> Result<usize>;

    /// Lists keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;

    /// Opens a subscription to the given channels and channel patterns.
    async fn listen(&self, channels: &[String], patterns: &[String]) -> Result<MessageStream>;
}

/// Names of the keys shared between controllers.
pub mod keys {
    pub const GLOBAL_STATE: &str = "comp.state.global";
    pub const MATCH_STATE: &str = "comp.state.match";
    pub const TINKER: &str = "comp.state.tinker";
    pub const ARENA_STATE: &str = "comp.state.arena";
    pub const PAUSE: &str = "comp.pause";
    pub const SYNC: &str = "comp.sync";
    pub const CURRENT_MATCH: &str = "match.current";
    pub const SCHEDULE_STARTS: &str = "match.schedule.*.start";

    /// `match.schedule.<id>.<field>`
    pub fn schedule(id: &str, field: &str) -> String {
        format!("match.schedule.{id}.{field}")
    }

    /// Extracts the match id from a `match.schedule.<id>.start` key.
    pub fn schedule_id(key: &str) -> Option<&str> {
        key.strip_prefix("match.schedule.")?.strip_suffix(".start")
    }

    /// `teams.<tla>.<field>`
    pub fn team(tla: &str, field: &str) -> String {
        format!("teams.{tla}.{field}")
    }
}

/// Redis-style glob matching supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns() {
        assert!(glob_match("match.schedule.*.start", "match.schedule.A1.start"));
        assert!(!glob_match("match.schedule.*.start", "match.schedule.A1.state"));
        assert!(glob_match("controller.*.heartbeat", "controller.state.heartbeat"));
        assert!(glob_match("comp.?ause", "comp.pause"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn schedule_id_round_trip() {
        let key = keys::schedule("Q3", "start");
        assert_eq!(keys::schedule_id(&key), Some("Q3"));
        assert_eq!(keys::schedule_id("match.schedule.Q3.teams"), None);
    }
}
