use crate::common::{CompTime, MatchId, RealTime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompdError {
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Store connection lost")]
    Disconnected,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Malformed command envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Command '{command}' is missing argument '{argument}'")]
    MissingArgument { command: String, argument: String },

    #[error("Command '{command}' has an invalid '{argument}': {reason}")]
    InvalidArgument {
        command: String,
        argument: String,
        reason: String,
    },

    #[error("Corrupt value under '{key}': {value:?}")]
    Corrupt { key: String, value: String },

    #[error("Real time {0} has no competition time (competition not started?)")]
    UnknownTime(RealTime),

    #[error("Rejected: {0}")]
    Rejected(#[from] Rejection),
}

impl CompdError {
    /// Errors after which a controller must stop rather than keep running on
    /// stale state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CompdError::Store(_) | CompdError::Disconnected)
    }

    pub(crate) fn corrupt(key: impl Into<String>, value: impl Into<String>) -> Self {
        CompdError::Corrupt {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Why a schedule mutation was refused. The schedule is untouched whenever one
/// of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("slot starting at {start} would begin inside the current pre-roll window or earlier")]
    InThePast { start: CompTime },

    #[error("a match named '{0}' already exists")]
    DuplicateName(MatchId),

    #[error("no match named '{0}'")]
    NoSuchMatch(MatchId),

    #[error("match '{0}' has already begun its pre-roll")]
    AlreadyStarted(MatchId),

    #[error("{from} is not after the current competition time {now}")]
    NotInFuture { from: CompTime, now: CompTime },

    #[error("shifting by {by}s would overlap match '{with}'")]
    WouldOverlap { by: i64, with: MatchId },

    #[error("moving {start} by {by}s leaves competition time")]
    OutOfRange { start: CompTime, by: i64 },

    #[error("expected 3 or 4 teams, got {0}")]
    InvalidTeams(usize),

    #[error("knockout matches need a stage")]
    MissingStage,
}

pub type Result<T> = std::result::Result<T, CompdError>;
