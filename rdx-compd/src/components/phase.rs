//! Match timing, match phases and the derived global and arena states.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Durations, in seconds, of the four phases of a match window.
///
/// A match starting at `start` occupies the half-open window
/// `[start - pre_start(), start + post_start())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MatchTiming {
    #[serde(default = "default_enter")]
    pub enter: i64,
    #[serde(default = "default_boot")]
    pub boot: i64,
    #[serde(default = "default_live")]
    pub live: i64,
    #[serde(default = "default_settle")]
    pub settle: i64,
}

fn default_enter() -> i64 {
    90
}

fn default_boot() -> i64 {
    60
}

fn default_live() -> i64 {
    180
}

fn default_settle() -> i64 {
    30
}

impl Default for MatchTiming {
    fn default() -> Self {
        Self {
            enter: default_enter(),
            boot: default_boot(),
            live: default_live(),
            settle: default_settle(),
        }
    }
}

impl MatchTiming {
    /// Time from the opening of a window to the match start.
    pub fn pre_start(&self) -> i64 {
        self.enter + self.boot
    }

    /// Time from the match start to the close of its window.
    pub fn post_start(&self) -> i64 {
        self.live + self.settle
    }

    /// Length of a whole window; also the minimum spacing between starts.
    pub fn full_match(&self) -> i64 {
        self.pre_start() + self.post_start()
    }

    /// Maps an offset from a match start onto the phase it falls in, or `None`
    /// when the offset lies outside the match window.
    pub fn phase_at(&self, offset: i64) -> Option<MatchPhase> {
        if offset < -self.pre_start() || offset >= self.post_start() {
            None
        } else if offset < -self.boot {
            Some(MatchPhase::Enter)
        } else if offset < 0 {
            Some(MatchPhase::Boot)
        } else if offset < self.live {
            Some(MatchPhase::Live)
        } else {
            Some(MatchPhase::Settle)
        }
    }
}

/// A sub-phase of a match window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    /// Teams may enter the arena and place robots.
    Enter,
    /// Arena closed, robots booting.
    Boot,
    /// The match is being played.
    Live,
    /// Match over, scores settling.
    Settle,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::Enter => "ENTER",
            MatchPhase::Boot => "BOOT",
            MatchPhase::Live => "LIVE",
            MatchPhase::Settle => "SETTLE",
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTER" => Ok(MatchPhase::Enter),
            "BOOT" => Ok(MatchPhase::Boot),
            "LIVE" => Ok(MatchPhase::Live),
            "SETTLE" => Ok(MatchPhase::Settle),
            other => Err(format!("unknown match phase {other:?}")),
        }
    }
}

/// Sub-phase label published while no match is in progress.
pub const IDLE_LABEL: &str = "IDLE";

/// The competition-wide state published on `comp.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalState {
    /// Between matches.
    Downtime,
    /// Inside a match window.
    Match(MatchPhase),
    /// Operator-declared incident. Carries the phase that was in force when
    /// the panic was raised, `None` if it happened during downtime.
    Fail(Option<MatchPhase>),
}

impl GlobalState {
    /// The first word of the wire form.
    pub fn name(&self) -> &'static str {
        match self {
            GlobalState::Downtime => "DOWNTIME",
            GlobalState::Match(_) => "MATCH",
            GlobalState::Fail(_) => "FAIL",
        }
    }

    /// The second word of the wire form.
    pub fn label(&self) -> &'static str {
        match self {
            GlobalState::Downtime | GlobalState::Fail(None) => IDLE_LABEL,
            GlobalState::Match(phase) | GlobalState::Fail(Some(phase)) => phase.as_str(),
        }
    }

    pub fn phase(&self) -> Option<MatchPhase> {
        match self {
            GlobalState::Downtime => None,
            GlobalState::Match(phase) => Some(*phase),
            GlobalState::Fail(phase) => *phase,
        }
    }

    /// Rebuilds a state from its two stored words.
    pub fn from_parts(name: &str, label: &str) -> Result<Self, String> {
        let phase = if label == IDLE_LABEL {
            None
        } else {
            Some(label.parse::<MatchPhase>()?)
        };
        match (name, phase) {
            ("DOWNTIME", _) => Ok(GlobalState::Downtime),
            ("MATCH", Some(phase)) => Ok(GlobalState::Match(phase)),
            ("MATCH", None) => Err("MATCH state without a phase".to_string()),
            ("FAIL", phase) => Ok(GlobalState::Fail(phase)),
            (other, _) => Err(format!("unknown global state {other:?}")),
        }
    }
}

impl fmt::Display for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.label())
    }
}

impl FromStr for GlobalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, label) = s
            .split_once(' ')
            .ok_or_else(|| format!("expected '<GLOBAL> <PHASE>', got {s:?}"))?;
        Self::from_parts(name, label)
    }
}

/// Physical access state of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArenaState {
    Open,
    SoftClosed,
    HardClosed,
}

impl ArenaState {
    /// Derives arena access from the global state and the tinker flag.
    pub fn derive(state: GlobalState, tinker: bool) -> Self {
        match state {
            GlobalState::Fail(_) => ArenaState::HardClosed,
            GlobalState::Downtime if tinker => ArenaState::Open,
            GlobalState::Downtime => ArenaState::SoftClosed,
            GlobalState::Match(MatchPhase::Enter) => ArenaState::Open,
            GlobalState::Match(MatchPhase::Boot | MatchPhase::Settle) => ArenaState::SoftClosed,
            GlobalState::Match(MatchPhase::Live) => ArenaState::HardClosed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaState::Open => "OPEN",
            ArenaState::SoftClosed => "SOFT-CLOSED",
            ArenaState::HardClosed => "HARD-CLOSED",
        }
    }
}

impl fmt::Display for ArenaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ArenaState::Open),
            "SOFT-CLOSED" => Ok(ArenaState::SoftClosed),
            "HARD-CLOSED" => Ok(ArenaState::HardClosed),
            other => Err(format!("unknown arena state {other:?}")),
        }
    }
}
