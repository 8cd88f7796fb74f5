//! Defines every event the controllers broadcast on the bus.
//!
//! Each event knows its channel and its wire payload, and can be decoded back
//! from a received [`BusMessage`]. Consumers such as screens or the arena relay
//! react to these rather than polling the store.

use crate::bus::BusMessage;
use crate::common::{CompTime, RealTime};
use crate::components::phase::{ArenaState, GlobalState};
use crate::error::Result;
use crate::store::Store;

/// Channel names.
pub mod channels {
    pub const COMMAND: &str = "comp.command";
    pub const HEARTBEAT: &str = "comp.heartbeat";
    pub const STATE: &str = "comp.state";
    pub const OFFSET_SHIFT: &str = "comp.offset_shift";
    pub const KICKOFF: &str = "comp.kickoff";
    pub const ARENA: &str = "comp.arena";
    pub const RESCHEDULE: &str = "match.reschedule";
    pub const SCORES: &str = "match.current.scores";

    pub fn liveness(controller: &str) -> String {
        format!("controller.{controller}.heartbeat")
    }

    pub fn team(tla: &str) -> String {
        format!("teams.{tla}")
    }
}

/// Payload of the trigger-only channels.
pub const TRIGGER: &str = "trigger";

/// What happened to a team record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamChange {
    New,
    Updated,
    Gone,
}

impl TeamChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamChange::New => "new",
            TeamChange::Updated => "updated",
            TeamChange::Gone => "gone",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompEvent {
    /// The authoritative clock reading, once per tick.
    Heartbeat {
        real_time: RealTime,
        competition_time: CompTime,
    },
    /// The global state changed.
    StateChanged(GlobalState),
    /// The real/competition mapping moved; cached time-derived values are stale.
    OffsetShift,
    /// The competition has started.
    Kickoff,
    /// The match schedule was mutated.
    Reschedule,
    ArenaChanged(ArenaState),
    /// Scores of the current match, aligned with its teams.
    Scores(Vec<i64>),
    TeamChanged { tla: String, change: TeamChange },
    /// A controller's periodic liveness report.
    Liveness { controller: String, status: String },
}

impl CompEvent {
    pub fn channel(&self) -> String {
        match self {
            CompEvent::Heartbeat { .. } => channels::HEARTBEAT.to_string(),
            CompEvent::StateChanged(_) => channels::STATE.to_string(),
            CompEvent::OffsetShift => channels::OFFSET_SHIFT.to_string(),
            CompEvent::Kickoff => channels::KICKOFF.to_string(),
            CompEvent::Reschedule => channels::RESCHEDULE.to_string(),
            CompEvent::ArenaChanged(_) => channels::ARENA.to_string(),
            CompEvent::Scores(_) => channels::SCORES.to_string(),
            CompEvent::TeamChanged { tla, .. } => channels::team(tla),
            CompEvent::Liveness { controller, .. } => channels::liveness(controller),
        }
    }

    pub fn payload(&self) -> String {
        match self {
            CompEvent::Heartbeat {
                real_time,
                competition_time,
            } => format!("{real_time} {competition_time}"),
            CompEvent::StateChanged(state) => state.to_string(),
            CompEvent::OffsetShift | CompEvent::Kickoff | CompEvent::Reschedule => {
                TRIGGER.to_string()
            }
            CompEvent::ArenaChanged(arena) => arena.to_string(),
            CompEvent::Scores(scores) => scores
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            CompEvent::TeamChanged { change, .. } => change.as_str().to_string(),
            CompEvent::Liveness { status, .. } => status.clone(),
        }
    }

    /// Decodes a received message. `None` for channels that carry no
    /// [`CompEvent`] (such as `comp.command`) or for garbled payloads.
    pub fn parse(message: &BusMessage) -> Option<Self> {
        let payload = message.payload.as_str();
        match message.channel.as_str() {
            channels::HEARTBEAT => {
                let (real, competition) = payload.split_once(' ')?;
                Some(CompEvent::Heartbeat {
                    real_time: real.parse().ok()?,
                    competition_time: competition.parse().ok()?,
                })
            }
            channels::STATE => payload.parse().ok().map(CompEvent::StateChanged),
            channels::OFFSET_SHIFT => Some(CompEvent::OffsetShift),
            channels::KICKOFF => Some(CompEvent::Kickoff),
            channels::RESCHEDULE => Some(CompEvent::Reschedule),
            channels::ARENA => payload.parse().ok().map(CompEvent::ArenaChanged),
            channels::SCORES => payload
                .split_whitespace()
                .map(|score| score.parse().ok())
                .collect::<Option<Vec<_>>>()
                .map(CompEvent::Scores),
            channel => {
                if let Some(tla) = channel.strip_prefix("teams.") {
                    let change = match payload {
                        "new" => TeamChange::New,
                        "updated" => TeamChange::Updated,
                        "gone" => TeamChange::Gone,
                        _ => return None,
                    };
                    return Some(CompEvent::TeamChanged {
                        tla: tla.to_string(),
                        change,
                    });
                }
                let controller = channel
                    .strip_prefix("controller.")?
                    .strip_suffix(".heartbeat")?;
                Some(CompEvent::Liveness {
                    controller: controller.to_string(),
                    status: payload.to_string(),
                })
            }
        }
    }

    pub async fn publish(&self, store: &dyn Store) -> Result<()> {
        store.publish(&self.channel(), &self.payload()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::phase::MatchPhase;

    fn wire(event: &CompEvent) -> BusMessage {
        BusMessage::new(event.channel(), event.payload())
    }

    #[test]
    fn wire_forms() {
        let heartbeat = CompEvent::Heartbeat {
            real_time: 1500,
            competition_time: 500,
        };
        assert_eq!(wire(&heartbeat), BusMessage::new("comp.heartbeat", "1500 500"));
        assert_eq!(
            wire(&CompEvent::StateChanged(GlobalState::Match(MatchPhase::Live))),
            BusMessage::new("comp.state", "MATCH LIVE")
        );
        assert_eq!(
            wire(&CompEvent::Reschedule),
            BusMessage::new("match.reschedule", "trigger")
        );
        assert_eq!(
            wire(&CompEvent::Liveness {
                controller: "state".to_string(),
                status: "paused".to_string()
            }),
            BusMessage::new("controller.state.heartbeat", "paused")
        );
    }

    #[test]
    fn decodes_consumer_channels() {
        let scores = BusMessage::new("match.current.scores", "0 3 1 0");
        assert_eq!(CompEvent::parse(&scores), Some(CompEvent::Scores(vec![0, 3, 1, 0])));
        let team = BusMessage::new("teams.ABC", "gone");
        assert_eq!(
            CompEvent::parse(&team),
            Some(CompEvent::TeamChanged {
                tla: "ABC".to_string(),
                change: TeamChange::Gone
            })
        );
    }

    #[test]
    fn ignores_commands_and_garbage() {
        assert_eq!(CompEvent::parse(&BusMessage::new("comp.command", "{}")), None);
        assert_eq!(CompEvent::parse(&BusMessage::new("comp.state", "MATCH")), None);
        assert_eq!(CompEvent::parse(&BusMessage::new("comp.heartbeat", "12")), None);
        assert_eq!(CompEvent::parse(&BusMessage::new("teams.ABC", "renamed")), None);
    }
}
