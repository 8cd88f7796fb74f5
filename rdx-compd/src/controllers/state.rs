//! The orchestrating controller.
//!
//! Owns the competition clock, the phase state machine, the match schedule and
//! the team records. It is the only process that writes them; every other
//! controller follows along through the store and the bus.

use crate::command::{CommandArgs, Dispatcher};
use crate::common::{CompTime, MatchId, RealTime};
use crate::components::clock::CompetitionClock;
use crate::components::phase::GlobalState;
use crate::components::schedule::{MatchRequest, MatchType};
use crate::components::scheduler::MatchScheduler;
use crate::components::state_machine::PhaseStateMachine;
use crate::components::teams::{TeamRegistry, TeamUpdate};
use crate::config::CompdConfig;
use crate::engine::Controller;
use crate::error::{CompdError, Result};
use crate::events::CompEvent;
use crate::store::{keys, Store};
use crate::time::{format_real_time, TimeSource};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Commands owned by the state controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateCommand {
    Panic,
    PanicOver,
    Pause,
    Unpause,
    StartCompetition,
    AddTeam {
        tla: String,
        name: String,
        college: Option<String>,
        info: String,
    },
    UpdateTeam {
        tla: String,
        update: TeamUpdate,
    },
    RemoveTeam {
        tla: String,
    },
    ScheduleMatch {
        name: MatchId,
        kind: MatchType,
        /// Wall-clock start.
        start: RealTime,
        stage: Option<u32>,
        teams: Vec<String>,
    },
    CancelMatch {
        name: MatchId,
    },
    DelayMatches {
        /// Wall-clock time from which matches move.
        start: RealTime,
        by: i64,
    },
}

fn parse_schedule_match(args: &CommandArgs) -> Result<StateCommand> {
    let kind: String = args.required("type")?;
    let kind = kind
        .parse()
        .map_err(|reason| CompdError::InvalidArgument {
            command: "schedule-match".to_string(),
            argument: "type".to_string(),
            reason,
        })?;
    Ok(StateCommand::ScheduleMatch {
        name: MatchId::new(args.required::<String>("name")?),
        kind,
        start: args.required("start")?,
        stage: args.optional("stage")?,
        teams: args.optional_or("teams", Vec::new())?,
    })
}

fn parse_delay_matches(args: &CommandArgs) -> Result<StateCommand> {
    let by = match args.optional("by")? {
        Some(by) => by,
        None => args.required("amount")?,
    };
    Ok(StateCommand::DelayMatches {
        start: args.required("start")?,
        by,
    })
}

pub struct StateController {
    store: Arc<dyn Store>,
    config: Arc<CompdConfig>,
    clock: CompetitionClock,
    machine: PhaseStateMachine,
    scheduler: MatchScheduler,
    teams: TeamRegistry,
    /// Set once the competition has started; the clock only drives state
    /// from then on.
    active: bool,
}

impl StateController {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeSource>, config: Arc<CompdConfig>) -> Self {
        Self {
            clock: CompetitionClock::new(store.clone(), time),
            machine: PhaseStateMachine::new(store.clone()),
            scheduler: MatchScheduler::new(store.clone(), config.timing),
            teams: TeamRegistry::new(store.clone()),
            store,
            config,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn clock(&self) -> &CompetitionClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &MatchScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> Option<GlobalState> {
        self.machine.current()
    }

    fn to_competition(&self, real: RealTime) -> Result<CompTime> {
        self.clock
            .real_to_competition(real)
            .ok_or(CompdError::UnknownTime(real))
    }

    async fn panic(&mut self) -> Result<()> {
        if self.machine.is_failed() {
            debug!("Already in FAIL");
            return Ok(());
        }
        self.clock.pause().await?;
        let phase = self.machine.current().and_then(|state| state.phase());
        warn!("PANIC raised at competition time {}", self.clock.competition_time());
        self.machine.transition(GlobalState::Fail(phase)).await?;
        Ok(())
    }

    async fn panic_over(&mut self) -> Result<()> {
        let Some(GlobalState::Fail(phase)) = self.machine.current() else {
            debug!("panic-over outside FAIL ignored");
            return Ok(());
        };
        if self.config.panic_over_resumes {
            self.clock.resume().await?;
        }
        let restored = match phase {
            Some(phase) if self.store.get(keys::CURRENT_MATCH).await?.is_some() => {
                GlobalState::Match(phase)
            }
            _ => GlobalState::Downtime,
        };
        info!("Panic over, restoring {}", restored);
        self.machine.transition(restored).await?;
        Ok(())
    }

    async fn start_competition(&mut self) -> Result<()> {
        CompEvent::Kickoff.publish(self.store.as_ref()).await?;
        self.clock.start().await?;
        self.store.set(keys::TINKER, "true").await?;
        self.machine.transition(GlobalState::Downtime).await?;
        self.active = true;
        info!(
            "Competition started at {}",
            format_real_time(self.clock.real_time(), &self.config.timezone)
        );
        Ok(())
    }

    async fn schedule_match(
        &mut self,
        name: MatchId,
        kind: MatchType,
        start: RealTime,
        stage: Option<u32>,
        teams: Vec<String>,
    ) -> Result<()> {
        let now = self.clock.tick();
        let request = MatchRequest {
            id: name,
            kind,
            start: self.to_competition(start)?,
            stage,
            teams,
        };
        let id = request.id.clone();
        let start_ct = self.scheduler.schedule_match(now, request).await?;
        if let Some(real) = self.clock.competition_to_real(start_ct) {
            info!(
                "Match {} starts at {}",
                id,
                format_real_time(real, &self.config.timezone)
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for StateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateController")
            .field("active", &self.active)
            .field("state", &self.machine.current())
            .field("paused", &self.clock.is_paused())
            .finish()
    }
}

#[async_trait]
impl Controller for StateController {
    type Command = StateCommand;

    fn name(&self) -> &'static str {
        "state"
    }

    fn commands(&self) -> Dispatcher<StateCommand> {
        Dispatcher::new()
            .register("panic", |_| Ok(StateCommand::Panic))
            .register("panic-over", |_| Ok(StateCommand::PanicOver))
            .register("pause", |_| Ok(StateCommand::Pause))
            .register("unpause", |_| Ok(StateCommand::Unpause))
            .register("start-competition", |_| Ok(StateCommand::StartCompetition))
            .register("add-team", |args| {
                Ok(StateCommand::AddTeam {
                    tla: args.required("tla")?,
                    name: args.required("name")?,
                    college: args.optional("college")?,
                    info: args.optional_or("info", String::new())?,
                })
            })
            .register("update-team", |args| {
                Ok(StateCommand::UpdateTeam {
                    tla: args.required("tla")?,
                    update: TeamUpdate {
                        name: args.optional("name")?,
                        college: args.optional("college")?,
                        info: args.optional("info")?,
                        notes: args.optional("notes")?,
                        disqualified: args.optional_or("disqualified", false)?,
                    },
                })
            })
            .register("remove-team", |args| {
                Ok(StateCommand::RemoveTeam {
                    tla: args.required("tla")?,
                })
            })
            .register("schedule-match", parse_schedule_match)
            .register("cancel-match", |args| {
                Ok(StateCommand::CancelMatch {
                    name: MatchId::new(args.required::<String>("name")?),
                })
            })
            .register("delay-matches", parse_delay_matches)
    }

    async fn configure(&mut self) -> Result<()> {
        self.clock.load().await?;
        self.scheduler.load().await?;
        self.machine.load().await?;
        self.active = self.machine.is_active();
        if self.active {
            info!(
                "Resuming competition at {} ({})",
                self.clock.competition_time(),
                if self.clock.is_paused() { "paused" } else { "running" }
            );
        }
        Ok(())
    }

    async fn status(&self) -> Result<String> {
        Ok(if self.clock.is_paused() { "paused" } else { "running" }.to_string())
    }

    async fn handle_command(&mut self, command: StateCommand) -> Result<()> {
        debug!("Handling {:?}", command);
        match command {
            StateCommand::Panic => self.panic().await,
            StateCommand::PanicOver => self.panic_over().await,
            StateCommand::Pause => {
                if !self.clock.pause().await? {
                    debug!("Clock already paused");
                }
                Ok(())
            }
            StateCommand::Unpause => {
                if !self.clock.resume().await? {
                    debug!("Clock not paused");
                }
                Ok(())
            }
            StateCommand::StartCompetition => self.start_competition().await,
            StateCommand::AddTeam {
                tla,
                name,
                college,
                info,
            } => self.teams.add(&tla, &name, college.as_deref(), &info).await,
            StateCommand::UpdateTeam { tla, update } => self.teams.update(&tla, update).await,
            StateCommand::RemoveTeam { tla } => self.teams.remove(&tla).await,
            StateCommand::ScheduleMatch {
                name,
                kind,
                start,
                stage,
                teams,
            } => self.schedule_match(name, kind, start, stage, teams).await,
            StateCommand::CancelMatch { name } => {
                let now = self.clock.tick();
                self.scheduler.cancel_match(now, &name).await
            }
            StateCommand::DelayMatches { start, by } => {
                let now = self.clock.tick();
                let from = self.to_competition(start)?;
                self.scheduler.delay_matches(now, from, by).await?;
                Ok(())
            }
        }
    }

    /// The master heartbeat.
    async fn tick(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let competition_time = self.clock.tick();
        CompEvent::Heartbeat {
            real_time: self.clock.real_time(),
            competition_time,
        }
        .publish(self.store.as_ref())
        .await?;
        if self.clock.is_paused() {
            // Consumers re-derive their cached times while the clock is frozen.
            CompEvent::OffsetShift.publish(self.store.as_ref()).await
        } else {
            self.machine
                .evaluate(competition_time, &mut self.scheduler)
                .await
        }
    }
}
