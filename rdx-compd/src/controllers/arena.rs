//! Follows the published state and decides who may enter the arena.

use crate::bus::BusMessage;
use crate::command::Dispatcher;
use crate::components::phase::{ArenaState, GlobalState, MatchPhase};
use crate::engine::Controller;
use crate::error::{CompdError, Result};
use crate::events::{channels, CompEvent};
use crate::store::{keys, Store};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaCommand {
    /// Let teams into the arena during downtime.
    Tinker,
    /// Keep teams out during downtime.
    Briefing,
}

#[derive(Debug)]
pub struct ArenaController {
    store: Arc<dyn Store>,
    state: Option<GlobalState>,
    arena: Option<ArenaState>,
}

impl ArenaController {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            state: None,
            arena: None,
        }
    }

    pub fn arena(&self) -> Option<ArenaState> {
        self.arena
    }

    async fn set_tinker(&mut self, tinker: bool) -> Result<()> {
        self.store
            .set(keys::TINKER, if tinker { "true" } else { "false" })
            .await?;
        self.refresh().await
    }

    /// Recomputes the arena state, writing and announcing it only when it
    /// changed.
    async fn refresh(&mut self) -> Result<()> {
        let Some(state) = self.state else {
            return Ok(());
        };
        let tinker = self.store.get(keys::TINKER).await?.as_deref() == Some("true");
        let next = ArenaState::derive(state, tinker);
        if self.arena == Some(next) {
            return Ok(());
        }
        self.store.set(keys::ARENA_STATE, next.as_str()).await?;
        self.arena = Some(next);
        info!("Arena -> {}", next);
        CompEvent::ArenaChanged(next)
            .publish(self.store.as_ref())
            .await
    }

    /// Publishes the current match's scores, first giving every team a zero
    /// score if the match has none yet.
    async fn publish_scores(&self, initialise: bool) -> Result<()> {
        let Some(current) = self.store.get(keys::CURRENT_MATCH).await? else {
            debug!("No current match to score");
            return Ok(());
        };
        let scores_key = keys::schedule(&current, "scores");
        if initialise && self.store.llen(&scores_key).await? == 0 {
            let teams = self.store.llen(&keys::schedule(&current, "teams")).await?;
            for _ in 0..teams {
                self.store.rpush(&scores_key, "0").await?;
            }
        }
        let scores = self
            .store
            .lrange(&scores_key, 0, -1)
            .await?
            .into_iter()
            .map(|score| {
                score
                    .parse()
                    .map_err(|_| CompdError::corrupt(&scores_key, &score))
            })
            .collect::<Result<Vec<i64>>>()?;
        CompEvent::Scores(scores).publish(self.store.as_ref()).await
    }

    async fn read_state(&self) -> Result<Option<GlobalState>> {
        let Some(name) = self.store.get(keys::GLOBAL_STATE).await? else {
            return Ok(None);
        };
        let label = self.store.get(keys::MATCH_STATE).await?.unwrap_or_default();
        GlobalState::from_parts(&name, &label)
            .map(Some)
            .map_err(|_| CompdError::corrupt(keys::GLOBAL_STATE, format!("{name} {label}")))
    }
}

#[async_trait]
impl Controller for ArenaController {
    type Command = ArenaCommand;

    fn name(&self) -> &'static str {
        "arena"
    }

    fn channels(&self) -> Vec<String> {
        vec![channels::STATE.to_string()]
    }

    fn commands(&self) -> Dispatcher<ArenaCommand> {
        Dispatcher::new()
            .register("tinker", |_| Ok(ArenaCommand::Tinker))
            .register("briefing", |_| Ok(ArenaCommand::Briefing))
    }

    async fn configure(&mut self) -> Result<()> {
        self.arena = self
            .store
            .get(keys::ARENA_STATE)
            .await?
            .and_then(|arena| arena.parse().ok());
        self.state = self.read_state().await?;
        self.refresh().await
    }

    async fn status(&self) -> Result<String> {
        Ok(match self.arena {
            Some(arena) => format!("running, {arena}"),
            None => "running".to_string(),
        })
    }

    async fn handle_command(&mut self, command: ArenaCommand) -> Result<()> {
        self.set_tinker(command == ArenaCommand::Tinker).await
    }

    async fn handle_message(&mut self, message: BusMessage) -> Result<()> {
        let Some(CompEvent::StateChanged(state)) = CompEvent::parse(&message) else {
            return Ok(());
        };
        self.state = Some(state);
        self.refresh().await?;
        match state {
            GlobalState::Match(MatchPhase::Live) => self.publish_scores(true).await,
            GlobalState::Match(MatchPhase::Settle) => self.publish_scores(false).await,
            _ => Ok(()),
        }
    }
}
