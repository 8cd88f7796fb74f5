//! Derives the global state from competition time and the schedule.

use super::phase::GlobalState;
use super::schedule::MatchStatus;
use super::scheduler::MatchScheduler;
use crate::common::{CompTime, MatchId};
use crate::error::{CompdError, Result};
use crate::events::CompEvent;
use crate::store::{keys, Store};
use std::sync::Arc;
use tracing::{debug, info};

/// Publishes `(global, sub-phase)` transitions, each one exactly once.
#[derive(Debug)]
pub struct PhaseStateMachine {
    store: Arc<dyn Store>,
    current: Option<GlobalState>,
}

impl PhaseStateMachine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Picks up the last published state, if a competition is in progress.
    pub async fn load(&mut self) -> Result<()> {
        let Some(name) = self.store.get(keys::GLOBAL_STATE).await? else {
            self.current = None;
            return Ok(());
        };
        let label = self.store.get(keys::MATCH_STATE).await?.unwrap_or_default();
        let state = GlobalState::from_parts(&name, &label)
            .map_err(|_| CompdError::corrupt(keys::GLOBAL_STATE, format!("{name} {label}")))?;
        debug!("Restored global state {}", state);
        self.current = Some(state);
        Ok(())
    }

    pub fn current(&self) -> Option<GlobalState> {
        self.current
    }

    /// Whether a state has ever been published.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.current, Some(GlobalState::Fail(_)))
    }

    /// Moves to `state`. Returns `false`, writing and publishing nothing, when
    /// that is already the current state.
    pub async fn transition(&mut self, state: GlobalState) -> Result<bool> {
        if self.current == Some(state) {
            return Ok(false);
        }
        self.store.set(keys::GLOBAL_STATE, state.name()).await?;
        self.store.set(keys::MATCH_STATE, state.label()).await?;
        self.current = Some(state);
        info!("State -> {}", state);
        CompEvent::StateChanged(state).publish(self.store.as_ref()).await?;
        Ok(true)
    }

    /// Reconciles `match.current` and the published state with what the
    /// schedule says should be happening at `ct`.
    ///
    /// Writes go status, then pointer, then state, so an interrupted pass is
    /// completed by the next one.
    pub async fn evaluate(&mut self, ct: CompTime, scheduler: &mut MatchScheduler) -> Result<()> {
        if self.is_failed() {
            return Ok(());
        }
        let actual = scheduler
            .match_at(ct)
            .map(|(m, phase)| (m.id().clone(), phase));
        let expected = self.store.get(keys::CURRENT_MATCH).await?.map(MatchId::new);

        if actual.as_ref().map(|(id, _)| id) != expected.as_ref() {
            if let Some(previous) = &expected {
                scheduler.set_status(previous, MatchStatus::Completed).await?;
            }
            match &actual {
                Some((id, _)) => {
                    scheduler.set_status(id, MatchStatus::InProgress).await?;
                    self.store.set(keys::CURRENT_MATCH, id.as_str()).await?;
                    info!("Match {} is now current", id);
                }
                None => self.store.delete(keys::CURRENT_MATCH).await?,
            }
        }

        let state = match actual {
            Some((_, phase)) => GlobalState::Match(phase),
            None => GlobalState::Downtime,
        };
        self.transition(state).await?;
        Ok(())
    }
}
