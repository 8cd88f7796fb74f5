//! Store-backed owner of the match schedule.
//!
//! The orchestrator is the only writer of `match.schedule.*`, so the scheduler
//! keeps the [`Schedule`] in memory, applies each mutation there first and then
//! writes the affected keys out. A mutation that is rejected never reaches
//! the store.

use super::phase::{MatchPhase, MatchTiming};
use super::schedule::{Match, MatchRequest, MatchStatus, MatchType, Schedule};
use crate::common::{CompTime, MatchId};
use crate::error::{CompdError, Result};
use crate::events::CompEvent;
use crate::store::{keys, Store};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct MatchScheduler {
    store: Arc<dyn Store>,
    schedule: Schedule,
}

impl MatchScheduler {
    pub fn new(store: Arc<dyn Store>, timing: MatchTiming) -> Self {
        Self {
            store,
            schedule: Schedule::new(timing),
        }
    }

    /// Rebuilds the schedule from every `match.schedule.<id>.start` key.
    pub async fn load(&mut self) -> Result<()> {
        let mut matches = Vec::new();
        for key in self.store.keys(keys::SCHEDULE_STARTS).await? {
            let Some(id) = keys::schedule_id(&key) else {
                continue;
            };
            if let Some(m) = self.read_match(id).await? {
                matches.push(m);
            }
        }
        info!("Loaded {} scheduled matches", matches.len());
        self.schedule = Schedule::from_matches(*self.schedule.timing(), matches);
        Ok(())
    }

    async fn read_match(&self, id: &str) -> Result<Option<Match>> {
        let Some(start) = self.field(id, "start").await? else {
            return Ok(None);
        };
        let start = start.parse().map_err(|_| CompdError::corrupt(keys::schedule(id, "start"), &start))?;
        let kind = match self.field(id, "type").await? {
            Some(kind) => kind
                .parse::<MatchType>()
                .map_err(|_| CompdError::corrupt(keys::schedule(id, "type"), &kind))?,
            None => MatchType::League,
        };
        let status = match self.field(id, "state").await? {
            Some(status) => status
                .parse::<MatchStatus>()
                .map_err(|_| CompdError::corrupt(keys::schedule(id, "state"), &status))?,
            None => MatchStatus::Upcoming,
        };
        let stage = match self.field(id, "stage").await? {
            Some(stage) => Some(
                stage
                    .parse()
                    .map_err(|_| CompdError::corrupt(keys::schedule(id, "stage"), &stage))?,
            ),
            None => None,
        };
        let teams = self.store.lrange(&keys::schedule(id, "teams"), 0, -1).await?;
        let scores_key = keys::schedule(id, "scores");
        let scores = self
            .store
            .lrange(&scores_key, 0, -1)
            .await?
            .into_iter()
            .map(|score| score.parse().map_err(|_| CompdError::corrupt(&scores_key, &score)))
            .collect::<Result<Vec<i64>>>()?;

        Ok(Some(
            Match::new(MatchId::new(id), kind, start)
                .with_teams(teams)
                .with_stage(stage)
                .with_status(status)
                .with_scores(scores),
        ))
    }

    async fn field(&self, id: &str, field: &str) -> Result<Option<String>> {
        self.store.get(&keys::schedule(id, field)).await
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn timing(&self) -> &MatchTiming {
        self.schedule.timing()
    }

    pub fn match_at(&self, ct: CompTime) -> Option<(&Match, MatchPhase)> {
        self.schedule.match_at(ct)
    }

    /// Inserts a match and returns the start it was actually given.
    pub async fn schedule_match(&mut self, now: CompTime, request: MatchRequest) -> Result<CompTime> {
        let id = request.id.clone();
        let (start, shifted) = self.schedule.insert(now, request)?;
        self.write_starts(&shifted).await?;

        let Some(m) = self.schedule.get(&id).cloned() else {
            return Ok(start);
        };
        self.store.set(&keys::schedule(id.as_str(), "type"), m.kind().as_str()).await?;
        self.store
            .set(&keys::schedule(id.as_str(), "state"), m.status().as_str())
            .await?;
        if let Some(stage) = m.stage() {
            self.store
                .set(&keys::schedule(id.as_str(), "stage"), &stage.to_string())
                .await?;
        }
        let teams_key = keys::schedule(id.as_str(), "teams");
        self.store.delete(&teams_key).await?;
        for team in m.teams() {
            self.store.rpush(&teams_key, team).await?;
        }
        // The start key marks the record as present, so it goes last.
        self.store
            .set(&keys::schedule(id.as_str(), "start"), &start.to_string())
            .await?;

        info!(
            "Scheduled {} match {} at {} ({} later matches moved)",
            m.kind(),
            id,
            start,
            shifted.len()
        );
        CompEvent::Reschedule.publish(self.store.as_ref()).await?;
        Ok(start)
    }

    pub async fn cancel_match(&mut self, now: CompTime, id: &MatchId) -> Result<()> {
        let (removed, shifted) = self.schedule.cancel(now, id)?;
        // Removing the start key first hides the record before its fields go.
        for field in ["start", "type", "state", "stage", "teams", "scores"] {
            self.store.delete(&keys::schedule(id.as_str(), field)).await?;
        }
        self.write_starts(&shifted).await?;
        info!(
            "Cancelled match {} (was at {}), {} later matches pulled forward",
            id,
            removed.start(),
            shifted.len()
        );
        CompEvent::Reschedule.publish(self.store.as_ref()).await
    }

    /// Shifts every match whose window opens at or after `from` by `by`.
    pub async fn delay_matches(&mut self, now: CompTime, from: CompTime, by: i64) -> Result<Vec<MatchId>> {
        let shifted = self.schedule.delay(now, from, by)?;
        self.write_starts(&shifted).await?;
        info!("Delayed {} matches from {} by {}s", shifted.len(), from, by);
        CompEvent::Reschedule.publish(self.store.as_ref()).await?;
        Ok(shifted)
    }

    pub async fn set_status(&mut self, id: &MatchId, status: MatchStatus) -> Result<()> {
        if !self.schedule.set_status(id, status) {
            debug!("Status {} for unscheduled match {}", status, id);
        }
        self.store
            .set(&keys::schedule(id.as_str(), "state"), status.as_str())
            .await
    }

    async fn write_starts(&self, ids: &[MatchId]) -> Result<()> {
        for id in ids {
            if let Some(m) = self.schedule.get(id) {
                self.store
                    .set(&keys::schedule(id.as_str(), "start"), &m.start().to_string())
                    .await?;
            }
        }
        Ok(())
    }
}
