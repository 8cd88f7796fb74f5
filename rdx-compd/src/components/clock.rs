//! The competition clock.
//!
//! Competition time is derived from wall-clock time through an append-only
//! log of sync points. Each point records that, at real time `real`, the
//! competition clock read `competition`. Starting the competition writes the
//! first point; every resume after a pause writes another, so translations of
//! times recorded before a pause stay correct however many pauses follow.

use crate::common::{CompTime, RealTime};
use crate::error::{CompdError, Result};
use crate::events::CompEvent;
use crate::store::{keys, Store};
use crate::time::TimeSource;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One `(real, competition)` correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPoint {
    pub real: RealTime,
    pub competition: CompTime,
}

impl SyncPoint {
    pub fn new(real: RealTime, competition: CompTime) -> Self {
        Self { real, competition }
    }

    /// Parses the stored `"<real> <competition>"` form.
    pub fn parse(entry: &str) -> Option<Self> {
        let (real, competition) = entry.split_once(' ')?;
        Some(Self::new(real.parse().ok()?, competition.parse().ok()?))
    }
}

impl fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.real, self.competition)
    }
}

/// The ordered log of sync points, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLog {
    points: Vec<SyncPoint>,
}

impl SyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: SyncPoint) {
        self.points.push(point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[SyncPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Translates a real time using the newest sync point at or before it.
    /// `None` if the time predates the whole log or lands outside `i64`.
    pub fn real_to_competition(&self, real: RealTime) -> Option<CompTime> {
        let point = self.points.iter().rev().find(|point| point.real <= real)?;
        point.competition.checked_add(real.checked_sub(point.real)?)
    }

    /// Translates a competition time using the newest sync point at or before
    /// it. `None` if the time predates the whole log, which is how matches
    /// placed before kickoff come out as "unknown" rather than zero.
    pub fn competition_to_real(&self, competition: CompTime) -> Option<RealTime> {
        let point = self
            .points
            .iter()
            .rev()
            .find(|point| point.competition <= competition)?;
        point.real.checked_add(competition.checked_sub(point.competition)?)
    }
}

/// The authoritative competition clock, owned by the state controller.
#[derive(Debug)]
pub struct CompetitionClock {
    store: Arc<dyn Store>,
    time: Arc<dyn TimeSource>,
    real_time: RealTime,
    competition_time: CompTime,
    paused: Option<CompTime>,
    sync_log: SyncLog,
}

impl CompetitionClock {
    pub fn new(store: Arc<dyn Store>, time: Arc<dyn TimeSource>) -> Self {
        let real_time = time.now();
        Self {
            store,
            time,
            real_time,
            competition_time: 0,
            paused: None,
            sync_log: SyncLog::new(),
        }
    }

    /// Restores the sync log and pause state from the store.
    pub async fn load(&mut self) -> Result<()> {
        let mut sync_log = SyncLog::new();
        for entry in self.store.lrange(keys::SYNC, 0, -1).await? {
            let point =
                SyncPoint::parse(&entry).ok_or_else(|| CompdError::corrupt(keys::SYNC, &entry))?;
            sync_log.push(point);
        }
        self.paused = match self.store.get(keys::PAUSE).await? {
            Some(value) => Some(
                value
                    .parse()
                    .map_err(|_| CompdError::corrupt(keys::PAUSE, &value))?,
            ),
            None => None,
        };
        debug!(
            "Loaded {} sync points, paused at {:?}",
            sync_log.points().len(),
            self.paused
        );
        self.sync_log = sync_log;
        self.tick();
        Ok(())
    }

    /// Resets the log so that competition time zero is now.
    pub async fn start(&mut self) -> Result<()> {
        self.real_time = self.time.now();
        self.store.delete(keys::SYNC).await?;
        self.store.delete(keys::PAUSE).await?;
        self.sync_log.clear();
        self.paused = None;
        self.record_sync(0).await?;
        self.competition_time = 0;
        info!("Competition clock started at real time {}", self.real_time);
        Ok(())
    }

    /// Refreshes real time and recomputes competition time from it.
    pub fn tick(&mut self) -> CompTime {
        self.real_time = self.time.now();
        self.competition_time = match self.paused {
            Some(frozen) => frozen,
            None => self
                .sync_log
                .real_to_competition(self.real_time)
                .unwrap_or(self.competition_time),
        };
        self.competition_time
    }

    /// Freezes competition time. Returns `false` if already paused.
    pub async fn pause(&mut self) -> Result<bool> {
        if self.paused.is_some() {
            return Ok(false);
        }
        let frozen = self.tick();
        self.store.set(keys::PAUSE, &frozen.to_string()).await?;
        self.paused = Some(frozen);
        info!("Competition clock paused at {}", frozen);
        Ok(true)
    }

    /// Restarts competition time from where it was frozen. Returns `false`
    /// if the clock was not paused.
    pub async fn resume(&mut self) -> Result<bool> {
        let Some(frozen) = self.paused else {
            return Ok(false);
        };
        self.real_time = self.time.now();
        self.record_sync(frozen).await?;
        self.store.delete(keys::PAUSE).await?;
        self.paused = None;
        self.competition_time = frozen;
        info!(
            "Competition clock resumed at {} (real time {})",
            frozen, self.real_time
        );
        Ok(true)
    }

    async fn record_sync(&mut self, competition: CompTime) -> Result<()> {
        let point = SyncPoint::new(self.real_time, competition);
        self.store.rpush(keys::SYNC, &point.to_string()).await?;
        self.sync_log.push(point);
        CompEvent::OffsetShift.publish(self.store.as_ref()).await
    }

    pub fn real_time(&self) -> RealTime {
        self.real_time
    }

    pub fn competition_time(&self) -> CompTime {
        self.competition_time
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    pub fn is_started(&self) -> bool {
        !self.sync_log.is_empty()
    }

    pub fn sync_log(&self) -> &SyncLog {
        &self.sync_log
    }

    pub fn real_to_competition(&self, real: RealTime) -> Option<CompTime> {
        self.sync_log.real_to_competition(real)
    }

    pub fn competition_to_real(&self, competition: CompTime) -> Option<RealTime> {
        self.sync_log.competition_to_real(competition)
    }
}
