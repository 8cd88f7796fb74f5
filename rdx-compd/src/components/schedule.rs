//! The match schedule: an ordered list of non-overlapping match windows.
//!
//! [`Schedule`] holds the pure mutation logic. It never talks to the store;
//! [`MatchScheduler`](super::scheduler::MatchScheduler) loads one, mutates it
//! and writes the result back.

use super::phase::{MatchPhase, MatchTiming};
use crate::common::{CompTime, MatchId};
use crate::error::Rejection;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchType {
    League,
    Showmatch,
    Knockout,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::League => "LEAGUE",
            MatchType::Showmatch => "SHOWMATCH",
            MatchType::Knockout => "KNOCKOUT",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LEAGUE" => Ok(MatchType::League),
            "SHOWMATCH" => Ok(MatchType::Showmatch),
            "KNOCKOUT" => Ok(MatchType::Knockout),
            _ => Err(format!("unknown match type {s:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Upcoming,
    InProgress,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "UPCOMING",
            MatchStatus::InProgress => "IN-PROGRESS",
            MatchStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPCOMING" => Ok(MatchStatus::Upcoming),
            "IN-PROGRESS" => Ok(MatchStatus::InProgress),
            "COMPLETED" => Ok(MatchStatus::Completed),
            _ => Err(format!("unknown match status {s:?}")),
        }
    }
}

/// A scheduled match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    id: MatchId,
    kind: MatchType,
    start: CompTime,
    teams: Vec<String>,
    stage: Option<u32>,
    status: MatchStatus,
    scores: Vec<i64>,
}

impl Match {
    pub fn new(id: MatchId, kind: MatchType, start: CompTime) -> Self {
        Self {
            id,
            kind,
            start,
            teams: Vec::new(),
            stage: None,
            status: MatchStatus::Upcoming,
            scores: Vec::new(),
        }
    }

    pub fn with_teams(mut self, teams: Vec<String>) -> Self {
        self.teams = teams;
        self
    }

    pub fn with_stage(mut self, stage: Option<u32>) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_status(mut self, status: MatchStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_scores(mut self, scores: Vec<i64>) -> Self {
        self.scores = scores;
        self
    }

    pub fn id(&self) -> &MatchId {
        &self.id
    }

    pub fn kind(&self) -> MatchType {
        self.kind
    }

    pub fn start(&self) -> CompTime {
        self.start
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn stage(&self) -> Option<u32> {
        self.stage
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn scores(&self) -> &[i64] {
        &self.scores
    }

    /// The half-open window `[opens, closes)` this match occupies.
    pub fn window(&self, timing: &MatchTiming) -> (CompTime, CompTime) {
        (
            self.start - timing.pre_start(),
            self.start + timing.post_start(),
        )
    }
}

/// A request to put a new match on the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    pub id: MatchId,
    pub kind: MatchType,
    /// Requested start, in competition time.
    pub start: CompTime,
    pub stage: Option<u32>,
    pub teams: Vec<String>,
}

impl MatchRequest {
    pub fn validate(&self) -> Result<(), Rejection> {
        if self.kind == MatchType::Knockout && self.stage.is_none() {
            return Err(Rejection::MissingStage);
        }
        if !self.teams.is_empty() && !(3..=4).contains(&self.teams.len()) {
            return Err(Rejection::InvalidTeams(self.teams.len()));
        }
        Ok(())
    }
}

/// The ordered schedule. Matches are kept sorted by start and their windows
/// never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    timing: MatchTiming,
    matches: Vec<Match>,
}

impl Schedule {
    pub fn new(timing: MatchTiming) -> Self {
        Self {
            timing,
            matches: Vec::new(),
        }
    }

    pub fn from_matches(timing: MatchTiming, mut matches: Vec<Match>) -> Self {
        matches.sort_by_key(|m| m.start);
        Self { timing, matches }
    }

    pub fn timing(&self) -> &MatchTiming {
        &self.timing
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, id: &MatchId) -> Option<&Match> {
        self.matches.iter().find(|m| &m.id == id)
    }

    /// The match whose window contains `ct`, with the phase `ct` falls in.
    pub fn match_at(&self, ct: CompTime) -> Option<(&Match, MatchPhase)> {
        self.matches
            .iter()
            .find_map(|m| self.timing.phase_at(ct - m.start).map(|phase| (m, phase)))
    }

    /// Whether two starts are too close for their windows to be disjoint.
    fn collide(&self, a: CompTime, b: CompTime) -> bool {
        (a - b).abs() < self.timing.full_match()
    }

    /// `start` moved by `by`, provided the whole resulting window still fits
    /// in competition time.
    fn shifted_start(&self, start: CompTime, by: i64) -> Result<CompTime, Rejection> {
        start
            .checked_add(by)
            .filter(|moved| {
                moved.checked_sub(self.timing.pre_start()).is_some()
                    && moved.checked_add(self.timing.full_match()).is_some()
            })
            .ok_or(Rejection::OutOfRange { start, by })
    }

    /// Checks that every match selected by `affected` can move by `by`.
    fn check_shift(&self, affected: impl Fn(&Match) -> bool, by: i64) -> Result<(), Rejection> {
        for m in self.matches.iter().filter(|m| affected(m)) {
            self.shifted_start(m.start, by)?;
        }
        Ok(())
    }

    /// Shifts every match selected by `affected` by `by` seconds. Moves that
    /// could leave competition time go through [`Schedule::check_shift`]
    /// first.
    ///
    /// Returns the shifted ids in the order their new starts should be
    /// written out: latest first when moving later and earliest first when
    /// moving earlier, so no prefix of the writes ever overlaps.
    fn shift_where(&mut self, affected: impl Fn(&Match) -> bool, by: i64) -> Vec<MatchId> {
        let mut shifted = Vec::new();
        for m in self.matches.iter_mut().filter(|m| affected(m)) {
            m.start += by;
            shifted.push(m.id.clone());
        }
        if by > 0 {
            shifted.reverse();
        }
        shifted
    }

    /// Inserts a match, returning its final start and the ids of the matches
    /// cascaded out of its way.
    ///
    /// If the requested window overlaps a match that starts earlier, the new
    /// match is pushed to open exactly as that one closes. Every match from
    /// the chosen start onwards is then delayed by a full match interval.
    pub fn insert(
        &mut self,
        now: CompTime,
        request: MatchRequest,
    ) -> Result<(CompTime, Vec<MatchId>), Rejection> {
        if self.get(&request.id).is_some() {
            return Err(Rejection::DuplicateName(request.id));
        }
        request.validate()?;
        let mut start = self.shifted_start(request.start, 0)?;
        // The slot must open strictly after now, so a match whose window is
        // already running is never cascaded.
        if start <= now + self.timing.pre_start() {
            return Err(Rejection::InThePast { start });
        }

        if let Some(previous) = self
            .matches
            .iter()
            .filter(|m| m.start < start && self.collide(m.start, start))
            .last()
        {
            start = self.shifted_start(previous.start, self.timing.full_match())?;
        }

        let full = self.timing.full_match();
        self.check_shift(|m| m.start >= start, full)?;
        let shifted = self.shift_where(|m| m.start >= start, full);
        let position = self.matches.partition_point(|m| m.start < start);
        self.matches.insert(
            position,
            Match::new(request.id, request.kind, start)
                .with_teams(request.teams.iter().map(|t| t.to_ascii_uppercase()).collect())
                .with_stage(request.stage),
        );
        Ok((start, shifted))
    }

    /// Removes a match that has not yet opened and pulls every later match
    /// back by a full match interval to close the gap.
    pub fn cancel(&mut self, now: CompTime, id: &MatchId) -> Result<(Match, Vec<MatchId>), Rejection> {
        let index = self
            .matches
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| Rejection::NoSuchMatch(id.clone()))?;
        let (opens, _) = self.matches[index].window(&self.timing);
        if now >= opens {
            return Err(Rejection::AlreadyStarted(id.clone()));
        }
        let removed = self.matches.remove(index);
        let shifted = self.shift_where(|m| m.start > removed.start, -self.timing.full_match());
        Ok((removed, shifted))
    }

    /// Shifts every match whose window opens at or after `from` by `by`
    /// seconds (either direction).
    ///
    /// Nothing moves if any shifted window would leave competition time. A
    /// negative shift may not pull a window into an earlier, unshifted one
    /// or open a window at or before `now`.
    pub fn delay(&mut self, now: CompTime, from: CompTime, by: i64) -> Result<Vec<MatchId>, Rejection> {
        if from <= now {
            return Err(Rejection::NotInFuture { from, now });
        }
        let pre_start = self.timing.pre_start();
        let affected = |m: &Match| m.start - pre_start >= from;
        self.check_shift(affected, by)?;
        if by < 0 {
            if let Some(first) = self.matches.iter().find(|m| affected(m)) {
                let new_start = self.shifted_start(first.start, by)?;
                if new_start - pre_start <= now {
                    return Err(Rejection::InThePast { start: new_start });
                }
                if let Some(blocker) = self
                    .matches
                    .iter()
                    .filter(|m| !affected(m))
                    .find(|m| self.collide(m.start, new_start) || m.start > new_start)
                {
                    return Err(Rejection::WouldOverlap {
                        by,
                        with: blocker.id.clone(),
                    });
                }
            }
        }
        Ok(self.shift_where(affected, by))
    }

    pub fn set_status(&mut self, id: &MatchId, status: MatchStatus) -> bool {
        match self.matches.iter_mut().find(|m| &m.id == id) {
            Some(m) => {
                m.status = status;
                true
            }
            None => false,
        }
    }
}
