//! Drives the state controller by hand: commands in, ticks on demand, wall
//! clock moved manually.

use compd::components::schedule::MatchType;
use compd::controllers::state::StateCommand;
use compd::prelude::*;
use compd::store::{keys, MessageStream};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;

struct Harness {
    store: MemoryStore,
    time: ManualClock,
    controller: StateController,
    feed: MessageStream,
}

impl Harness {
    async fn new(start: RealTime) -> Self {
        Self::with_config(start, CompdConfig::default()).await
    }

    async fn with_config(start: RealTime, config: CompdConfig) -> Self {
        let store = MemoryStore::new();
        let time = ManualClock::new(start);
        let feed = store
            .listen(&[], &["comp.*".to_string(), "match.*".to_string()])
            .await
            .unwrap();
        let mut controller = StateController::new(
            Arc::new(store.clone()),
            Arc::new(time.clone()),
            Arc::new(config),
        );
        controller.configure().await.unwrap();
        Self {
            store,
            time,
            controller,
            feed,
        }
    }

    async fn command(&mut self, command: StateCommand) -> Result<()> {
        self.controller.handle_command(command).await
    }

    async fn tick_at(&mut self, real: RealTime) {
        self.time.set(real);
        self.controller.tick().await.unwrap();
    }

    async fn schedule(&mut self, name: &str, start: RealTime) -> Result<()> {
        self.command(StateCommand::ScheduleMatch {
            name: MatchId::new(name),
            kind: MatchType::League,
            start,
            stage: None,
            teams: vec!["abc".into(), "def".into(), "ghi".into()],
        })
        .await
    }

    /// Everything published since the last drain, as `channel payload`.
    fn drain(&mut self) -> Vec<String> {
        let mut published = Vec::new();
        while let Some(Some(message)) = self.feed.next().now_or_never() {
            published.push(format!("{} {}", message.channel, message.payload));
        }
        published
    }

    fn states(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|line| line.strip_prefix("comp.state ").map(str::to_string))
            .collect()
    }
}

#[tokio::test]
async fn single_match_walks_through_its_phases() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    assert!(h.controller.is_active());
    assert_eq!(h.store.lrange(keys::SYNC, 0, -1).await.unwrap(), vec!["1000 0"]);
    assert_eq!(h.store.get(keys::TINKER).await.unwrap().as_deref(), Some("true"));

    h.schedule("A1", 1500).await.unwrap();
    assert_eq!(
        h.store.get("match.schedule.A1.start").await.unwrap().as_deref(),
        Some("500")
    );
    let kickoff = h.drain();
    assert!(kickoff.contains(&"comp.kickoff trigger".to_string()));
    assert!(kickoff.contains(&"match.reschedule trigger".to_string()));

    h.tick_at(1400).await;
    h.tick_at(1450).await;
    h.tick_at(1500).await;
    assert_eq!(
        h.controller.state(),
        Some(GlobalState::Match(MatchPhase::Live))
    );
    assert_eq!(
        h.store.get(keys::CURRENT_MATCH).await.unwrap().as_deref(),
        Some("A1")
    );
    assert_eq!(h.states(), vec!["MATCH ENTER", "MATCH BOOT", "MATCH LIVE"]);

    h.tick_at(1710).await;
    assert_eq!(h.controller.state(), Some(GlobalState::Downtime));
    assert_eq!(
        h.store.get("match.schedule.A1.state").await.unwrap().as_deref(),
        Some("COMPLETED")
    );
}

#[tokio::test]
async fn heartbeat_carries_both_clocks() {
    let mut h = Harness::new(1000).await;
    h.tick_at(1005).await;
    // Nothing is published before kickoff.
    assert!(h.drain().is_empty());

    h.command(StateCommand::StartCompetition).await.unwrap();
    h.drain();
    h.tick_at(1042).await;
    let published = h.drain();
    assert_eq!(published[0], "comp.heartbeat 1042 42");
}

#[tokio::test]
async fn pausing_moves_matches_in_real_time_only() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();

    h.tick_at(1100).await;
    h.command(StateCommand::Pause).await.unwrap();
    h.drain();

    h.tick_at(1600).await;
    assert_eq!(h.controller.clock().competition_time(), 100);
    assert_eq!(
        h.drain(),
        vec!["comp.heartbeat 1600 100", "comp.offset_shift trigger"]
    );
    assert_eq!(h.controller.state(), Some(GlobalState::Downtime));

    h.command(StateCommand::Unpause).await.unwrap();
    assert_eq!(
        h.store.lrange(keys::SYNC, 0, -1).await.unwrap(),
        vec!["1000 0", "1600 100"]
    );
    // A1 still starts at competition time 500, now real time 2000.
    assert_eq!(h.controller.clock().competition_to_real(500), Some(2000));
    h.tick_at(2000).await;
    assert_eq!(
        h.controller.state(),
        Some(GlobalState::Match(MatchPhase::Live))
    );
}

#[tokio::test]
async fn panic_freezes_and_panic_over_restores() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();
    h.tick_at(1500).await;
    h.drain();

    h.command(StateCommand::Panic).await.unwrap();
    assert_eq!(
        h.controller.state(),
        Some(GlobalState::Fail(Some(MatchPhase::Live)))
    );
    assert!(h.controller.clock().is_paused());
    h.tick_at(1600).await;
    assert_eq!(
        h.controller.state(),
        Some(GlobalState::Fail(Some(MatchPhase::Live)))
    );

    h.command(StateCommand::PanicOver).await.unwrap();
    assert!(!h.controller.clock().is_paused());
    assert_eq!(h.states(), vec!["FAIL LIVE", "MATCH LIVE"]);

    h.tick_at(1610).await;
    assert_eq!(h.controller.clock().competition_time(), 510);
    assert!(h.states().is_empty());
}

#[tokio::test]
async fn panic_over_can_leave_the_clock_paused() {
    let config = CompdConfig {
        panic_over_resumes: false,
        ..CompdConfig::default()
    };
    let mut h = Harness::with_config(1000, config).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.command(StateCommand::Panic).await.unwrap();
    h.command(StateCommand::PanicOver).await.unwrap();
    assert_eq!(h.controller.state(), Some(GlobalState::Downtime));
    assert!(h.controller.clock().is_paused());
}

#[tokio::test]
async fn overlapping_request_is_pushed_back() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();
    h.schedule("A2", 1520).await.unwrap();
    assert_eq!(
        h.store.get("match.schedule.A2.start").await.unwrap().as_deref(),
        Some("860")
    );
    assert_eq!(
        h.store.lrange("match.schedule.A2.teams", 0, -1).await.unwrap(),
        vec!["ABC", "DEF", "GHI"]
    );
}

#[tokio::test]
async fn rejected_and_unanswerable_commands_surface_errors() {
    let mut h = Harness::new(1000).await;
    assert!(matches!(
        h.schedule("A1", 1500).await,
        Err(CompdError::UnknownTime(1500))
    ));

    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();
    h.tick_at(1360).await;
    let err = h
        .command(StateCommand::CancelMatch {
            name: MatchId::new("A1"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CompdError::Rejected(Rejection::AlreadyStarted(_))));
    assert!(!err.is_fatal());
    assert_eq!(
        h.store.get("match.schedule.A1.start").await.unwrap().as_deref(),
        Some("500")
    );
}

#[tokio::test]
async fn extreme_times_are_refused_and_the_controller_carries_on() {
    let mut h = Harness::new(0).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 500).await.unwrap();

    assert!(matches!(
        h.schedule("A2", i64::MAX).await,
        Err(CompdError::Rejected(Rejection::OutOfRange { .. }))
    ));
    assert!(matches!(
        h.schedule("A3", i64::MIN).await,
        Err(CompdError::UnknownTime(i64::MIN))
    ));
    let err = h
        .command(StateCommand::DelayMatches {
            start: 100,
            by: i64::MAX,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CompdError::Rejected(Rejection::OutOfRange { .. })));
    assert!(!err.is_fatal());

    assert_eq!(h.controller.scheduler().schedule().len(), 1);
    assert_eq!(
        h.store.get("match.schedule.A1.start").await.unwrap().as_deref(),
        Some("500")
    );
    h.tick_at(400).await;
    assert_eq!(
        h.controller.state(),
        Some(GlobalState::Match(MatchPhase::Enter))
    );
}

#[tokio::test]
async fn delay_moves_later_matches() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();
    h.schedule("A2", 1860).await.unwrap();
    h.command(StateCommand::DelayMatches {
        start: 1700,
        by: 90,
    })
    .await
    .unwrap();
    assert_eq!(
        h.store.get("match.schedule.A1.start").await.unwrap().as_deref(),
        Some("500")
    );
    assert_eq!(
        h.store.get("match.schedule.A2.start").await.unwrap().as_deref(),
        Some("950")
    );
}

#[tokio::test]
async fn a_restarted_orchestrator_resumes() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::StartCompetition).await.unwrap();
    h.schedule("A1", 1500).await.unwrap();
    h.tick_at(1200).await;
    h.command(StateCommand::Pause).await.unwrap();

    h.time.set(1300);
    let mut restarted = StateController::new(
        Arc::new(h.store.clone()),
        Arc::new(h.time.clone()),
        Arc::new(CompdConfig::default()),
    );
    restarted.configure().await.unwrap();
    assert!(restarted.is_active());
    assert!(restarted.clock().is_paused());
    assert_eq!(restarted.clock().competition_time(), 200);
    assert_eq!(restarted.scheduler().schedule().len(), 1);
    assert_eq!(restarted.status().await.unwrap(), "paused");
}

#[tokio::test]
async fn teams_are_managed_by_the_orchestrator() {
    let mut h = Harness::new(1000).await;
    h.command(StateCommand::AddTeam {
        tla: "xyz".into(),
        name: "Xylophone".into(),
        college: Some("Xavier's".into()),
        info: String::new(),
    })
    .await
    .unwrap();
    assert_eq!(
        h.store.get("teams.XYZ.college").await.unwrap().as_deref(),
        Some("Xavier's")
    );
    h.command(StateCommand::RemoveTeam { tla: "XYZ".into() })
        .await
        .unwrap();
    assert_eq!(h.store.get("teams.XYZ.name").await.unwrap(), None);
}
