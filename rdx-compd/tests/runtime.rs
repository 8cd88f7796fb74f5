//! Runs controllers inside their runtime loop against the in-memory store.

use compd::prelude::*;
use compd::store::keys;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> Arc<CompdConfig> {
    Arc::new(CompdConfig {
        resolution: ClockResolution::Custom {
            ticks_per_second: 50,
        },
        liveness_interval_secs: 1,
        ..CompdConfig::default()
    })
}

async fn next_payload(feed: &mut compd::store::MessageStream) -> String {
    timeout(WAIT, feed.next())
        .await
        .expect("timed out waiting for a message")
        .expect("feed closed")
        .payload
}

#[tokio::test]
async fn arena_follows_commands_on_the_shared_channel() {
    let store = MemoryStore::new();
    store.set(keys::GLOBAL_STATE, "DOWNTIME").await.unwrap();
    store.set(keys::MATCH_STATE, "IDLE").await.unwrap();
    let mut liveness = store
        .listen(&["controller.arena.heartbeat".to_string()], &[])
        .await
        .unwrap();
    let mut arena_feed = store.listen(&["comp.arena".to_string()], &[]).await.unwrap();

    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let runtime = ControllerRuntime::new(ArenaController::new(shared.clone()), shared, fast_config());
    let shutdown = runtime.shutdown_handle();
    let handle = tokio::spawn(runtime.run());

    // The first liveness report goes out once the controller is listening.
    assert_eq!(next_payload(&mut liveness).await, "running, SOFT-CLOSED");
    assert_eq!(next_payload(&mut arena_feed).await, "SOFT-CLOSED");

    // Commands for other controllers and garbage are ignored.
    store
        .publish("comp.command", &CommandEnvelope::new("pause").encode())
        .await
        .unwrap();
    store.publish("comp.command", "not json").await.unwrap();
    store
        .publish("comp.command", &CommandEnvelope::new("tinker").encode())
        .await
        .unwrap();
    assert_eq!(next_payload(&mut arena_feed).await, "OPEN");

    shutdown.send(()).unwrap();
    let arena = timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    assert_eq!(arena.arena(), Some(ArenaState::Open));
}

#[tokio::test]
async fn state_controller_heartbeats_after_kickoff() {
    let store = MemoryStore::new();
    let mut liveness = store
        .listen(&["controller.state.heartbeat".to_string()], &[])
        .await
        .unwrap();
    let mut heartbeat = store.listen(&["comp.heartbeat".to_string()], &[]).await.unwrap();

    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let time = ManualClock::new(1000);
    let controller = StateController::new(shared.clone(), Arc::new(time.clone()), fast_config());
    let runtime = ControllerRuntime::new(controller, shared, fast_config());
    let shutdown = runtime.shutdown_handle();
    let handle = tokio::spawn(runtime.run());

    assert_eq!(next_payload(&mut liveness).await, "running");
    store
        .publish(
            "comp.command",
            r#"{"command": "start_competition"}"#,
        )
        .await
        .unwrap();
    assert_eq!(next_payload(&mut heartbeat).await, "1000 0");

    time.advance(30);
    let mut payload = next_payload(&mut heartbeat).await;
    while payload != "1030 30" {
        payload = next_payload(&mut heartbeat).await;
    }

    shutdown.send(()).unwrap();
    let controller = timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
    assert!(controller.is_active());
    assert_eq!(controller.state(), Some(GlobalState::Downtime));
}

#[tokio::test]
async fn heartbeats_keep_coming_while_commands_pour_in() {
    let store = MemoryStore::new();
    let mut liveness = store
        .listen(&["controller.state.heartbeat".to_string()], &[])
        .await
        .unwrap();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let time = ManualClock::new(1000);
    let controller = StateController::new(shared.clone(), Arc::new(time.clone()), fast_config());
    let runtime = ControllerRuntime::new(controller, shared, fast_config());
    let shutdown = runtime.shutdown_handle();
    let handle = tokio::spawn(runtime.run());
    next_payload(&mut liveness).await;

    let mut heartbeat = store.listen(&["comp.heartbeat".to_string()], &[]).await.unwrap();
    store
        .publish("comp.command", &CommandEnvelope::new("start-competition").encode())
        .await
        .unwrap();
    assert_eq!(next_payload(&mut heartbeat).await, "1000 0");

    let noise = CommandEnvelope::new("lights-on").encode();
    let flood = tokio::spawn({
        let store = store.clone();
        async move {
            loop {
                if store.publish("comp.command", &noise).await.is_err() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }
    });

    time.advance(30);
    let mut payload = next_payload(&mut heartbeat).await;
    while payload != "1030 30" {
        payload = next_payload(&mut heartbeat).await;
    }

    flood.abort();
    shutdown.send(()).unwrap();
    timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn losing_the_store_stops_the_controller() {
    let store = MemoryStore::new();
    let mut liveness = store
        .listen(&["controller.arena.heartbeat".to_string()], &[])
        .await
        .unwrap();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let runtime = ControllerRuntime::new(ArenaController::new(shared.clone()), shared, fast_config());
    let handle = tokio::spawn(runtime.run());
    next_payload(&mut liveness).await;

    store.disconnect().await;
    let result = timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(CompdError::Disconnected)));
}
