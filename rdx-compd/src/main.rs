use anyhow::{Context, Result};
use compd::prelude::*;
use compd::time::format_real_time;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load configuration from the optional path argument and COMPD_* vars.
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Arc::new(CompdConfig::load(path.as_deref()).context("loading configuration")?);
    info!(
        "{} v{} starting at {}",
        compd::ENGINE_NAME,
        compd::VERSION,
        format_real_time(WallClock.now(), &config.timezone)
    );

    // 3. Connect to the shared store.
    let store: Arc<dyn Store> = Arc::new(
        RedisStore::connect(&config.store.redis_url)
            .await
            .with_context(|| format!("connecting to {}", config.store.redis_url))?,
    );

    // 4. Spawn one runtime per controller.
    let state = ControllerRuntime::new(
        StateController::new(store.clone(), Arc::new(WallClock), config.clone()),
        store.clone(),
        config.clone(),
    );
    let arena = ControllerRuntime::new(ArenaController::new(store.clone()), store, config);
    let shutdowns = [state.shutdown_handle(), arena.shutdown_handle()];

    let mut controllers = JoinSet::new();
    controllers.spawn(async move { state.run().await.map(|_| "state") });
    controllers.spawn(async move { arena.run().await.map(|_| "arena") });

    // 5. Run until Ctrl+C or until any controller stops on its own.
    let mut failure = None;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received. Stopping controllers...");
        }
        Some(joined) = controllers.join_next() => {
            match joined? {
                Ok(name) => info!("Controller '{}' stopped", name),
                Err(e) => {
                    error!("A controller failed: {}", e);
                    failure = Some(e);
                }
            }
        }
    }

    for shutdown in &shutdowns {
        shutdown.send(()).ok();
    }
    while let Some(joined) = controllers.join_next().await {
        if let Err(e) = joined? {
            error!("A controller failed during shutdown: {}", e);
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => {
            info!("{} has shut down.", compd::ENGINE_NAME);
            Ok(())
        }
    }
}
