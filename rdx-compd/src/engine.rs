//! The runtime that drives one controller.
//!
//! A controller is a plain state object implementing [`Controller`]. The
//! [`ControllerRuntime`] owns it and feeds it, one at a time, from four
//! sources: the shutdown signal, inbound bus messages, the heartbeat tick and
//! the liveness tick. Nothing else ever touches controller state, so no
//! handler needs a lock.

use crate::bus::{Bus, BusMessage};
use crate::command::Dispatcher;
use crate::config::CompdConfig;
use crate::error::{CompdError, Result};
use crate::events::{channels, CompEvent};
use crate::store::Store;
use crate::time::SystemClock;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

/// One independently running participant on the bus.
///
/// Every controller receives every message on `comp.command`; it acts only on
/// the commands its [`Controller::commands`] registry names.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// The typed command values this controller's registry produces.
    type Command: Send;

    /// Used in logs and in the `controller.<name>.heartbeat` channel.
    fn name(&self) -> &'static str;

    /// Extra channels to subscribe to, besides `comp.command`.
    fn channels(&self) -> Vec<String> {
        Vec::new()
    }

    fn patterns(&self) -> Vec<String> {
        Vec::new()
    }

    fn commands(&self) -> Dispatcher<Self::Command>;

    /// Loads persisted state. Runs once, before the first message.
    async fn configure(&mut self) -> Result<()> {
        Ok(())
    }

    /// Free-text status for the liveness report.
    async fn status(&self) -> Result<String>;

    async fn handle_command(&mut self, command: Self::Command) -> Result<()>;

    /// Called for messages on [`Controller::channels`] and
    /// [`Controller::patterns`].
    async fn handle_message(&mut self, _message: BusMessage) -> Result<()> {
        Ok(())
    }

    /// Called on every heartbeat tick.
    async fn tick(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Owns a controller and runs its loop until shutdown or a fatal error.
pub struct ControllerRuntime<C: Controller> {
    controller: C,
    store: Arc<dyn Store>,
    config: Arc<CompdConfig>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<C: Controller> ControllerRuntime<C> {
    pub fn new(controller: C, store: Arc<dyn Store>, config: Arc<CompdConfig>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            controller,
            store,
            config,
            shutdown_tx,
        }
    }

    /// A handle that stops the loop when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Runs the controller. Returns it on orderly shutdown, or the fatal
    /// error that stopped it.
    pub async fn run(self) -> Result<C> {
        let Self {
            mut controller,
            store,
            config,
            shutdown_tx,
        } = self;
        let name = controller.name();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let dispatcher = controller.commands();

        let mut bus = Bus::new(store.clone());
        bus.subscribe(channels::COMMAND).await?;
        for channel in controller.channels() {
            bus.subscribe(&channel).await?;
        }
        for pattern in controller.patterns() {
            bus.psubscribe(&pattern).await?;
        }
        controller.configure().await?;
        bus.listen().await?;
        info!(
            "Controller '{}' running, handling {:?}",
            name,
            dispatcher.names()
        );

        let mut ticks = SystemClock::new(config.resolution.period());
        let mut liveness = SystemClock::new(config.liveness_interval());

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Controller '{}' shutting down", name);
                    break;
                }
                // Timers come before the bus so a busy bus cannot hold back
                // the heartbeat.
                tick = ticks.tick() => {
                    trace!("Controller '{}' tick #{}", name, tick.tick_count);
                    settle(name, controller.tick().await)?;
                }
                _ = liveness.tick() => {
                    let status = controller.status().await?;
                    CompEvent::Liveness {
                        controller: name.to_string(),
                        status,
                    }
                    .publish(store.as_ref())
                    .await?;
                }
                message = bus.receive() => {
                    let message = message.map_err(|e| {
                        error!("Controller '{}' lost the bus: {}", name, e);
                        e
                    })?;
                    let outcome = if message.channel == channels::COMMAND {
                        match dispatcher.dispatch(&message.payload) {
                            Ok(Some(command)) => controller.handle_command(command).await,
                            Ok(None) => Ok(()),
                            Err(e) => Err(e),
                        }
                    } else {
                        controller.handle_message(message).await
                    };
                    settle(name, outcome)?;
                }
            }
        }
        Ok(controller)
    }
}

/// Fatal errors stop the controller; anything else is logged and dropped so
/// one bad command cannot take a controller down.
fn settle(controller: &str, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => {
            error!("Controller '{}' stopping: {}", controller, e);
            Err(e)
        }
        Err(CompdError::Rejected(rejection)) => {
            warn!("Controller '{}' rejected a command: {}", controller, rejection);
            Ok(())
        }
        Err(e) => {
            warn!("Controller '{}' ignored input: {}", controller, e);
            Ok(())
        }
    }
}
