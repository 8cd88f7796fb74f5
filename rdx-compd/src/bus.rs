//! The message bus adapter every controller listens through.
//!
//! Listening happens on dedicated tokio tasks. They do nothing but forward
//! inbound messages onto a queue that the controller drains from its own
//! serialized loop, so no controller state is ever touched from a listener.

use crate::error::{CompdError, Result};
use crate::store::{MessageStream, Store};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

const QUEUE_CAPACITY: usize = 256;

/// One message received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

impl BusMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Message(BusMessage),
    Lost,
}

/// A per-controller view of the shared bus.
///
/// Subscriptions registered before [`Bus::listen`] share one listener;
/// each subscription added afterwards gets its own, feeding the same queue.
#[derive(Debug)]
pub struct Bus {
    store: Arc<dyn Store>,
    pending_channels: Vec<String>,
    pending_patterns: Vec<String>,
    listening: bool,
    sender: mpsc::Sender<Inbound>,
    receiver: mpsc::Receiver<Inbound>,
    listeners: Vec<JoinHandle<()>>,
}

impl Bus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            store,
            pending_channels: Vec::new(),
            pending_patterns: Vec::new(),
            listening: false,
            sender,
            receiver,
            listeners: Vec::new(),
        }
    }

    pub async fn subscribe(&mut self, channel: &str) -> Result<()> {
        if self.listening {
            self.spawn_listener(&[channel.to_string()], &[]).await
        } else {
            self.pending_channels.push(channel.to_string());
            Ok(())
        }
    }

    pub async fn psubscribe(&mut self, pattern: &str) -> Result<()> {
        if self.listening {
            self.spawn_listener(&[], &[pattern.to_string()]).await
        } else {
            self.pending_patterns.push(pattern.to_string());
            Ok(())
        }
    }

    /// Starts delivering messages for everything subscribed so far.
    pub async fn listen(&mut self) -> Result<()> {
        if self.listening {
            return Ok(());
        }
        let channels = std::mem::take(&mut self.pending_channels);
        let patterns = std::mem::take(&mut self.pending_patterns);
        self.spawn_listener(&channels, &patterns).await?;
        self.listening = true;
        Ok(())
    }

    /// Waits for the next inbound message.
    ///
    /// Fails with [`CompdError::Disconnected`] once any listener loses its
    /// connection; a controller cannot run with a partial view of the bus.
    /// Cancel-safe.
    pub async fn receive(&mut self) -> Result<BusMessage> {
        match self.receiver.recv().await {
            Some(Inbound::Message(message)) => Ok(message),
            Some(Inbound::Lost) | None => Err(CompdError::Disconnected),
        }
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        self.store.publish(channel, payload).await
    }

    async fn spawn_listener(&mut self, channels: &[String], patterns: &[String]) -> Result<()> {
        let stream = self.store.listen(channels, patterns).await?;
        let sender = self.sender.clone();
        let label = format!("{:?}/{:?}", channels, patterns);
        self.listeners
            .push(tokio::spawn(forward(stream, sender, label)));
        Ok(())
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

async fn forward(mut stream: MessageStream, sender: mpsc::Sender<Inbound>, label: String) {
    debug!("Bus listener {} started", label);
    while let Some(message) = stream.next().await {
        if sender.send(Inbound::Message(message)).await.is_err() {
            debug!("Bus listener {} closed by its controller", label);
            return;
        }
    }
    error!("Bus listener {} lost its connection", label);
    sender.send(Inbound::Lost).await.ok();
}
