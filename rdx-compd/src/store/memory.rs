//! An in-process [`Store`] with Redis semantics, used by tests and demos.

use super::{glob_match, MessageStream, Store};
use crate::bus::BusMessage;
use crate::common::SubscriberId;
use crate::error::{CompdError, Result};
use async_trait::async_trait;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug)]
struct Subscriber {
    channels: Vec<String>,
    patterns: Vec<String>,
    sender: mpsc::UnboundedSender<BusMessage>,
}

impl Subscriber {
    fn wants(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
            || self.patterns.iter().any(|p| glob_match(p, channel))
    }
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Value>,
    subscribers: SlotMap<SubscriberId, Subscriber>,
    disconnected: bool,
}

impl Inner {
    fn check_connected(&self) -> Result<()> {
        if self.disconnected {
            Err(CompdError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn list(&self, key: &str) -> Result<Option<&Vec<String>>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::List(items)) => Ok(Some(items)),
            Some(Value::Text(text)) => Err(CompdError::corrupt(key, text.clone())),
        }
    }
}

/// A cheaply cloneable in-memory store. Clones share the same data, so one
/// instance can stand in for the store shared by several controllers.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing the connection: every open subscription stream ends
    /// and every later operation fails with [`CompdError::Disconnected`].
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        warn!("In-memory store disconnected");
        inner.disconnected = true;
        inner.subscribers.clear();
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        inner.check_connected()?;
        match inner.values.get(key) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(Value::List(items)) => Err(CompdError::corrupt(key, items.join(" "))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_connected()?;
        trace!("SET {} = {}", key, value);
        inner
            .values
            .insert(key.to_string(), Value::Text(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_connected()?;
        trace!("DEL {}", key);
        inner.values.remove(key);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_connected()?;
        match inner.values.get_mut(key) {
            Some(Value::List(items)) => items.push(value.to_string()),
            Some(Value::Text(text)) => return Err(CompdError::corrupt(key, text.clone())),
            None => {
                inner
                    .values
                    .insert(key.to_string(), Value::List(vec![value.to_string()]));
            }
        }
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.check_connected()?;
        let Some(items) = inner.list(key)? else {
            return Ok(Vec::new());
        };
        let len = items.len() as isize;
        let start = if start < 0 { (start + len).max(0) } else { start };
        let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(items[start as usize..=stop as usize].to_vec())
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let inner = self.inner.lock().await;
        inner.check_connected()?;
        Ok(inner.list(key)?.map_or(0, Vec::len))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.check_connected()?;
        let mut keys: Vec<String> = inner
            .values
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_connected()?;
        debug!("PUBLISH {} {}", channel, payload);
        let mut closed = Vec::new();
        for (id, subscriber) in inner.subscribers.iter() {
            if !subscriber.wants(channel) {
                continue;
            }
            let message = BusMessage::new(channel, payload);
            if subscriber.sender.send(message).is_err() {
                closed.push(id);
            }
        }
        for id in closed {
            inner.subscribers.remove(id);
        }
        Ok(())
    }

    async fn listen(&self, channels: &[String], patterns: &[String]) -> Result<MessageStream> {
        let mut inner = self.inner.lock().await;
        inner.check_connected()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = inner.subscribers.insert(Subscriber {
            channels: channels.to_vec(),
            patterns: patterns.to_vec(),
            sender,
        });
        debug!(
            "Subscriber {:?} listening on {:?} / {:?}",
            id, channels, patterns
        );
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }
}
