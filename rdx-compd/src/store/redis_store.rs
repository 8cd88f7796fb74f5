use super::{MessageStream, Store};
use crate::bus::BusMessage;
use crate::error::Result;
use async_trait::async_trait;
use futures::{future, StreamExt};
use redis::{aio::ConnectionManager, AsyncCommands, Msg};
use std::fmt;
use tracing::{debug, info, warn};

/// The production [`Store`], backed by a Redis server.
///
/// Commands go through a shared [`ConnectionManager`]; every listener opens
/// its own pub/sub connection, since Redis dedicates a connection to
/// subscriptions.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!("Successfully connected to Redis");
        Ok(Self { client, conn })
    }
}

fn decode(message: Msg) -> Option<BusMessage> {
    match message.get_payload::<String>() {
        Ok(payload) => Some(BusMessage::new(message.get_channel_name(), payload)),
        Err(e) => {
            warn!(
                "Dropping undecodable message on {}: {}",
                message.get_channel_name(),
                e
            );
            None
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(key).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = conn.keys(pattern).await?;
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        debug!("PUBLISH {} {}", channel, payload);
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn listen(&self, channels: &[String], patterns: &[String]) -> Result<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel).await?;
        }
        for pattern in patterns {
            pubsub.psubscribe(pattern).await?;
        }
        debug!("Listening on {:?} / {:?}", channels, patterns);
        let stream = pubsub
            .into_on_message()
            .filter_map(|message| future::ready(decode(message)));
        Ok(Box::pin(stream))
    }
}
