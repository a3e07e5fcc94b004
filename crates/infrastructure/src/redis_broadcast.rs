//! 基于 Redis Pub/Sub 的变更广播
//!
//! 发布时写入 Redis 频道；后台任务订阅同一频道并转发给本进程的订阅者，
//! 因此多个实例之间的订阅也能收到彼此的变更。

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use application::{BroadcastError, ChangeBroadcaster, RoomChange};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::{sync::broadcast, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const FEED_CAPACITY: usize = 1000;

/// 本进程订阅者共用的通道。关闭后已有接收端收到 `Closed`，
/// 之后的订阅拿到的也是已关闭的接收端。
#[derive(Clone)]
struct FeedSlot {
    sender: Arc<Mutex<Option<broadcast::Sender<RoomChange>>>>,
}

impl FeedSlot {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    fn sender(&self) -> Option<broadcast::Sender<RoomChange>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        match self.sender() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct RedisChangeBroadcaster {
    connection: ConnectionManager,
    channel: String,
    feed: FeedSlot,
    listener: JoinHandle<()>,
}

impl RedisChangeBroadcaster {
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, redis::RedisError> {
        let channel = channel.into();
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        let feed = FeedSlot::new(FEED_CAPACITY);

        let listener = tokio::spawn(listen_loop(client, channel.clone(), feed.clone()));
        info!(channel = %channel, "redis change feed connected");

        Ok(Self {
            connection,
            channel,
            feed,
            listener,
        })
    }
}

impl Drop for RedisChangeBroadcaster {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl ChangeBroadcaster for RedisChangeBroadcaster {
    async fn publish(&self, change: RoomChange) -> Result<(), BroadcastError> {
        let payload =
            serde_json::to_string(&change).map_err(|err| BroadcastError::failed(err.to_string()))?;

        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(&self.channel, payload)
            .await
            .map_err(|err| BroadcastError::failed(err.to_string()))?;

        debug!(room_id = %change.room_id, receivers, "published room change");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.feed.subscribe()
    }
}

/// 断线或订阅流结束后按指数退避重连。连续失败达到上限后关闭本地通道，
/// 订阅者据此得知变更推送已不可用。
async fn listen_loop(client: Client, channel: String, feed: FeedSlot) {
    let mut failures = 0u32;

    loop {
        let Some(sender) = feed.sender() else {
            return;
        };

        match forward_messages(&client, &channel, &sender).await {
            Ok(forwarded) => {
                if forwarded > 0 {
                    failures = 0;
                }
                failures += 1;
                warn!(channel = %channel, failures, "redis subscription stream ended");
            }
            Err(err) => {
                failures += 1;
                error!(channel = %channel, error = %err, failures, "redis subscription failed");
            }
        }

        if failures >= MAX_RECONNECT_ATTEMPTS {
            error!(channel = %channel, "giving up on redis subscription");
            feed.close();
            return;
        }
        sleep(RECONNECT_BASE * 2u32.pow(failures - 1)).await;
    }
}

/// 转发直到订阅流结束，返回转发的变更条数
async fn forward_messages(
    client: &Client,
    channel: &str,
    sender: &broadcast::Sender<RoomChange>,
) -> Result<usize, redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;

    let mut forwarded = 0;
    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "unreadable redis payload");
                continue;
            }
        };

        match serde_json::from_str::<RoomChange>(&payload) {
            Ok(change) => {
                // 本进程没有订阅者时发送失败是正常的
                let _ = sender.send(change);
                forwarded += 1;
            }
            Err(err) => warn!(error = %err, "malformed room change payload"),
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MessageId, RoomId, TenantDomain};
    use tokio::sync::broadcast::error::RecvError;

    fn change() -> RoomChange {
        RoomChange {
            domain: TenantDomain::from_email("a@co.com").unwrap(),
            room_id: RoomId::general(),
            message_id: MessageId::generate(),
        }
    }

    #[tokio::test]
    async fn closing_feed_ends_existing_and_new_subscriptions() {
        let feed = FeedSlot::new(8);
        let mut existing = feed.subscribe();

        let sender = feed.sender().unwrap();
        sender.send(change()).unwrap();
        assert!(existing.recv().await.is_ok());

        drop(sender);
        feed.close();

        assert!(matches!(existing.recv().await, Err(RecvError::Closed)));
        assert!(matches!(feed.subscribe().recv().await, Err(RecvError::Closed)));
        assert!(feed.sender().is_none());
    }

    #[tokio::test]
    async fn unreachable_server_closes_feed_after_retries() {
        let feed = FeedSlot::new(8);
        let mut subscriber = feed.subscribe();

        // 端口 1 上没有 Redis，每次连接都会失败
        let client = Client::open("redis://127.0.0.1:1/").unwrap();
        listen_loop(client, "room-changes".into(), feed.clone()).await;

        assert!(matches!(subscriber.recv().await, Err(RecvError::Closed)));
    }
}
