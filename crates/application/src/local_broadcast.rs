// 进程内的变更广播器
use crate::broadcaster::{BroadcastError, ChangeBroadcaster, RoomChange};
use async_trait::async_trait;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalChangeBroadcaster {
    sender: broadcast::Sender<RoomChange>,
}

impl LocalChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for LocalChangeBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ChangeBroadcaster for LocalChangeBroadcaster {
    async fn publish(&self, change: RoomChange) -> Result<(), BroadcastError> {
        // 没有订阅者时 send 会返回错误，这不是失败
        if self.sender.send(change).is_err() {
            tracing::trace!("no active subscribers for room change");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomChange> {
        self.sender.subscribe()
    }
}
