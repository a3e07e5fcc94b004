use async_trait::async_trait;
use domain::{MessageId, RoomId, TenantDomain};
use thiserror::Error;
use tokio::sync::broadcast;

/// 某个 (租户域, 房间) 的消息集合发生了变化
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoomChange {
    pub domain: TenantDomain,
    pub room_id: RoomId,
    pub message_id: MessageId,
}

impl RoomChange {
    pub fn concerns(&self, domain: &TenantDomain, room_id: &RoomId) -> bool {
        self.domain == *domain && self.room_id == *room_id
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 变更通知通道。订阅者收到通知后自行重新查询最新快照。
#[async_trait]
pub trait ChangeBroadcaster: Send + Sync {
    async fn publish(&self, change: RoomChange) -> Result<(), BroadcastError>;

    fn subscribe(&self) -> broadcast::Receiver<RoomChange>;
}
