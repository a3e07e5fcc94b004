//! 消息Repository接口定义

use async_trait::async_trait;

use crate::entities::message::Message;
use crate::repositories::RepositoryResult;
use crate::value_objects::{RoomId, TenantDomain};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加一条消息
    async fn append(&self, message: Message) -> RepositoryResult<Message>;

    /// 房间最新的 `limit` 条消息，按时间倒序
    async fn latest(
        &self,
        domain: TenantDomain,
        room_id: RoomId,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>>;
}
