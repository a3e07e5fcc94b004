//! 聊天室Repository接口定义

use async_trait::async_trait;

use crate::entities::chatroom::ChatRoom;
use crate::repositories::RepositoryResult;
use crate::value_objects::TenantDomain;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 租户域下的全部房间，按创建时间升序
    async fn list(&self, domain: TenantDomain) -> RepositoryResult<Vec<ChatRoom>>;

    /// 按 (domain, id) 覆盖写入单个房间
    async fn save(&self, room: ChatRoom) -> RepositoryResult<ChatRoom>;
}
