//! 在线状态Repository接口定义

use async_trait::async_trait;

use crate::entities::presence::ActiveUser;
use crate::repositories::RepositoryResult;
use crate::value_objects::{TenantDomain, Timestamp};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// 按用户覆盖写入在线记录
    async fn upsert(&self, presence: ActiveUser) -> RepositoryResult<ActiveUser>;

    /// `last_active > since` 的记录，按最近活动倒序
    async fn active_since(
        &self,
        domain: TenantDomain,
        since: Timestamp,
    ) -> RepositoryResult<Vec<ActiveUser>>;
}
