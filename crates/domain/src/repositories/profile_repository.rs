//! 个人资料Repository接口定义

use async_trait::async_trait;

use crate::entities::profile::Profile;
use crate::repositories::RepositoryResult;
use crate::value_objects::{Nickname, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<Profile>>;

    /// 按昵称等值扫描（昵称索引建立之前的数据只能这样查）
    async fn find_by_nickname(&self, nickname: Nickname) -> RepositoryResult<Vec<Profile>>;

    /// 整体覆盖写入
    async fn upsert(&self, profile: Profile) -> RepositoryResult<Profile>;
}
