//! 昵称索引Repository接口定义

use async_trait::async_trait;

use crate::entities::nickname::{ClaimOutcome, NicknameEntry};
use crate::repositories::RepositoryResult;
use crate::value_objects::{Nickname, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NicknameRepository: Send + Sync {
    async fn find(&self, nickname: Nickname) -> RepositoryResult<Option<NicknameEntry>>;

    /// 原子地检查并写入：昵称空闲或已归 `entry.owner_id` 时写入，
    /// 否则返回当前持有者。实现必须保证并发抢占同一昵称时最多一个成功。
    async fn claim(&self, entry: NicknameEntry) -> RepositoryResult<ClaimOutcome>;

    /// 仅当条目属于 `owner_id` 时删除，返回是否删除了条目
    async fn release(&self, nickname: Nickname, owner_id: UserId) -> RepositoryResult<bool>;
}
