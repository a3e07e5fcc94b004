//! 帖子Repository接口定义

use async_trait::async_trait;

use crate::entities::post::Post;
use crate::repositories::RepositoryResult;
use crate::value_objects::{PostId, TenantDomain, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: Post) -> RepositoryResult<Post>;

    async fn find_by_id(&self, id: PostId) -> RepositoryResult<Option<Post>>;

    /// 租户域下的帖子，按创建时间倒序
    async fn list_by_domain(&self, domain: TenantDomain) -> RepositoryResult<Vec<Post>>;

    /// 原子地切换点赞状态并同步计数；帖子不存在时返回 `NotFound`
    async fn toggle_like(&self, id: PostId, user_id: UserId) -> RepositoryResult<Post>;

    /// 帖子不存在时返回 `NotFound`
    async fn delete(&self, id: PostId) -> RepositoryResult<()>;
}
