//! 注册记录Repository接口定义

use async_trait::async_trait;

use crate::entities::registration::Registration;
use crate::repositories::RepositoryResult;
use crate::value_objects::UserId;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// 按用户覆盖写入
    async fn record(&self, registration: Registration) -> RepositoryResult<Registration>;

    async fn find_by_user(&self, user_id: UserId) -> RepositoryResult<Option<Registration>>;
}
