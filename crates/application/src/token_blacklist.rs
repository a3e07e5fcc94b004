//! 已注销令牌的黑名单端口
//!
//! 令牌按 `jti` 记录，只需要保留到令牌本身过期为止。

use async_trait::async_trait;
use domain::Timestamp;

use crate::error::ApplicationError;

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// 拉黑令牌直到 `expires_at`；已经过期的令牌直接忽略
    async fn revoke(&self, jti: &str, expires_at: Timestamp) -> Result<(), ApplicationError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, ApplicationError>;
}
