//! 身份服务端口
//!
//! 认证协议本身由外部服务负责，这里只定义本模块消费的契约。

use async_trait::async_trait;
use domain::{AuthUser, UserId};
use thiserror::Error;

/// 身份服务错误。常见错误带有可以直接展示给用户的文案。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    #[error("This email address is already registered.")]
    EmailAlreadyInUse,
    #[error("The email address is not valid.")]
    InvalidEmail,
    #[error("Password must be at least {min_length} characters.")]
    WeakPassword { min_length: usize },
    #[error("Too many attempts. Please try again later.")]
    TooManyRequests,
    #[error("Email or password is incorrect.")]
    InvalidCredentials,
    #[error("Email verification is not complete. Please check your inbox.")]
    EmailNotVerified,
    #[error("This email address is already verified.")]
    AlreadyVerified,
    #[error("User not found.")]
    UserNotFound,
    #[error("Verification link is invalid or expired.")]
    InvalidVerificationToken,
    #[error("identity provider failure: {0}")]
    Backend(String),
}

impl IdentityError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 注册新账号
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError>;

    async fn sign_out(&self, user_id: UserId) -> Result<(), IdentityError>;

    /// 发送验证邮件；已验证的账号返回 `AlreadyVerified`
    async fn send_email_verification(&self, user_id: UserId) -> Result<(), IdentityError>;

    /// 用验证邮件里的令牌确认邮箱
    async fn confirm_email(&self, token: &str) -> Result<AuthUser, IdentityError>;

    async fn find_user(&self, user_id: UserId) -> Result<Option<AuthUser>, IdentityError>;
}
