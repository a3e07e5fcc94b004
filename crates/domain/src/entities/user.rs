//! 身份用户
//!
//! 用户由外部身份服务管理，这里只读取它的标识和邮箱。

use serde::{Deserialize, Serialize};

use crate::errors::DomainResult;
use crate::value_objects::{TenantDomain, UserId};

/// 已登录的身份用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub email_verified: bool,
}

impl AuthUser {
    pub fn new(id: UserId, email: impl Into<String>, email_verified: bool) -> Self {
        Self {
            id,
            email: email.into(),
            email_verified,
        }
    }

    /// 用户所属的租户域
    pub fn tenant(&self) -> DomainResult<TenantDomain> {
        TenantDomain::from_email(&self.email)
    }
}
