//! 客户端会话：持有当前登录用户，并提供变更通知。

use std::sync::Arc;

use domain::{AuthUser, DomainError, TenantDomain};
use tokio::sync::watch;

#[derive(Clone)]
pub struct AuthSession {
    current: Arc<watch::Sender<Option<AuthUser>>>,
}

impl AuthSession {
    /// 未登录的会话
    pub fn anonymous() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            current: Arc::new(sender),
        }
    }

    /// 已经通过其他方式（如 JWT）确认身份的会话
    pub fn authenticated(user: AuthUser) -> Self {
        let session = Self::anonymous();
        session.set(Some(user));
        session
    }

    pub fn current(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    /// 当前用户的变更流（登录、登出、邮箱验证状态变化）
    pub fn changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }

    pub fn require_user(&self) -> Result<AuthUser, DomainError> {
        self.current().ok_or(DomainError::Unauthenticated)
    }

    /// 当前用户的租户域；所有按域隔离的操作都先经过这里
    pub fn tenant(&self) -> Result<TenantDomain, DomainError> {
        self.require_user()?.tenant()
    }

    pub(crate) fn set(&self, user: Option<AuthUser>) {
        self.current.send_replace(user);
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::anonymous()
    }
}
