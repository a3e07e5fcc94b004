//! 在线状态记录
//!
//! 用户活动时覆盖写入；读取时按时间窗口过滤，旧记录不会被删除。

use serde::{Deserialize, Serialize};

use crate::value_objects::{TenantDomain, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub user_id: UserId,
    pub email: String,
    pub nickname: String,
    pub domain: TenantDomain,
    pub last_active: Timestamp,
}

impl ActiveUser {
    /// 是否在 `since` 之后活动过；恰好等于 `since` 的不算
    pub fn active_after(&self, since: Timestamp) -> bool {
        self.last_active > since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn window_boundary_is_exclusive() {
        let now = Utc::now();
        let user = ActiveUser {
            user_id: UserId::from(Uuid::new_v4()),
            email: "a@co.com".into(),
            nickname: "QuietOtter".into(),
            domain: TenantDomain::from_email("a@co.com").unwrap(),
            last_active: now - Duration::hours(24),
        };

        assert!(!user.active_after(now - Duration::hours(24)));
        assert!(user.active_after(now - Duration::hours(25)));
    }
}
