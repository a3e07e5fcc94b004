//! 注册记录
//!
//! 账号创建时写入一次，保留注册时的邮箱和所属域。

use serde::{Deserialize, Serialize};

use crate::value_objects::{TenantDomain, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: UserId,
    pub email: String,
    pub domain: TenantDomain,
    pub registered_at: Timestamp,
}
