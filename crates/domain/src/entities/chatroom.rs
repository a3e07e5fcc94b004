//! 聊天室实体定义

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RoomId, TenantDomain, Timestamp, UserId};

/// 租户域第一次没有任何房间时自动创建的默认房间
pub const DEFAULT_ROOMS: [(&str, &str); 4] = [
    ("general", "General"),
    ("random", "Random"),
    ("work", "Work"),
    ("help", "Help"),
];

/// 聊天室实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub domain: TenantDomain,
    pub name: String,
    pub created_at: Timestamp,
    /// 默认房间没有创建者
    pub created_by: Option<UserId>,
}

impl ChatRoom {
    pub const MAX_NAME_CHARS: usize = 50;

    pub fn new(
        id: RoomId,
        domain: TenantDomain,
        name: impl Into<String>,
        created_by: Option<UserId>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::validation_error("name", "cannot be empty"));
        }
        if name.chars().count() > Self::MAX_NAME_CHARS {
            return Err(DomainError::validation_error("name", "too long"));
        }

        Ok(Self {
            id,
            domain,
            name,
            created_at: now,
            created_by,
        })
    }

    /// 构造默认房间集合
    pub fn defaults(domain: &TenantDomain, now: Timestamp) -> Vec<ChatRoom> {
        DEFAULT_ROOMS
            .iter()
            .filter_map(|(id, name)| {
                let id = RoomId::parse(*id).ok()?;
                ChatRoom::new(id, domain.clone(), *name, None, now).ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn defaults_are_the_four_fixed_rooms() {
        let domain = TenantDomain::parse("co.com").unwrap();
        let rooms = ChatRoom::defaults(&domain, Utc::now());
        let ids: Vec<&str> = rooms.iter().map(|room| room.id.as_str()).collect();
        assert_eq!(ids, vec!["general", "random", "work", "help"]);
        assert!(rooms.iter().all(|room| room.created_by.is_none()));
    }

    #[test]
    fn blank_name_is_rejected() {
        let domain = TenantDomain::parse("co.com").unwrap();
        let result = ChatRoom::new(
            RoomId::parse("x").unwrap(),
            domain,
            "   ",
            None,
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
