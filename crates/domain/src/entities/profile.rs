//! 个人资料实体定义
//!
//! 每个用户一份资料，首次访问时惰性创建。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{Nickname, Timestamp, UserId};

/// 个人资料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// 与身份用户相同的ID
    pub id: UserId,
    pub nickname: Nickname,
    pub bio: String,
    pub email: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// 资料的部分更新，`None` 的字段保持不变
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<Nickname>,
    pub bio: Option<String>,
}

impl Profile {
    pub const MAX_BIO_CHARS: usize = 300;

    pub fn new(id: UserId, nickname: Nickname, email: Option<String>, now: Timestamp) -> Self {
        Self {
            id,
            nickname,
            bio: String::new(),
            email,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate_bio(bio: &str) -> DomainResult<()> {
        if bio.chars().count() > Self::MAX_BIO_CHARS {
            return Err(DomainError::validation_error("bio", "too long"));
        }
        Ok(())
    }

    /// 更新会改变昵称时返回新昵称
    pub fn nickname_change<'a>(&self, update: &'a ProfileUpdate) -> Option<&'a Nickname> {
        update
            .nickname
            .as_ref()
            .filter(|nickname| **nickname != self.nickname)
    }

    /// 合并字段；只有确实发生变化时才刷新 `updated_at`，返回是否变化。
    pub fn apply(&mut self, update: ProfileUpdate, now: Timestamp) -> DomainResult<bool> {
        let mut changed = false;

        if let Some(bio) = update.bio {
            Self::validate_bio(&bio)?;
            if bio != self.bio {
                self.bio = bio;
                changed = true;
            }
        }

        if let Some(nickname) = update.nickname {
            if nickname != self.nickname {
                self.nickname = nickname;
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn profile() -> Profile {
        Profile::new(
            UserId::from(Uuid::new_v4()),
            Nickname::parse("QuietOtter").unwrap(),
            Some("a@co.com".into()),
            Utc::now(),
        )
    }

    #[test]
    fn unchanged_update_keeps_timestamp() {
        let mut profile = profile();
        let before = profile.updated_at;
        let update = ProfileUpdate {
            nickname: Some(profile.nickname.clone()),
            bio: Some(String::new()),
        };

        let changed = profile.apply(update, before + Duration::seconds(5)).unwrap();

        assert!(!changed);
        assert_eq!(profile.updated_at, before);
    }

    #[test]
    fn bio_change_bumps_timestamp() {
        let mut profile = profile();
        let later = profile.updated_at + Duration::seconds(5);

        let changed = profile
            .apply(
                ProfileUpdate {
                    nickname: None,
                    bio: Some("hello".into()),
                },
                later,
            )
            .unwrap();

        assert!(changed);
        assert_eq!(profile.bio, "hello");
        assert_eq!(profile.updated_at, later);
    }

    #[test]
    fn oversize_bio_is_rejected() {
        let mut profile = profile();
        let result = profile.apply(
            ProfileUpdate {
                nickname: None,
                bio: Some("x".repeat(301)),
            },
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
