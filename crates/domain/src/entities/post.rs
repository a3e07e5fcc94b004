//! 帖子实体定义
//!
//! `liked_by` 是点赞的事实来源，`likes` 是与之同步维护的计数。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{PostId, TenantDomain, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub domain: TenantDomain,
    pub author_id: UserId,
    pub author_nickname: String,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub likes: u32,
    pub liked_by: BTreeSet<UserId>,
}

impl Post {
    pub const MAX_TITLE_CHARS: usize = 100;
    pub const MAX_CONTENT_CHARS: usize = 5000;

    pub fn new(
        id: PostId,
        domain: TenantDomain,
        author_id: UserId,
        author_nickname: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        now: Timestamp,
    ) -> DomainResult<Self> {
        let title = title.into().trim().to_owned();
        let content = content.into();

        if title.is_empty() {
            return Err(DomainError::validation_error("title", "cannot be empty"));
        }
        if title.chars().count() > Self::MAX_TITLE_CHARS {
            return Err(DomainError::validation_error("title", "too long"));
        }
        if content.trim().is_empty() {
            return Err(DomainError::validation_error("content", "cannot be empty"));
        }
        if content.chars().count() > Self::MAX_CONTENT_CHARS {
            return Err(DomainError::validation_error("content", "too long"));
        }

        Ok(Self {
            id,
            domain,
            author_id,
            author_nickname: author_nickname.into(),
            title,
            content,
            created_at: now,
            likes: 0,
            liked_by: BTreeSet::new(),
        })
    }

    pub fn is_liked_by(&self, user_id: UserId) -> bool {
        self.liked_by.contains(&user_id)
    }

    /// 切换用户的点赞状态，返回切换后是否为已点赞。
    pub fn toggle_like(&mut self, user_id: UserId) -> bool {
        let liked = if self.liked_by.remove(&user_id) {
            false
        } else {
            self.liked_by.insert(user_id);
            true
        };
        self.likes = self.liked_by.len() as u32;
        liked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn post() -> Post {
        Post::new(
            PostId::generate(),
            TenantDomain::parse("co.com").unwrap(),
            UserId::from(Uuid::new_v4()),
            "QuietOtter",
            "Lunch",
            "Anyone for noodles?",
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn toggle_twice_restores_state() {
        let mut post = post();
        let liker = UserId::from(Uuid::new_v4());
        let original = post.clone();

        assert!(post.toggle_like(liker));
        assert_eq!(post.likes, 1);
        assert!(post.is_liked_by(liker));

        assert!(!post.toggle_like(liker));
        assert_eq!(post, original);
    }

    #[test]
    fn count_tracks_membership() {
        let mut post = post();
        for _ in 0..3 {
            post.toggle_like(UserId::from(Uuid::new_v4()));
        }
        assert_eq!(post.likes as usize, post.liked_by.len());
        assert_eq!(post.likes, 3);
    }

    #[test]
    fn empty_title_is_rejected() {
        let result = Post::new(
            PostId::generate(),
            TenantDomain::parse("co.com").unwrap(),
            UserId::from(Uuid::new_v4()),
            "n",
            " ",
            "body",
            Utc::now(),
        );
        assert!(matches!(result, Err(DomainError::ValidationError { .. })));
    }
}
