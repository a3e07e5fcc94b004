//! 昵称索引条目
//!
//! 昵称 → 拥有者的二级索引，用来保证昵称全局唯一。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Nickname, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicknameEntry {
    pub nickname: Nickname,
    pub owner_id: UserId,
    pub created_at: Timestamp,
}

impl NicknameEntry {
    pub fn new(nickname: Nickname, owner_id: UserId, created_at: Timestamp) -> Self {
        Self {
            nickname,
            owner_id,
            created_at,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// 原子抢占昵称的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// 昵称归调用者所有（新写入或原本就是自己的）
    Claimed,
    /// 昵称已被其他用户持有
    Taken { owner_id: UserId },
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed)
    }
}
