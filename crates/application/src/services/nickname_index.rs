//! 昵称唯一性索引
//!
//! 索引集合以昵称为键，记录昵称的拥有者。查重先查索引，未命中时再按昵称扫描资料
//! （索引上线之前创建的资料只能这样查到）。写入由存储层的原子 `claim` 完成，
//! 两个用户并发抢同一个昵称时只有一个能成功。

use std::sync::Arc;

use domain::{ClaimOutcome, Nickname, NicknameEntry, NicknameRepository, ProfileRepository, UserId};
use rand::{seq::IndexedRandom, Rng};
use tracing::{debug, info, warn};

use crate::{clock::Clock, error::ApplicationError};

const ADJECTIVES: &[&str] = &[
    "Quiet", "Swift", "Brave", "Calm", "Sunny", "Lucky", "Witty", "Gentle", "Bold", "Clever",
    "Happy", "Mellow", "Nimble", "Jolly", "Misty", "Cosmic",
];

const ANIMALS: &[&str] = &[
    "Otter", "Panda", "Falcon", "Koala", "Lynx", "Heron", "Badger", "Moose", "Owl", "Fox",
    "Tiger", "Dolphin", "Raven", "Bison", "Gecko", "Puffin",
];

pub struct NicknameIndex {
    nicknames: Arc<dyn NicknameRepository>,
    profiles: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl NicknameIndex {
    pub fn new(
        nicknames: Arc<dyn NicknameRepository>,
        profiles: Arc<dyn ProfileRepository>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            nicknames,
            profiles,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// 昵称是否已被 `caller` 以外的用户占用
    pub async fn exists(
        &self,
        nickname: &Nickname,
        caller: Option<UserId>,
    ) -> Result<bool, ApplicationError> {
        if let Some(entry) = self.nicknames.find(nickname.clone()).await? {
            return Ok(Some(entry.owner_id) != caller);
        }

        let profiles = self.profiles.find_by_nickname(nickname.clone()).await?;
        let taken = profiles.iter().any(|profile| Some(profile.id) != caller);
        if taken {
            debug!(nickname = %nickname, "nickname found by profile scan");
        }
        Ok(taken)
    }

    /// 把 `new_nickname` 登记到 `user_id` 名下，并释放旧昵称。
    ///
    /// 新昵称属于其他用户时返回 `false`，此时旧昵称保持不变。
    pub async fn upsert(
        &self,
        user_id: UserId,
        new_nickname: &Nickname,
        old_nickname: Option<&Nickname>,
    ) -> Result<bool, ApplicationError> {
        let entry = NicknameEntry::new(new_nickname.clone(), user_id, self.clock.now());

        match self.nicknames.claim(entry).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::Taken { owner_id } => {
                info!(
                    nickname = %new_nickname,
                    user_id = %user_id,
                    owner_id = %owner_id,
                    "nickname already owned by another user"
                );
                return Ok(false);
            }
        }

        if let Some(old) = old_nickname.filter(|old| *old != new_nickname) {
            self.release_best_effort(user_id, old).await;
        }

        Ok(true)
    }

    /// 释放 `user_id` 名下的昵称；失败只记录日志
    pub async fn release_best_effort(&self, user_id: UserId, nickname: &Nickname) {
        match self.nicknames.release(nickname.clone(), user_id).await {
            Ok(true) => debug!(nickname = %nickname, user_id = %user_id, "released nickname"),
            Ok(false) => debug!(nickname = %nickname, "stale nickname entry not owned by user"),
            Err(err) => warn!(
                nickname = %nickname,
                user_id = %user_id,
                error = %err,
                "failed to release old nickname entry"
            ),
        }
    }

    /// 生成当前未被占用的随机昵称。
    ///
    /// 先尝试 `max_attempts` 次，都冲突时追加四位随机数字作为兜底。
    /// 返回时昵称未被占用，但并没有被预留，真正的占用发生在 `upsert`。
    pub async fn generate_unique(&self, caller: Option<UserId>) -> Result<Nickname, ApplicationError> {
        for attempt in 1..=self.max_attempts {
            let candidate = random_nickname(false)?;
            if !self.exists(&candidate, caller).await? {
                debug!(nickname = %candidate, attempt, "generated unique nickname");
                return Ok(candidate);
            }
        }

        let fallback = random_nickname(true)?;
        warn!(
            nickname = %fallback,
            attempts = self.max_attempts,
            "random nickname space exhausted, using numeric suffix"
        );
        Ok(fallback)
    }
}

fn random_nickname(with_suffix: bool) -> Result<Nickname, ApplicationError> {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Quiet");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Otter");

    let raw = if with_suffix {
        format!("{adjective}{animal}{}", rng.random_range(1000..10000))
    } else {
        format!("{adjective}{animal}")
    };
    Ok(Nickname::parse(raw)?)
}
