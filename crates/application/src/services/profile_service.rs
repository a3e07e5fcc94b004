use std::sync::Arc;

use domain::{AuthUser, DomainError, Nickname, Profile, ProfileRepository, ProfileUpdate, UserId};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{clock::Clock, error::ApplicationError, services::nickname_index::NicknameIndex};

/// 生成昵称后被并发抢走时的重试次数
const CREATE_RETRIES: usize = 3;

/// 修改昵称的结果；昵称冲突属于正常结果而不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NicknameChange {
    pub success: bool,
    pub message: String,
}

impl NicknameChange {
    fn changed() -> Self {
        Self {
            success: true,
            message: "Nickname changed.".to_string(),
        }
    }

    fn unchanged() -> Self {
        Self {
            success: true,
            message: "Nickname unchanged.".to_string(),
        }
    }

    fn taken() -> Self {
        Self {
            success: false,
            message: "This nickname is already in use.".to_string(),
        }
    }
}

pub struct ProfileServiceDependencies {
    pub profile_repository: Arc<dyn ProfileRepository>,
    pub nickname_index: Arc<NicknameIndex>,
    pub clock: Arc<dyn Clock>,
}

pub struct ProfileService {
    deps: ProfileServiceDependencies,
}

impl ProfileService {
    pub fn new(deps: ProfileServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn nickname_index(&self) -> &NicknameIndex {
        &self.deps.nickname_index
    }

    /// 只读查询，不会惰性创建
    pub async fn find(&self, user_id: UserId) -> Result<Option<Profile>, ApplicationError> {
        Ok(self.deps.profile_repository.find_by_id(user_id).await?)
    }

    /// 读取资料，不存在时以随机唯一昵称创建
    pub async fn load(&self, user: &AuthUser) -> Result<Profile, ApplicationError> {
        if let Some(profile) = self.find(user.id).await? {
            return Ok(profile);
        }
        self.create_initial(user.id, &user.email).await
    }

    /// 注册时显式创建初始资料；资料已存在时直接返回
    pub async fn create_initial(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<Profile, ApplicationError> {
        if let Some(profile) = self.find(user_id).await? {
            return Ok(profile);
        }

        let index = &self.deps.nickname_index;
        for _ in 0..CREATE_RETRIES {
            let nickname = index.generate_unique(Some(user_id)).await?;
            if !index.upsert(user_id, &nickname, None).await? {
                warn!(user_id = %user_id, nickname = %nickname, "generated nickname was taken concurrently");
                continue;
            }

            let profile = Profile::new(
                user_id,
                nickname.clone(),
                Some(email.to_owned()),
                self.deps.clock.now(),
            );
            let stored = match self.deps.profile_repository.upsert(profile).await {
                Ok(stored) => stored,
                Err(err) => {
                    error!(user_id = %user_id, error = %err, "failed to create profile");
                    index.release_best_effort(user_id, &nickname).await;
                    return Err(err.into());
                }
            };

            info!(user_id = %user_id, nickname = %stored.nickname, "created profile");
            return Ok(stored);
        }

        Err(DomainError::nickname_taken("generated nickname").into())
    }

    /// 合并更新资料。昵称变化时先完成唯一性检查和索引登记，冲突则整次更新被拒绝。
    pub async fn update(
        &self,
        user: &AuthUser,
        update: ProfileUpdate,
    ) -> Result<Profile, ApplicationError> {
        if let Some(bio) = update.bio.as_deref() {
            Profile::validate_bio(bio)?;
        }

        let mut profile = self.load(user).await?;
        let previous = profile.nickname.clone();
        let new_nickname = profile.nickname_change(&update).cloned();

        if let Some(nickname) = &new_nickname {
            let index = &self.deps.nickname_index;
            if index.exists(nickname, Some(user.id)).await? {
                info!(user_id = %user.id, nickname = %nickname, "nickname collision");
                return Err(DomainError::nickname_taken(nickname.as_str()).into());
            }
            if !index.upsert(user.id, nickname, Some(&previous)).await? {
                return Err(DomainError::nickname_taken(nickname.as_str()).into());
            }
        }

        let changed = profile.apply(update, self.deps.clock.now())?;
        if !changed {
            return Ok(profile);
        }

        match self.deps.profile_repository.upsert(profile).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                error!(user_id = %user.id, error = %err, "failed to persist profile update");
                if let Some(nickname) = &new_nickname {
                    // 资料没写进去，把昵称还原
                    let index = &self.deps.nickname_index;
                    if let Err(restore) = index.upsert(user.id, &previous, Some(nickname)).await {
                        warn!(user_id = %user.id, error = %restore, "failed to restore nickname index");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// 修改昵称；与当前昵称相同时直接成功，不写入任何数据
    pub async fn rename(
        &self,
        user: &AuthUser,
        new_nickname: &str,
    ) -> Result<NicknameChange, ApplicationError> {
        let nickname = Nickname::parse(new_nickname)?;
        let profile = self.load(user).await?;
        if profile.nickname == nickname {
            return Ok(NicknameChange::unchanged());
        }

        let update = ProfileUpdate {
            nickname: Some(nickname),
            bio: None,
        };
        match self.update(user, update).await {
            Ok(_) => Ok(NicknameChange::changed()),
            Err(err) if err.is_conflict() => Ok(NicknameChange::taken()),
            Err(err) => Err(err),
        }
    }

    /// 昵称是否被其他用户占用（调用者自己的昵称不算）。
    /// 空白或不合规的昵称不可能被占用，直接返回 `false`。
    pub async fn nickname_exists(
        &self,
        user: &AuthUser,
        nickname: &str,
    ) -> Result<bool, ApplicationError> {
        let Ok(nickname) = Nickname::parse(nickname) else {
            return Ok(false);
        };
        self.deps.nickname_index.exists(&nickname, Some(user.id)).await
    }

    pub async fn generate_unique_nickname(
        &self,
        user: &AuthUser,
    ) -> Result<Nickname, ApplicationError> {
        self.deps.nickname_index.generate_unique(Some(user.id)).await
    }
}
