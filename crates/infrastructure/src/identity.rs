//! 进程内身份服务
//!
//! 账号、密码哈希、验证令牌都保存在内存里，适合单实例部署和测试。
//! 验证邮件不会真正发出，令牌可以通过 `pending_verification_token` 取得。
//! 连续输错密码会锁定账号，锁定时长过去后自动解除。

use std::{collections::HashMap, sync::Arc};

use application::{Clock, IdentityError, IdentityProvider};
use async_trait::async_trait;
use chrono::Duration;
use domain::{AuthUser, Timestamp, UserId};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::password::{PasswordHasher, StoredPassword};

pub const MIN_PASSWORD_LEN: usize = 6;
/// 连续失败这么多次后锁定账号
pub const MAX_FAILED_SIGN_INS: u32 = 5;

struct Account {
    user: AuthUser,
    password: StoredPassword,
    failed_sign_ins: u32,
    locked_at: Option<Timestamp>,
}

impl Account {
    /// 锁定是否仍然有效；已过期的锁定在这里清除
    fn lock_active(&mut self, now: Timestamp, lockout: Duration) -> bool {
        match self.locked_at {
            Some(locked_at) if now - locked_at < lockout => true,
            Some(_) => {
                self.locked_at = None;
                self.failed_sign_ins = 0;
                false
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Accounts {
    by_id: HashMap<UserId, Account>,
    by_email: HashMap<String, UserId>,
    verification_tokens: HashMap<String, UserId>,
}

pub struct MemoryIdentityProvider {
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    lockout: Duration,
    accounts: RwLock<Accounts>,
}

impl MemoryIdentityProvider {
    pub fn new(hasher: Arc<dyn PasswordHasher>, clock: Arc<dyn Clock>, lockout: Duration) -> Self {
        Self {
            hasher,
            clock,
            lockout,
            accounts: RwLock::new(Accounts::default()),
        }
    }

    /// 最近一次为该用户签发、尚未使用的验证令牌
    pub async fn pending_verification_token(&self, user_id: UserId) -> Option<String> {
        let accounts = self.accounts.read().await;
        accounts
            .verification_tokens
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(token, _)| token.clone())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), IdentityError> {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(IdentityError::InvalidEmail);
    };
    let well_formed = !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    if !well_formed {
        return Err(IdentityError::InvalidEmail);
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword {
                min_length: MIN_PASSWORD_LEN,
            });
        }
        if self.accounts.read().await.by_email.contains_key(&email) {
            return Err(IdentityError::EmailAlreadyInUse);
        }

        let password = self.hasher.digest(password).await?;

        let mut accounts = self.accounts.write().await;
        // 哈希期间可能有人用同一邮箱注册
        if accounts.by_email.contains_key(&email) {
            return Err(IdentityError::EmailAlreadyInUse);
        }

        let user = AuthUser::new(UserId::from(Uuid::new_v4()), email.clone(), false);
        accounts.by_email.insert(email, user.id);
        accounts.by_id.insert(
            user.id,
            Account {
                user: user.clone(),
                password,
                failed_sign_ins: 0,
                locked_at: None,
            },
        );

        info!(user_id = %user.id, "account created");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError> {
        let email = normalize_email(email);
        let (user_id, hashed) = {
            let mut accounts = self.accounts.write().await;
            let user_id = *accounts
                .by_email
                .get(&email)
                .ok_or(IdentityError::InvalidCredentials)?;
            let account = accounts
                .by_id
                .get_mut(&user_id)
                .ok_or(IdentityError::InvalidCredentials)?;
            if account.lock_active(self.clock.now(), self.lockout) {
                return Err(IdentityError::TooManyRequests);
            }
            (user_id, account.password.clone())
        };

        let matches = self.hasher.matches(password, &hashed).await?;

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .by_id
            .get_mut(&user_id)
            .ok_or(IdentityError::InvalidCredentials)?;

        if !matches {
            account.failed_sign_ins += 1;
            warn!(user_id = %user_id, failures = account.failed_sign_ins, "wrong password");
            if account.failed_sign_ins >= MAX_FAILED_SIGN_INS && account.locked_at.is_none() {
                account.locked_at = Some(self.clock.now());
                warn!(user_id = %user_id, "account locked");
            }
            return Err(IdentityError::InvalidCredentials);
        }

        account.failed_sign_ins = 0;
        account.locked_at = None;
        Ok(account.user.clone())
    }

    async fn sign_out(&self, user_id: UserId) -> Result<(), IdentityError> {
        if !self.accounts.read().await.by_id.contains_key(&user_id) {
            return Err(IdentityError::UserNotFound);
        }
        Ok(())
    }

    async fn send_email_verification(&self, user_id: UserId) -> Result<(), IdentityError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .by_id
            .get(&user_id)
            .ok_or(IdentityError::UserNotFound)?;
        if account.user.email_verified {
            return Err(IdentityError::AlreadyVerified);
        }

        accounts
            .verification_tokens
            .retain(|_, owner| *owner != user_id);
        let token = Uuid::new_v4().simple().to_string();
        accounts.verification_tokens.insert(token, user_id);

        info!(user_id = %user_id, "verification email issued");
        Ok(())
    }

    async fn confirm_email(&self, token: &str) -> Result<AuthUser, IdentityError> {
        let mut accounts = self.accounts.write().await;
        let user_id = accounts
            .verification_tokens
            .remove(token)
            .ok_or(IdentityError::InvalidVerificationToken)?;
        let account = accounts
            .by_id
            .get_mut(&user_id)
            .ok_or(IdentityError::UserNotFound)?;

        account.user.email_verified = true;
        Ok(account.user.clone())
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<AuthUser>, IdentityError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.by_id.get(&user_id).map(|account| account.user.clone()))
    }
}
