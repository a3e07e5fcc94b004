//! 账号密码的存储形式
//!
//! 进程内身份服务只保存摘要；bcrypt 计算量大，放到阻塞线程池里执行。

use std::fmt;

use application::IdentityError;
use async_trait::async_trait;
use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};
use thiserror::Error;
use tokio::task::JoinError;

/// 不可逆的密码摘要。Debug 输出不包含摘要内容。
#[derive(Clone, PartialEq, Eq)]
pub struct StoredPassword(String);

impl StoredPassword {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoredPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredPassword(..)")
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Bcrypt(#[from] BcryptError),
    #[error("password hashing task aborted: {0}")]
    Aborted(#[from] JoinError),
}

impl From<PasswordError> for IdentityError {
    fn from(error: PasswordError) -> Self {
        IdentityError::backend(error.to_string())
    }
}

#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn digest(&self, password: &str) -> Result<StoredPassword, PasswordError>;

    async fn matches(&self, password: &str, stored: &StoredPassword)
        -> Result<bool, PasswordError>;
}

#[derive(Debug, Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    /// `cost` 为空时使用 bcrypt 默认值；测试里用最小值 4 加速
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, PasswordError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BcryptError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn digest(&self, password: &str) -> Result<StoredPassword, PasswordError> {
        let cost = self.cost;
        let password = password.to_owned();
        run_blocking(move || hash(password, cost))
            .await
            .map(StoredPassword)
    }

    async fn matches(
        &self,
        password: &str,
        stored: &StoredPassword,
    ) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let stored = stored.0.clone();
        run_blocking(move || verify(password, &stored)).await
    }
}
