//! 令牌黑名单
//!
//! 单实例部署用内存表，按过期时间顺带清理；配置了 Redis 时用带 TTL 的键，
//! 多个实例共享同一份黑名单。

use std::{collections::HashMap, sync::Arc};

use application::{ApplicationError, Clock, TokenBlacklist};
use async_trait::async_trait;
use domain::Timestamp;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::sync::RwLock;
use tracing::{debug, info};

const KEY_PREFIX: &str = "workchat:token_blacklist:";

pub struct MemoryTokenBlacklist {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Timestamp>>,
}

impl MemoryTokenBlacklist {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 当前仍在黑名单里的令牌数
    pub async fn active_count(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.len()
    }
}

#[async_trait]
impl TokenBlacklist for MemoryTokenBlacklist {
    async fn revoke(&self, jti: &str, expires_at: Timestamp) -> Result<(), ApplicationError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
        if expires_at > now {
            entries.insert(jti.to_owned(), expires_at);
            debug!(jti, "token revoked");
        }
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, ApplicationError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(jti)
            .is_some_and(|expires_at| *expires_at > now))
    }
}

pub struct RedisTokenBlacklist {
    connection: ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisTokenBlacklist {
    pub async fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self, redis::RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("redis token blacklist connected");
        Ok(Self { connection, clock })
    }
}

fn redis_error(err: redis::RedisError) -> ApplicationError {
    ApplicationError::infrastructure(format!("token blacklist unavailable: {err}"))
}

#[async_trait]
impl TokenBlacklist for RedisTokenBlacklist {
    async fn revoke(&self, jti: &str, expires_at: Timestamp) -> Result<(), ApplicationError> {
        let ttl = (expires_at - self.clock.now()).num_seconds();
        if ttl <= 0 {
            debug!(jti, "token already expired, not revoking");
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(format!("{KEY_PREFIX}{jti}"), 1u8, ttl as u64)
            .await
            .map_err(redis_error)?;
        debug!(jti, ttl, "token revoked");
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, ApplicationError> {
        let mut connection = self.connection.clone();
        connection
            .exists(format!("{KEY_PREFIX}{jti}"))
            .await
            .map_err(redis_error)
    }
}
