//! 基础设施层实现。
//!
//! 提供内存文档库与 PostgreSQL 两套仓储、进程内身份服务、密码哈希、
//! Redis 变更广播、令牌黑名单等适配器，并负责按配置组装应用服务。

pub mod builder;
pub mod identity;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod redis_broadcast;
pub mod repository;
pub mod token_blacklist;

pub use builder::{Infrastructure, InfrastructureError, Repositories};
pub use identity::MemoryIdentityProvider;
pub use memory::MemoryStore;
pub use migrations::MIGRATOR;
pub use password::{BcryptPasswordHasher, PasswordError, PasswordHasher, StoredPassword};
pub use redis_broadcast::RedisChangeBroadcaster;
pub use repository::{
    create_pg_pool, PgChatRoomRepository, PgMessageRepository, PgNicknameRepository,
    PgPostRepository, PgPresenceRepository, PgProfileRepository, PgRegistrationRepository,
    PgStorage,
};
pub use token_blacklist::{MemoryTokenBlacklist, RedisTokenBlacklist};
