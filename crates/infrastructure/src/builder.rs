use std::{sync::Arc, time::Duration};

use application::{
    AuthService, AuthServiceDependencies, ChangeBroadcaster, ChatService, ChatServiceDependencies,
    Clock, LocalChangeBroadcaster, NicknameIndex, PostService, PostServiceDependencies,
    ProfileService, ProfileServiceDependencies, SystemClock, TokenBlacklist,
};
use config::{AppConfig, AuthConfig, ChatConfig, StorageBackend};
use domain::{
    ChatRoomRepository, MessageRepository, NicknameRepository, PostRepository, PresenceRepository,
    ProfileRepository, RegistrationRepository,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{
    identity::MemoryIdentityProvider,
    memory::MemoryStore,
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    redis_broadcast::RedisChangeBroadcaster,
    repository::{create_pg_pool, PgStorage},
    token_blacklist::{MemoryTokenBlacklist, RedisTokenBlacklist},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// 各仓储端口的具体实现
#[derive(Clone)]
pub struct Repositories {
    pub profiles: Arc<dyn ProfileRepository>,
    pub nicknames: Arc<dyn NicknameRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub presence: Arc<dyn PresenceRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub registrations: Arc<dyn RegistrationRepository>,
}

impl Repositories {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            profiles: store.clone(),
            nicknames: store.clone(),
            messages: store.clone(),
            rooms: store.clone(),
            presence: store.clone(),
            posts: store.clone(),
            registrations: store,
        }
    }

    pub fn postgres(storage: PgStorage) -> Self {
        Self {
            profiles: Arc::new(storage.profile_repository),
            nicknames: Arc::new(storage.nickname_repository),
            messages: Arc::new(storage.message_repository),
            rooms: Arc::new(storage.room_repository),
            presence: Arc::new(storage.presence_repository),
            posts: Arc::new(storage.post_repository),
            registrations: Arc::new(storage.registration_repository),
        }
    }
}

/// 组装好的应用服务
#[derive(Clone)]
pub struct Infrastructure {
    pub profile_service: Arc<ProfileService>,
    pub chat_service: Arc<ChatService>,
    pub post_service: Arc<PostService>,
    pub auth_service: Arc<AuthService>,
    pub identity: Arc<MemoryIdentityProvider>,
    pub broadcaster: Arc<dyn ChangeBroadcaster>,
    pub token_blacklist: Arc<dyn TokenBlacklist>,
    pub clock: Arc<dyn Clock>,
    /// 仅内存后端有值
    pub memory_store: Option<Arc<MemoryStore>>,
    settings: ChatConfig,
}

fn identity_provider(auth: &AuthConfig, clock: Arc<dyn Clock>) -> MemoryIdentityProvider {
    MemoryIdentityProvider::new(
        Arc::new(BcryptPasswordHasher::new(auth.bcrypt_cost)),
        clock,
        chrono::Duration::minutes(auth.lockout_minutes),
    )
}

impl Infrastructure {
    /// 按配置连接存储和 Redis 并组装服务
    pub async fn from_config(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (repositories, memory_store) = match config.storage.backend {
            StorageBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                (Repositories::memory(store.clone()), Some(store))
            }
            StorageBackend::Postgres => {
                let pool =
                    create_pg_pool(&config.storage.database_url, config.storage.max_connections)
                        .await?;
                MIGRATOR.run(&pool).await?;
                info!("database migrations applied");
                (Repositories::postgres(PgStorage::new(pool)), None)
            }
        };

        let (broadcaster, token_blacklist): (Arc<dyn ChangeBroadcaster>, Arc<dyn TokenBlacklist>) =
            match &config.redis.url {
                Some(url) => (
                    Arc::new(RedisChangeBroadcaster::connect(url, &config.redis.channel).await?),
                    Arc::new(RedisTokenBlacklist::connect(url, clock.clone()).await?),
                ),
                None => (
                    Arc::new(LocalChangeBroadcaster::default()),
                    Arc::new(MemoryTokenBlacklist::new(clock.clone())),
                ),
            };

        let identity = Arc::new(identity_provider(&config.auth, clock.clone()));

        let mut infrastructure = Self::assemble(
            repositories,
            broadcaster,
            identity,
            clock,
            config.chat.clone(),
        );
        infrastructure.token_blacklist = token_blacklist;
        infrastructure.memory_store = memory_store;
        Ok(infrastructure)
    }

    /// 全内存组装，测试时可以注入时钟
    pub fn in_memory(settings: ChatConfig, auth: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut infrastructure = Self::assemble(
            Repositories::memory(store.clone()),
            Arc::new(LocalChangeBroadcaster::default()),
            Arc::new(identity_provider(auth, clock.clone())),
            clock,
            settings,
        );
        infrastructure.memory_store = Some(store);
        infrastructure
    }

    pub fn assemble(
        repositories: Repositories,
        broadcaster: Arc<dyn ChangeBroadcaster>,
        identity: Arc<MemoryIdentityProvider>,
        clock: Arc<dyn Clock>,
        settings: ChatConfig,
    ) -> Self {
        let nickname_index = Arc::new(NicknameIndex::new(
            repositories.nicknames.clone(),
            repositories.profiles.clone(),
            clock.clone(),
            settings.nickname_attempts,
        ));

        let profile_service = Arc::new(ProfileService::new(ProfileServiceDependencies {
            profile_repository: repositories.profiles.clone(),
            nickname_index,
            clock: clock.clone(),
        }));

        let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
            room_repository: repositories.rooms.clone(),
            message_repository: repositories.messages.clone(),
            presence_repository: repositories.presence.clone(),
            profile_service: profile_service.clone(),
            broadcaster: broadcaster.clone(),
            clock: clock.clone(),
            settings: settings.clone(),
        }));

        let post_service = Arc::new(PostService::new(PostServiceDependencies {
            post_repository: repositories.posts.clone(),
            profile_service: profile_service.clone(),
            clock: clock.clone(),
        }));

        let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
            identity_provider: identity.clone(),
            profile_service: profile_service.clone(),
            registration_repository: repositories.registrations.clone(),
            clock: clock.clone(),
        }));

        Self {
            profile_service,
            chat_service,
            post_service,
            auth_service,
            identity,
            broadcaster,
            token_blacklist: Arc::new(MemoryTokenBlacklist::new(clock.clone())),
            clock,
            memory_store: None,
            settings,
        }
    }

    /// 内存后端定期清理超出在线窗口的记录；PostgreSQL 后端返回 `None`
    pub fn spawn_presence_pruner(&self, every: Duration) -> Option<JoinHandle<()>> {
        let store = self.memory_store.clone()?;
        let clock = self.clock.clone();
        let window = chrono::Duration::hours(self.settings.active_window_hours);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                store.prune_presence(clock.now() - window).await;
            }
        }))
    }
}
