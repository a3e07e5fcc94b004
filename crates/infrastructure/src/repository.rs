use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ActiveUser, ChatRoom, ChatRoomRepository, ClaimOutcome, Message, MessageId, MessageRepository,
    Nickname, NicknameEntry, NicknameRepository, Post, PostId, PostRepository, PresenceRepository,
    Profile, ProfileRepository, Registration, RegistrationRepository, RepositoryError,
    RepositoryResult, RoomId, TenantDomain, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub async fn create_pg_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct ProfileRecord {
    id: Uuid,
    nickname: String,
    bio: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRecord> for Profile {
    type Error = RepositoryError;

    fn try_from(value: ProfileRecord) -> Result<Self, Self::Error> {
        let nickname = Nickname::parse(value.nickname).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Profile {
            id: UserId::from(value.id),
            nickname,
            bio: value.bio,
            email: value.email,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct NicknameRecord {
    nickname: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<NicknameRecord> for NicknameEntry {
    type Error = RepositoryError;

    fn try_from(value: NicknameRecord) -> Result<Self, Self::Error> {
        let nickname = Nickname::parse(value.nickname).map_err(|err| invalid_data(err.to_string()))?;
        Ok(NicknameEntry::new(
            nickname,
            UserId::from(value.owner_id),
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    domain: String,
    room_id: String,
    author_id: Uuid,
    author_email: String,
    nickname: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(value.id),
            room_id: RoomId::parse(value.room_id).map_err(|err| invalid_data(err.to_string()))?,
            domain: TenantDomain::parse(value.domain)
                .map_err(|err| invalid_data(err.to_string()))?,
            author_id: UserId::from(value.author_id),
            author_email: value.author_email,
            nickname: value.nickname,
            content: value.content,
            timestamp: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    domain: String,
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
}

impl TryFrom<RoomRecord> for ChatRoom {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        Ok(ChatRoom {
            id: RoomId::parse(value.id).map_err(|err| invalid_data(err.to_string()))?,
            domain: TenantDomain::parse(value.domain)
                .map_err(|err| invalid_data(err.to_string()))?,
            name: value.name,
            created_at: value.created_at,
            created_by: value.created_by.map(UserId::from),
        })
    }
}

#[derive(Debug, FromRow)]
struct PresenceRecord {
    user_id: Uuid,
    email: String,
    nickname: String,
    domain: String,
    last_active: DateTime<Utc>,
}

impl TryFrom<PresenceRecord> for ActiveUser {
    type Error = RepositoryError;

    fn try_from(value: PresenceRecord) -> Result<Self, Self::Error> {
        Ok(ActiveUser {
            user_id: UserId::from(value.user_id),
            email: value.email,
            nickname: value.nickname,
            domain: TenantDomain::parse(value.domain)
                .map_err(|err| invalid_data(err.to_string()))?,
            last_active: value.last_active,
        })
    }
}

#[derive(Debug, FromRow)]
struct RegistrationRecord {
    user_id: Uuid,
    email: String,
    domain: String,
    registered_at: DateTime<Utc>,
}

impl TryFrom<RegistrationRecord> for Registration {
    type Error = RepositoryError;

    fn try_from(value: RegistrationRecord) -> Result<Self, Self::Error> {
        Ok(Registration {
            user_id: UserId::from(value.user_id),
            email: value.email,
            domain: TenantDomain::parse(value.domain)
                .map_err(|err| invalid_data(err.to_string()))?,
            registered_at: value.registered_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PostRecord {
    id: Uuid,
    domain: String,
    author_id: Uuid,
    author_nickname: String,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
    likes: i32,
    liked_by: Vec<Uuid>,
}

impl TryFrom<PostRecord> for Post {
    type Error = RepositoryError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        let liked_by: BTreeSet<UserId> = value.liked_by.into_iter().map(UserId::from).collect();
        let likes = u32::try_from(value.likes).map_err(|err| invalid_data(err.to_string()))?;
        if likes as usize != liked_by.len() {
            return Err(invalid_data(format!(
                "post {} has likes={} but {} likers",
                value.id,
                likes,
                liked_by.len()
            )));
        }

        Ok(Post {
            id: PostId::from(value.id),
            domain: TenantDomain::parse(value.domain)
                .map_err(|err| invalid_data(err.to_string()))?,
            author_id: UserId::from(value.author_id),
            author_nickname: value.author_nickname,
            title: value.title,
            content: value.content,
            created_at: value.created_at,
            likes,
            liked_by,
        })
    }
}

const POST_COLUMNS: &str = r#"
    p.id, p.domain, p.author_id, p.author_nickname, p.title, p.content, p.created_at, p.likes,
    COALESCE(array_agg(l.user_id) FILTER (WHERE l.user_id IS NOT NULL), '{}') AS liked_by
"#;

#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"SELECT id, nickname, bio, email, created_at, updated_at FROM profiles WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Profile::try_from).transpose()
    }

    async fn find_by_nickname(&self, nickname: Nickname) -> RepositoryResult<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            r#"SELECT id, nickname, bio, email, created_at, updated_at FROM profiles WHERE nickname = $1"#,
        )
        .bind(nickname.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Profile::try_from).collect()
    }

    async fn upsert(&self, profile: Profile) -> RepositoryResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"
            INSERT INTO profiles (id, nickname, bio, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id)
            DO UPDATE SET nickname = EXCLUDED.nickname, bio = EXCLUDED.bio,
                          email = EXCLUDED.email, updated_at = EXCLUDED.updated_at
            RETURNING id, nickname, bio, email, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(profile.id))
        .bind(profile.nickname.as_str())
        .bind(&profile.bio)
        .bind(profile.email.as_deref())
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Profile::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgNicknameRepository {
    pool: PgPool,
}

impl PgNicknameRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NicknameRepository for PgNicknameRepository {
    async fn find(&self, nickname: Nickname) -> RepositoryResult<Option<NicknameEntry>> {
        let record = sqlx::query_as::<_, NicknameRecord>(
            r#"SELECT nickname, owner_id, created_at FROM nicknames WHERE nickname = $1"#,
        )
        .bind(nickname.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(NicknameEntry::try_from).transpose()
    }

    async fn claim(&self, entry: NicknameEntry) -> RepositoryResult<ClaimOutcome> {
        // 冲突时做一次空更新，让语句在行锁下返回当前持有者
        let owner: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO nicknames (nickname, owner_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (nickname) DO UPDATE SET owner_id = nicknames.owner_id
            RETURNING owner_id
            "#,
        )
        .bind(entry.nickname.as_str())
        .bind(Uuid::from(entry.owner_id))
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let owner_id = UserId::from(owner);
        if owner_id == entry.owner_id {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::Taken { owner_id })
        }
    }

    async fn release(&self, nickname: Nickname, owner_id: UserId) -> RepositoryResult<bool> {
        let result = sqlx::query(r#"DELETE FROM nicknames WHERE nickname = $1 AND owner_id = $2"#)
            .bind(nickname.as_str())
            .bind(Uuid::from(owner_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: Message) -> RepositoryResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, domain, room_id, author_id, author_email, nickname, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, domain, room_id, author_id, author_email, nickname, content, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.domain.as_str())
        .bind(message.room_id.as_str())
        .bind(Uuid::from(message.author_id))
        .bind(&message.author_email)
        .bind(&message.nickname)
        .bind(&message.content)
        .bind(message.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn latest(
        &self,
        domain: TenantDomain,
        room_id: RoomId,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, domain, room_id, author_id, author_email, nickname, content, created_at
            FROM messages
            WHERE domain = $1 AND room_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(domain.as_str())
        .bind(room_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Message::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn list(&self, domain: TenantDomain) -> RepositoryResult<Vec<ChatRoom>> {
        let records = sqlx::query_as::<_, RoomRecord>(
            r#"SELECT domain, id, name, created_at, created_by FROM chat_rooms WHERE domain = $1 ORDER BY created_at ASC"#,
        )
        .bind(domain.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ChatRoom::try_from).collect()
    }

    async fn save(&self, room: ChatRoom) -> RepositoryResult<ChatRoom> {
        let record = sqlx::query_as::<_, RoomRecord>(
            r#"
            INSERT INTO chat_rooms (domain, id, name, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (domain, id)
            DO UPDATE SET name = EXCLUDED.name, created_at = EXCLUDED.created_at,
                          created_by = EXCLUDED.created_by
            RETURNING domain, id, name, created_at, created_by
            "#,
        )
        .bind(room.domain.as_str())
        .bind(room.id.as_str())
        .bind(&room.name)
        .bind(room.created_at)
        .bind(room.created_by.map(Uuid::from))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatRoom::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn upsert(&self, presence: ActiveUser) -> RepositoryResult<ActiveUser> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            r#"
            INSERT INTO presence (user_id, email, nickname, domain, last_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id)
            DO UPDATE SET email = EXCLUDED.email, nickname = EXCLUDED.nickname,
                          domain = EXCLUDED.domain, last_active = EXCLUDED.last_active
            RETURNING user_id, email, nickname, domain, last_active
            "#,
        )
        .bind(Uuid::from(presence.user_id))
        .bind(&presence.email)
        .bind(&presence.nickname)
        .bind(presence.domain.as_str())
        .bind(presence.last_active)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ActiveUser::try_from(record)
    }

    async fn active_since(
        &self,
        domain: TenantDomain,
        since: Timestamp,
    ) -> RepositoryResult<Vec<ActiveUser>> {
        let records = sqlx::query_as::<_, PresenceRecord>(
            r#"
            SELECT user_id, email, nickname, domain, last_active
            FROM presence
            WHERE domain = $1 AND last_active > $2
            ORDER BY last_active DESC
            "#,
        )
        .bind(domain.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(ActiveUser::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgRegistrationRepository {
    pool: PgPool,
}

impl PgRegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationRepository for PgRegistrationRepository {
    async fn record(&self, registration: Registration) -> RepositoryResult<Registration> {
        let record = sqlx::query_as::<_, RegistrationRecord>(
            r#"
            INSERT INTO registrations (user_id, email, domain, registered_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET email = EXCLUDED.email, domain = EXCLUDED.domain,
                          registered_at = EXCLUDED.registered_at
            RETURNING user_id, email, domain, registered_at
            "#,
        )
        .bind(Uuid::from(registration.user_id))
        .bind(&registration.email)
        .bind(registration.domain.as_str())
        .bind(registration.registered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Registration::try_from(record)
    }

    async fn find_by_user(&self, user_id: UserId) -> RepositoryResult<Option<Registration>> {
        let record = sqlx::query_as::<_, RegistrationRecord>(
            "SELECT user_id, email, domain, registered_at FROM registrations WHERE user_id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Registration::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch<'e, E>(executor: E, id: PostId) -> RepositoryResult<Option<Post>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN post_likes l ON l.post_id = p.id \
             WHERE p.id = $1 GROUP BY p.id"
        );
        let record = sqlx::query_as::<_, PostRecord>(&query)
            .bind(Uuid::from(id))
            .fetch_optional(executor)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Post::try_from).transpose()
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn create(&self, post: Post) -> RepositoryResult<Post> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, domain, author_id, author_nickname, title, content, created_at, likes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(post.id))
        .bind(post.domain.as_str())
        .bind(Uuid::from(post.author_id))
        .bind(&post.author_nickname)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.created_at)
        .bind(post.liked_by.len() as i32)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for user_id in &post.liked_by {
            sqlx::query(r#"INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)"#)
                .bind(Uuid::from(post.id))
                .bind(Uuid::from(*user_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(post)
    }

    async fn find_by_id(&self, id: PostId) -> RepositoryResult<Option<Post>> {
        Self::fetch(&self.pool, id).await
    }

    async fn list_by_domain(&self, domain: TenantDomain) -> RepositoryResult<Vec<Post>> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts p LEFT JOIN post_likes l ON l.post_id = p.id \
             WHERE p.domain = $1 GROUP BY p.id ORDER BY p.created_at DESC"
        );
        let records = sqlx::query_as::<_, PostRecord>(&query)
            .bind(domain.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        records.into_iter().map(Post::try_from).collect()
    }

    async fn toggle_like(&self, id: PostId, user_id: UserId) -> RepositoryResult<Post> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 行锁保证同一帖子的切换串行执行
        let locked: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT id FROM posts WHERE id = $1 FOR UPDATE"#)
                .bind(Uuid::from(id))
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let removed = sqlx::query(r#"DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2"#)
            .bind(Uuid::from(id))
            .bind(Uuid::from(user_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        if removed.rows_affected() == 0 {
            sqlx::query(r#"INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)"#)
                .bind(Uuid::from(id))
                .bind(Uuid::from(user_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        sqlx::query(
            r#"UPDATE posts SET likes = (SELECT COUNT(*) FROM post_likes WHERE post_id = $1) WHERE id = $1"#,
        )
        .bind(Uuid::from(id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let post = Self::fetch(&mut *tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(post)
    }

    async fn delete(&self, id: PostId) -> RepositoryResult<()> {
        let result = sqlx::query(r#"DELETE FROM posts WHERE id = $1"#)
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// PostgreSQL 后端的全部仓储
#[derive(Clone)]
pub struct PgStorage {
    pub profile_repository: PgProfileRepository,
    pub nickname_repository: PgNicknameRepository,
    pub message_repository: PgMessageRepository,
    pub room_repository: PgChatRoomRepository,
    pub presence_repository: PgPresenceRepository,
    pub post_repository: PgPostRepository,
    pub registration_repository: PgRegistrationRepository,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            profile_repository: PgProfileRepository::new(pool.clone()),
            nickname_repository: PgNicknameRepository::new(pool.clone()),
            message_repository: PgMessageRepository::new(pool.clone()),
            room_repository: PgChatRoomRepository::new(pool.clone()),
            presence_repository: PgPresenceRepository::new(pool.clone()),
            post_repository: PgPostRepository::new(pool.clone()),
            registration_repository: PgRegistrationRepository::new(pool),
        }
    }
}
