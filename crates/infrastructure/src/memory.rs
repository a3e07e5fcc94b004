//! 进程内文档库
//!
//! 每个集合一把 `RwLock`。昵称抢占和点赞切换都在一次写锁内完成检查和写入，
//! 因此是原子的。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    ActiveUser, ChatRoom, ChatRoomRepository, ClaimOutcome, Message, MessageRepository, Nickname,
    NicknameEntry, NicknameRepository, Post, PostId, PostRepository, PresenceRepository, Profile,
    ProfileRepository, Registration, RegistrationRepository, RepositoryError, RepositoryResult,
    RoomId, TenantDomain, Timestamp, UserId,
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<UserId, Profile>>,
    nicknames: RwLock<HashMap<Nickname, NicknameEntry>>,
    messages: RwLock<HashMap<(TenantDomain, RoomId), Vec<Message>>>,
    rooms: RwLock<HashMap<TenantDomain, Vec<ChatRoom>>>,
    presence: RwLock<HashMap<UserId, ActiveUser>>,
    posts: RwLock<HashMap<PostId, Post>>,
    registrations: RwLock<HashMap<UserId, Registration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 删除 `before` 之前的在线记录，返回删除条数。
    /// 读取本来就按时间窗口过滤，这里只用于回收空间。
    pub async fn prune_presence(&self, before: Timestamp) -> usize {
        let mut presence = self.presence.write().await;
        let initial = presence.len();
        presence.retain(|_, user| user.active_after(before));
        let removed = initial - presence.len();
        if removed > 0 {
            debug!(removed, "pruned stale presence records");
        }
        removed
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn find_by_nickname(&self, nickname: Nickname) -> RepositoryResult<Vec<Profile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .filter(|profile| profile.nickname == nickname)
            .cloned()
            .collect())
    }

    async fn upsert(&self, profile: Profile) -> RepositoryResult<Profile> {
        self.profiles
            .write()
            .await
            .insert(profile.id, profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl NicknameRepository for MemoryStore {
    async fn find(&self, nickname: Nickname) -> RepositoryResult<Option<NicknameEntry>> {
        Ok(self.nicknames.read().await.get(&nickname).cloned())
    }

    async fn claim(&self, entry: NicknameEntry) -> RepositoryResult<ClaimOutcome> {
        let mut nicknames = self.nicknames.write().await;
        if let Some(existing) = nicknames.get(&entry.nickname) {
            if !existing.is_owned_by(entry.owner_id) {
                return Ok(ClaimOutcome::Taken {
                    owner_id: existing.owner_id,
                });
            }
        }
        nicknames.insert(entry.nickname.clone(), entry);
        Ok(ClaimOutcome::Claimed)
    }

    async fn release(&self, nickname: Nickname, owner_id: UserId) -> RepositoryResult<bool> {
        let mut nicknames = self.nicknames.write().await;
        let owned = nicknames
            .get(&nickname)
            .is_some_and(|entry| entry.is_owned_by(owner_id));
        if owned {
            nicknames.remove(&nickname);
        }
        Ok(owned)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn append(&self, message: Message) -> RepositoryResult<Message> {
        let key = (message.domain.clone(), message.room_id.clone());
        self.messages
            .write()
            .await
            .entry(key)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn latest(
        &self,
        domain: TenantDomain,
        room_id: RoomId,
        limit: u32,
    ) -> RepositoryResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let Some(room) = messages.get(&(domain, room_id)) else {
            return Ok(Vec::new());
        };

        let mut latest = room.clone();
        latest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        latest.truncate(limit as usize);
        Ok(latest)
    }
}

#[async_trait]
impl ChatRoomRepository for MemoryStore {
    async fn list(&self, domain: TenantDomain) -> RepositoryResult<Vec<ChatRoom>> {
        let rooms = self.rooms.read().await;
        let mut listed = rooms.get(&domain).cloned().unwrap_or_default();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listed)
    }

    async fn save(&self, room: ChatRoom) -> RepositoryResult<ChatRoom> {
        let mut rooms = self.rooms.write().await;
        let domain_rooms = rooms.entry(room.domain.clone()).or_default();
        match domain_rooms.iter_mut().find(|existing| existing.id == room.id) {
            Some(existing) => *existing = room.clone(),
            None => domain_rooms.push(room.clone()),
        }
        Ok(room)
    }
}

#[async_trait]
impl PresenceRepository for MemoryStore {
    async fn upsert(&self, presence: ActiveUser) -> RepositoryResult<ActiveUser> {
        self.presence
            .write()
            .await
            .insert(presence.user_id, presence.clone());
        Ok(presence)
    }

    async fn active_since(
        &self,
        domain: TenantDomain,
        since: Timestamp,
    ) -> RepositoryResult<Vec<ActiveUser>> {
        let presence = self.presence.read().await;
        let mut active: Vec<ActiveUser> = presence
            .values()
            .filter(|user| user.domain == domain && user.active_after(since))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(active)
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn record(&self, registration: Registration) -> RepositoryResult<Registration> {
        self.registrations
            .write()
            .await
            .insert(registration.user_id, registration.clone());
        Ok(registration)
    }

    async fn find_by_user(&self, user_id: UserId) -> RepositoryResult<Option<Registration>> {
        Ok(self.registrations.read().await.get(&user_id).cloned())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create(&self, post: Post) -> RepositoryResult<Post> {
        let mut posts = self.posts.write().await;
        if posts.contains_key(&post.id) {
            return Err(RepositoryError::Conflict);
        }
        posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: PostId) -> RepositoryResult<Option<Post>> {
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn list_by_domain(&self, domain: TenantDomain) -> RepositoryResult<Vec<Post>> {
        let posts = self.posts.read().await;
        let mut listed: Vec<Post> = posts
            .values()
            .filter(|post| post.domain == domain)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn toggle_like(&self, id: PostId, user_id: UserId) -> RepositoryResult<Post> {
        let mut posts = self.posts.write().await;
        let post = posts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        post.toggle_like(user_id);
        Ok(post.clone())
    }

    async fn delete(&self, id: PostId) -> RepositoryResult<()> {
        self.posts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::{MessageContent, MessageId};
    use std::sync::Arc;
    use uuid::Uuid;

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    fn domain(value: &str) -> TenantDomain {
        TenantDomain::parse(value).unwrap()
    }

    #[tokio::test]
    async fn claim_is_exclusive_per_nickname() {
        let store = MemoryStore::new();
        let nickname = Nickname::parse("QuietOtter").unwrap();
        let (alice, bob) = (user(), user());

        let first = store
            .claim(NicknameEntry::new(nickname.clone(), alice, Utc::now()))
            .await
            .unwrap();
        let second = store
            .claim(NicknameEntry::new(nickname.clone(), bob, Utc::now()))
            .await
            .unwrap();
        let again = store
            .claim(NicknameEntry::new(nickname.clone(), alice, Utc::now()))
            .await
            .unwrap();

        assert_eq!(first, ClaimOutcome::Claimed);
        assert_eq!(second, ClaimOutcome::Taken { owner_id: alice });
        assert_eq!(again, ClaimOutcome::Claimed);

        assert!(!store.release(nickname.clone(), bob).await.unwrap());
        assert!(store.release(nickname.clone(), alice).await.unwrap());
        assert!(store.find(nickname).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let nickname = Nickname::parse("Contested").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let entry = NicknameEntry::new(nickname.clone(), user(), Utc::now());
                tokio::spawn(async move { store.claim(entry).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_claimed() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn latest_returns_newest_first_with_limit() {
        let store = MemoryStore::new();
        let co = domain("co.com");
        let start = Utc::now();
        for i in 0..5 {
            let message = Message::new(
                MessageId::generate(),
                RoomId::general(),
                co.clone(),
                user(),
                "a@co.com",
                "QuietOtter",
                MessageContent::new(format!("m{i}")).unwrap(),
                start + Duration::seconds(i),
            );
            store.append(message).await.unwrap();
        }

        let latest = store.latest(co.clone(), RoomId::general(), 3).await.unwrap();
        let contents: Vec<&str> = latest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);

        let other = store
            .latest(domain("other.com"), RoomId::general(), 3)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn concurrent_likes_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let post = Post::new(
            PostId::generate(),
            domain("co.com"),
            user(),
            "QuietOtter",
            "Title",
            "Body",
            Utc::now(),
        )
        .unwrap();
        let id = post.id;
        store.create(post).await.unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.toggle_like(id, user()).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = PostRepository::find_by_id(store.as_ref(), id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.likes, 20);
        assert_eq!(stored.liked_by.len(), 20);
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let store = MemoryStore::new();
        let id = PostId::generate();
        assert_eq!(
            store.toggle_like(id, user()).await.unwrap_err(),
            RepositoryError::NotFound
        );
        assert_eq!(store.delete(id).await.unwrap_err(), RepositoryError::NotFound);
    }

    #[tokio::test]
    async fn prune_removes_only_stale_presence() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let co = domain("co.com");
        for (offset, email) in [(1, "fresh@co.com"), (48, "stale@co.com")] {
            PresenceRepository::upsert(
                &store,
                ActiveUser {
                    user_id: user(),
                    email: email.to_string(),
                    nickname: "QuietOtter".to_string(),
                    domain: co.clone(),
                    last_active: now - Duration::hours(offset),
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(store.prune_presence(now - Duration::hours(24)).await, 1);
        let remaining = store.active_since(co, now - Duration::hours(100)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].email, "fresh@co.com");
    }
}
