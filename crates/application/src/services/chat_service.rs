use std::sync::Arc;

use chrono::Duration;
use config::ChatConfig;
use domain::{
    message::sort_ascending, ActiveUser, ChatRoom, ChatRoomRepository, Message, MessageContent,
    MessageId, MessageRepository, PresenceRepository, RoomId, TenantDomain, UserId,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::{
    broadcaster::{ChangeBroadcaster, RoomChange},
    clock::Clock,
    error::ApplicationError,
    services::profile_service::ProfileService,
    session::AuthSession,
    state::ChatState,
    subscription::{MessageFeed, Subscription},
};

/// 查看自己时显示的名字
pub const SELF_DISPLAY_NAME: &str = "Me";
/// 无法解析昵称时显示的名字
pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub presence_repository: Arc<dyn PresenceRepository>,
    pub profile_service: Arc<ProfileService>,
    pub broadcaster: Arc<dyn ChangeBroadcaster>,
    pub clock: Arc<dyn Clock>,
    pub settings: ChatConfig,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    /// 订阅房间消息。
    ///
    /// 立即推送一次最新快照，之后房间每有变化就重新查询并推送。
    /// 读取失败时推送 `MessageFeed::Unavailable`，订阅本身继续有效。
    pub async fn subscribe_messages<F>(
        &self,
        session: &AuthSession,
        room_id: RoomId,
        callback: F,
    ) -> Result<Subscription, ApplicationError>
    where
        F: Fn(MessageFeed) + Send + Sync + 'static,
    {
        let user = session.require_user()?;
        let domain = session.tenant()?;

        // 先订阅变更再读快照，避免中间的消息丢失
        let mut changes = self.deps.broadcaster.subscribe();
        let repository = Arc::clone(&self.deps.message_repository);
        let limit = self.deps.settings.message_limit;

        info!(user_id = %user.id, domain = %domain, room_id = %room_id, "subscribing to room messages");

        let task = tokio::spawn(async move {
            callback(fetch_feed(repository.as_ref(), &domain, &room_id, limit).await);

            loop {
                match changes.recv().await {
                    Ok(change) if change.concerns(&domain, &room_id) => {
                        callback(fetch_feed(repository.as_ref(), &domain, &room_id, limit).await);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        // 快照是全量的，直接重新拉取即可
                        warn!(room_id = %room_id, skipped, "message subscription lagged");
                        callback(fetch_feed(repository.as_ref(), &domain, &room_id, limit).await);
                    }
                    Err(RecvError::Closed) => {
                        warn!(room_id = %room_id, "change feed closed");
                        callback(MessageFeed::Unavailable("change feed closed".to_string()));
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(task))
    }

    /// 订阅房间并把推送写入 `state.messages`
    pub async fn subscribe_into_state(
        &self,
        session: &AuthSession,
        room_id: RoomId,
        state: &ChatState,
    ) -> Result<Subscription, ApplicationError> {
        let state = state.clone();
        self.subscribe_messages(session, room_id, move |feed| state.publish_messages(feed))
            .await
    }

    /// 发送消息，作者昵称取自个人资料，时间戳由服务端时钟生成
    pub async fn send(
        &self,
        session: &AuthSession,
        room_id: RoomId,
        content: &str,
    ) -> Result<Message, ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;
        let content = MessageContent::new(content)?;
        let profile = self.deps.profile_service.load(&user).await?;

        let message = Message::new(
            MessageId::generate(),
            room_id.clone(),
            domain.clone(),
            user.id,
            user.email.clone(),
            profile.nickname.as_str(),
            content,
            self.deps.clock.now(),
        );

        let stored = self
            .deps
            .message_repository
            .append(message)
            .await
            .inspect_err(|err| {
                error!(domain = %domain, room_id = %room_id, error = %err, "failed to send message");
            })?;

        let change = RoomChange {
            domain: domain.clone(),
            room_id: room_id.clone(),
            message_id: stored.id,
        };
        // 消息已经落库，通知失败只影响实时推送
        if let Err(err) = self.deps.broadcaster.publish(change).await {
            warn!(room_id = %room_id, error = %err, "failed to publish room change");
        }

        debug!(message_id = %stored.id, room_id = %room_id, "message sent");
        Ok(stored)
    }

    /// 记录用户活动；未提供昵称时从个人资料读取
    pub async fn record_activity(
        &self,
        session: &AuthSession,
        nickname: Option<String>,
    ) -> Result<ActiveUser, ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;

        let nickname = match nickname.filter(|n| !n.trim().is_empty()) {
            Some(nickname) => nickname,
            None => self
                .deps
                .profile_service
                .load(&user)
                .await?
                .nickname
                .to_string(),
        };

        let presence = ActiveUser {
            user_id: user.id,
            email: user.email.clone(),
            nickname,
            domain,
            last_active: self.deps.clock.now(),
        };

        self.deps
            .presence_repository
            .upsert(presence)
            .await
            .inspect_err(|err| error!(user_id = %user.id, error = %err, "failed to record activity"))
            .map_err(ApplicationError::from)
    }

    /// 同域内最近活动过的用户，结果同时发布到 `state.active_users`
    pub async fn list_active_users(
        &self,
        session: &AuthSession,
        state: &ChatState,
    ) -> Result<Vec<ActiveUser>, ApplicationError> {
        let domain = session.tenant()?;
        let window = Duration::hours(self.deps.settings.active_window_hours);
        let since = self.deps.clock.now() - window;

        let users = self
            .deps
            .presence_repository
            .active_since(domain.clone(), since)
            .await
            .inspect_err(|err| error!(domain = %domain, error = %err, "failed to list active users"))?;

        state.publish_active_users(users.clone());
        Ok(users)
    }

    /// 列出房间；租户域还没有任何房间时创建默认的四个房间
    pub async fn list_rooms(&self, session: &AuthSession) -> Result<Vec<ChatRoom>, ApplicationError> {
        let domain = session.tenant()?;
        let rooms = self.deps.room_repository.list(domain.clone()).await?;
        if !rooms.is_empty() {
            return Ok(rooms);
        }

        self.create_default_rooms(&domain).await
    }

    async fn create_default_rooms(
        &self,
        domain: &TenantDomain,
    ) -> Result<Vec<ChatRoom>, ApplicationError> {
        let now = self.deps.clock.now();
        let mut created = Vec::new();
        for room in ChatRoom::defaults(domain, now) {
            created.push(self.deps.room_repository.save(room).await?);
        }
        info!(domain = %domain, count = created.len(), "created default rooms");
        Ok(created)
    }

    pub async fn create_room(
        &self,
        session: &AuthSession,
        room_id: &str,
        name: &str,
    ) -> Result<ChatRoom, ApplicationError> {
        let user = session.require_user()?;
        let domain = session.tenant()?;
        let room = ChatRoom::new(
            RoomId::parse(room_id)?,
            domain,
            name,
            Some(user.id),
            self.deps.clock.now(),
        )?;

        let stored = self.deps.room_repository.save(room).await?;
        info!(room_id = %stored.id, domain = %stored.domain, "room created");
        Ok(stored)
    }

    /// 切换当前房间
    pub fn select_room(&self, state: &ChatState, room_id: RoomId) -> bool {
        state.select_room(room_id)
    }

    /// 显示名：查看者本人返回 `SELF_DISPLAY_NAME`，否则为对方昵称，
    /// 缺少 uid、没有资料或读取失败时返回 `ANONYMOUS_DISPLAY_NAME`。
    pub async fn display_name(&self, uid: Option<UserId>, viewer: UserId) -> String {
        let Some(uid) = uid else {
            return ANONYMOUS_DISPLAY_NAME.to_string();
        };
        if uid == viewer {
            return SELF_DISPLAY_NAME.to_string();
        }

        match self.deps.profile_service.find(uid).await {
            Ok(Some(profile)) => profile.nickname.to_string(),
            Ok(None) => ANONYMOUS_DISPLAY_NAME.to_string(),
            Err(err) => {
                warn!(user_id = %uid, error = %err, "failed to resolve display name");
                ANONYMOUS_DISPLAY_NAME.to_string()
            }
        }
    }
}

async fn fetch_feed(
    repository: &dyn MessageRepository,
    domain: &TenantDomain,
    room_id: &RoomId,
    limit: u32,
) -> MessageFeed {
    match repository.latest(domain.clone(), room_id.clone(), limit).await {
        Ok(mut messages) => {
            sort_ascending(&mut messages);
            MessageFeed::Snapshot(messages)
        }
        Err(err) => {
            error!(domain = %domain, room_id = %room_id, error = %err, "failed to load messages");
            MessageFeed::Unavailable(err.to_string())
        }
    }
}
