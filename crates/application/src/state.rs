//! 聊天界面的响应式状态容器
//!
//! 由调用方显式创建并传递，生命周期跟随持有者，不使用全局单例。

use std::sync::Arc;

use domain::{ActiveUser, RoomId};
use tokio::sync::watch;

use crate::subscription::MessageFeed;

#[derive(Clone)]
pub struct ChatState {
    inner: Arc<Inner>,
}

struct Inner {
    messages: watch::Sender<MessageFeed>,
    active_users: watch::Sender<Vec<ActiveUser>>,
    current_room: watch::Sender<RoomId>,
}

impl ChatState {
    pub fn new(initial_room: RoomId) -> Self {
        let (messages, _) = watch::channel(MessageFeed::default());
        let (active_users, _) = watch::channel(Vec::new());
        let (current_room, _) = watch::channel(initial_room);

        Self {
            inner: Arc::new(Inner {
                messages,
                active_users,
                current_room,
            }),
        }
    }

    pub fn messages(&self) -> watch::Receiver<MessageFeed> {
        self.inner.messages.subscribe()
    }

    pub fn active_users(&self) -> watch::Receiver<Vec<ActiveUser>> {
        self.inner.active_users.subscribe()
    }

    pub fn current_room(&self) -> watch::Receiver<RoomId> {
        self.inner.current_room.subscribe()
    }

    pub fn current_room_id(&self) -> RoomId {
        self.inner.current_room.borrow().clone()
    }

    pub fn publish_messages(&self, feed: MessageFeed) {
        self.inner.messages.send_replace(feed);
    }

    pub fn publish_active_users(&self, users: Vec<ActiveUser>) {
        self.inner.active_users.send_replace(users);
    }

    /// 切换房间，返回房间是否真的变了；切换后旧房间的消息被清空
    pub fn select_room(&self, room_id: RoomId) -> bool {
        let changed = self.inner.current_room.send_if_modified(|current| {
            if *current == room_id {
                return false;
            }
            *current = room_id;
            true
        });
        if changed {
            self.inner.messages.send_replace(MessageFeed::default());
        }
        changed
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new(RoomId::general())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_room_is_general() {
        let state = ChatState::default();
        assert_eq!(state.current_room_id().as_str(), "general");
    }

    #[tokio::test]
    async fn select_room_notifies_and_resets_messages() {
        let state = ChatState::default();
        let mut room_rx = state.current_room();
        state.publish_messages(MessageFeed::Unavailable("offline".into()));

        assert!(!state.select_room(RoomId::parse("general").unwrap()));
        assert!(state.select_room(RoomId::parse("random").unwrap()));

        room_rx.changed().await.unwrap();
        assert_eq!(room_rx.borrow().as_str(), "random");
        assert_eq!(*state.messages().borrow(), MessageFeed::default());
    }
}
