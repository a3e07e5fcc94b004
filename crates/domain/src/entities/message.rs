//! 消息实体定义
//!
//! 消息创建后不可修改，按 (租户域, 房间) 隔离存储。

use serde::{Deserialize, Serialize};

use crate::value_objects::{MessageContent, MessageId, RoomId, TenantDomain, Timestamp, UserId};

/// 消息实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息唯一ID
    pub id: MessageId,
    /// 所属聊天室
    pub room_id: RoomId,
    /// 所属租户域
    pub domain: TenantDomain,
    pub author_id: UserId,
    pub author_email: String,
    /// 发送时作者的昵称快照
    pub nickname: String,
    pub content: String,
    /// 服务端时间戳
    pub timestamp: Timestamp,
}

impl Message {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        domain: TenantDomain,
        author_id: UserId,
        author_email: impl Into<String>,
        nickname: impl Into<String>,
        content: MessageContent,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            domain,
            author_id,
            author_email: author_email.into(),
            nickname: nickname.into(),
            content: content.into_inner(),
            timestamp,
        }
    }
}

/// 按时间升序排列（用于展示）
pub fn sort_ascending(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
}
