//! 领域实体定义
//!
//! 包含系统的核心实体：身份用户、个人资料、昵称索引、消息、聊天室、在线状态、帖子。

pub mod chatroom;
pub mod message;
pub mod nickname;
pub mod post;
pub mod presence;
pub mod profile;
pub mod registration;
pub mod user;

// 重新导出核心实体
pub use chatroom::ChatRoom;
pub use message::Message;
pub use nickname::{ClaimOutcome, NicknameEntry};
pub use post::Post;
pub use presence::ActiveUser;
pub use profile::{Profile, ProfileUpdate};
pub use registration::Registration;
pub use user::AuthUser;
