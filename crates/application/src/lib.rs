//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务（昵称索引、个人资料、聊天、帖子、认证），
//! 处理租户域隔离、输入校验，以及对外部适配器（身份服务、变更广播、令牌黑名单、时钟）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod identity;
pub mod local_broadcast;
pub mod services;
pub mod session;
pub mod state;
pub mod subscription;
pub mod token_blacklist;

pub use broadcaster::{BroadcastError, ChangeBroadcaster, RoomChange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use identity::{IdentityError, IdentityProvider};
pub use local_broadcast::LocalChangeBroadcaster;
pub use services::{
    AuthService, AuthServiceDependencies, ChatService, ChatServiceDependencies, NicknameChange,
    NicknameIndex, PostService, PostServiceDependencies, ProfileService,
    ProfileServiceDependencies, ANONYMOUS_DISPLAY_NAME, SELF_DISPLAY_NAME,
};
pub use session::AuthSession;
pub use state::ChatState;
pub use subscription::{MessageFeed, Subscription};
pub use token_blacklist::TokenBlacklist;
