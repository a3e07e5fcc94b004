pub mod auth_service;
pub mod chat_service;
pub mod nickname_index;
pub mod post_service;
pub mod profile_service;

pub use auth_service::{AuthService, AuthServiceDependencies};
pub use chat_service::{
    ChatService, ChatServiceDependencies, ANONYMOUS_DISPLAY_NAME, SELF_DISPLAY_NAME,
};
pub use nickname_index::NicknameIndex;
pub use post_service::{PostService, PostServiceDependencies};
pub use profile_service::{NicknameChange, ProfileService, ProfileServiceDependencies};
