//! Repository接口定义
//!
//! 定义数据访问层的抽象接口，内层定义接口，外层（内存文档库、PostgreSQL）实现接口。

use crate::errors::RepositoryError;

pub mod chatroom_repository;
pub mod message_repository;
pub mod nickname_repository;
pub mod post_repository;
pub mod presence_repository;
pub mod profile_repository;
pub mod registration_repository;

// 重新导出所有Repository特征
pub use chatroom_repository::ChatRoomRepository;
pub use message_repository::MessageRepository;
pub use nickname_repository::NicknameRepository;
pub use post_repository::PostRepository;
pub use presence_repository::PresenceRepository;
pub use profile_repository::ProfileRepository;
pub use registration_repository::RegistrationRepository;

#[cfg(feature = "testing")]
pub use chatroom_repository::MockChatRoomRepository;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use nickname_repository::MockNicknameRepository;
#[cfg(feature = "testing")]
pub use post_repository::MockPostRepository;
#[cfg(feature = "testing")]
pub use presence_repository::MockPresenceRepository;
#[cfg(feature = "testing")]
pub use profile_repository::MockProfileRepository;
#[cfg(feature = "testing")]
pub use registration_repository::MockRegistrationRepository;

pub type RepositoryResult<T> = Result<T, RepositoryError>;
