//! 工作区聊天系统核心领域模型
//!
//! 包含租户域、个人资料、昵称索引、消息、聊天室、在线状态、帖子等实体，
//! 以及数据访问层的抽象接口。

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use value_objects::*;
