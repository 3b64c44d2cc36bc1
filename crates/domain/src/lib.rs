//! 实时聊天与会议系统核心领域模型
//!
//! 包含用户、聊天室、消息等核心实体，认证声明，以及 WebSocket 协议事件定义。

pub mod auth;
pub mod errors;
pub mod message;
pub mod protocol;
pub mod room;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use auth::{AuthError, Claims, TokenType};
pub use errors::{StoreError, StoreResult};
pub use message::{ChatMessage, MessageWithAuthor};
pub use protocol::{ClientEvent, ConnectionStatus, MediaState, ServerEvent};
pub use room::{ChatRoom, RoomWithMembers};
pub use user::{Role, User};
pub use value_objects::{MessageId, RoomId, Timestamp, UserId};
