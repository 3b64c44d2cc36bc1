//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：连接注册表、房间广播总线、
//! 以工作单元为边界的存储抽象，以及聊天/会议两个协调器。

pub mod dto;
pub mod error;
pub mod registry;
pub mod room_bus;
pub mod services;
pub mod store;

pub use dto::RoomListItem;
pub use error::ApplicationError;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use room_bus::{chat_room_key, RoomBus};
pub use services::{
    ChatService, ChatServiceDependencies, ConferenceService, ConferenceServiceDependencies,
};
pub use store::{ChatTx, ChatUnitOfWork};
