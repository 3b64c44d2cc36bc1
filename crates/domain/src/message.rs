use serde::{Deserialize, Serialize};

use crate::user::User;
use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 持久化的聊天消息。创建后不可变，按创建时间升序排序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub message: String,
    pub created_at: Timestamp,
}

/// 消息及其作者的联合读取模型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWithAuthor {
    pub message: ChatMessage,
    pub author: User,
}
