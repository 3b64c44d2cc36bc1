use serde::{Deserialize, Serialize};

use crate::user::User;
use crate::value_objects::{RoomId, Timestamp, UserId};

/// 持久化的聊天室。
///
/// 不变量：host 永远是成员之一。普通用户最多属于一个与管理员对接的
/// 1:1 客服房间；管理员可能属于多个房间，必须显式指定房间 id。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub host_id: UserId,
    pub created_at: Timestamp,
}

/// 聊天室及其成员的联合读取模型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomWithMembers {
    pub room: ChatRoom,
    pub host: User,
    pub members: Vec<User>,
}

impl RoomWithMembers {
    /// host 以外的成员。
    pub fn guests(&self) -> impl Iterator<Item = &User> {
        let host_id = self.room.host_id;
        self.members.iter().filter(move |user| user.id != host_id)
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.iter().any(|user| user.id == user_id)
    }
}
