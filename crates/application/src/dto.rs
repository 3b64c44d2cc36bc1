//! HTTP 查询接口的响应结构

use domain::protocol::UserProjection;
use domain::{RoomId, RoomWithMembers, Timestamp};
use serde::Serialize;

/// 房间列表条目，携带主持人和完整成员投影。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListItem {
    pub id: RoomId,
    pub created_at: Timestamp,
    pub host: UserProjection,
    pub members: Vec<UserProjection>,
}

impl From<&RoomWithMembers> for RoomListItem {
    fn from(value: &RoomWithMembers) -> Self {
        Self {
            id: value.room.id,
            created_at: value.room.created_at,
            host: UserProjection::from(&value.host),
            members: value.members.iter().map(UserProjection::from).collect(),
        }
    }
}
