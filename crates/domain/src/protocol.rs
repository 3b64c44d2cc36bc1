//! WebSocket 协议事件定义
//!
//! 双向 JSON 帧，形如 `{"event": "...", "data": {...}}`。入站负载启用
//! `deny_unknown_fields`，在边界处做严格校验；历史上的字段漂移
//! （`room` / `roomId`、数字型 roomCreated）统一到这一套规范模式。

use serde::{Deserialize, Serialize};

use crate::room::RoomWithMembers;
use crate::user::{Role, User};
use crate::value_objects::{MessageId, RoomId, Timestamp, UserId};

/// 连接生命周期状态机。
///
/// `Connecting → Authenticated → Subscribed → Closed`，验证失败进入终态
/// `Rejected`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Authenticated,
    Subscribed,
    Closed,
    Rejected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Authenticated => "authenticated",
            ConnectionStatus::Subscribed => "subscribed",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Rejected => "rejected",
        };
        write!(f, "{name}")
    }
}

/// 客户端入站事件。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    CreateChatRoom(CreateChatRoomPayload),
    SendMessage(SendMessagePayload),
    CreateConferenceRoom(CreateConferencePayload),
    JoinConferenceRoom(JoinConferencePayload),
    SendOffer(OfferPayload),
    SendAnswer(AnswerPayload),
    SendIceCandidate(IceCandidatePayload),
    SendMediaState(MediaStatePayload),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateChatRoomPayload {
    /// host 用户 id，线上协议历史原因为字符串
    pub host: String,
    pub guests: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessagePayload {
    /// 管理员必填；普通用户省略时走惰性房间解析
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateConferencePayload {
    /// 调用方提供的会议房间令牌
    pub room_id: String,
    pub host: String,
    pub guests: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinConferencePayload {
    pub room_id: String,
    pub host: String,
}

/// 对等信令中转负载。SDP / ICE 结构不做校验，原样转发。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OfferPayload {
    pub room_id: String,
    pub offer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnswerPayload {
    pub room_id: String,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IceCandidatePayload {
    pub room_id: String,
    pub candidate: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaStatePayload {
    pub room_id: String,
    pub media_state: MediaState,
}

/// 摄像头/麦克风开关状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MediaState {
    pub camera_on: bool,
    pub mic_on: bool,
}

/// 服务端出站事件。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    RoomCreated(RoomCreatedPayload),
    SendMessage(MessagePayload),
    #[serde(rename_all = "camelCase")]
    ConferenceInvitation {
        host: UserProjection,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        message: String,
        join_user: UserProjection,
    },
    Offer(serde_json::Value),
    Answer(serde_json::Value),
    #[serde(rename = "icecandidate")]
    IceCandidate(serde_json::Value),
    MediaState(serde_json::Value),
    Error {
        message: String,
    },
}

/// 清洗后的用户投影，密码永远不出现在这里。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProjection {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub profile: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
}

impl From<&User> for UserProjection {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            profile: user.profile.clone(),
            role: user.role,
            phone: user.phone.clone(),
        }
    }
}

/// roomCreated 的规范负载（取代旧版只发数字 id 的变体）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreatedPayload {
    pub id: RoomId,
    pub created_at: Timestamp,
    pub host: UserProjection,
    pub guests: Vec<UserProjection>,
}

impl From<&RoomWithMembers> for RoomCreatedPayload {
    fn from(value: &RoomWithMembers) -> Self {
        Self {
            id: value.room.id,
            created_at: value.room.created_at,
            host: UserProjection::from(&value.host),
            guests: value.guests().map(UserProjection::from).collect(),
        }
    }
}

/// 聊天室 stub，只带 id。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoomStub {
    pub id: RoomId,
}

/// 序列化后的消息（作者投影 + chatRoom stub）。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub author: UserProjection,
    pub message: String,
    pub chat_room: RoomStub,
    pub created_at: Timestamp,
}
