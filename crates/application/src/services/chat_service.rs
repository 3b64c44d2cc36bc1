//! 聊天协调器
//!
//! 处理聊天室创建、惰性建房、消息落库与房间扇出。所有写操作都
//! 通过调用方传入的事务句柄进行；本服务不负责提交或回滚，
//! 确认帧由网关在事务完成之后发送。

use std::sync::Arc;

use domain::protocol::{
    CreateChatRoomPayload, MessagePayload, RoomCreatedPayload, RoomStub, SendMessagePayload,
    UserProjection,
};
use domain::{Role, RoomId, RoomWithMembers, ServerEvent, User, UserId};
use tracing::{debug, info, warn};

use crate::dto::RoomListItem;
use crate::error::ApplicationError;
use crate::registry::ConnectionRegistry;
use crate::room_bus::{chat_room_key, RoomBus};
use crate::store::ChatTx;

/// 聊天服务依赖注入
#[derive(Clone)]
pub struct ChatServiceDependencies {
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<RoomBus>,
}

pub struct ChatService {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<RoomBus>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            registry: deps.registry,
            bus: deps.bus,
        }
    }

    /// 显式创建聊天室。host 与全部 guests 必须都存在（全有或全无），
    /// 在线成员立即订阅房间，规范化的 roomCreated 负载返回给网关
    /// 在提交后回执给调用方。
    pub async fn create_chat_room(
        &self,
        tx: &mut dyn ChatTx,
        payload: CreateChatRoomPayload,
    ) -> Result<ServerEvent, ApplicationError> {
        let host_id = parse_user_id(&payload.host)?;
        let host = tx
            .find_user(host_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("user {host_id} not found")))?;

        let guests = self.resolve_all_guests(tx, &payload.guests).await?;

        let member_ids: Vec<UserId> = guests.iter().map(|user| user.id).collect();
        let room = tx.create_room(host.id, &member_ids).await?;
        info!(
            room_id = %room.room.id,
            host_id = %host.id,
            guest_count = guests.len(),
            "chat room created"
        );

        self.subscribe_online_members(&room).await;
        Ok(ServerEvent::RoomCreated(RoomCreatedPayload::from(&room)))
    }

    /// 落库一条消息并扇出到房间内其他成员。发送者不在扇出范围内，
    /// 改为收到网关在提交后回执的序列化消息。
    pub async fn create_message(
        &self,
        tx: &mut dyn ChatTx,
        sender_id: UserId,
        role: Role,
        payload: SendMessagePayload,
    ) -> Result<ServerEvent, ApplicationError> {
        let sender = tx
            .find_user(sender_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user not found"))?;

        let room = self
            .get_or_create_room(tx, &sender, role, payload.room_id)
            .await?;

        if !role.is_admin() && !room.is_member(sender_id) && room.room.host_id != sender_id {
            return Err(ApplicationError::protocol(format!(
                "user {sender_id} is not a member of room {}",
                room.room.id
            )));
        }

        let record = tx
            .insert_message(room.room.id, sender_id, &payload.message)
            .await?;
        let message = MessagePayload {
            id: record.id,
            author: UserProjection::from(&sender),
            message: record.message,
            chat_room: RoomStub { id: room.room.id },
            created_at: record.created_at,
        };

        let key = chat_room_key(room.room.id);
        match self.registry.resolve(sender_id).await {
            Some(handle) => {
                self.bus
                    .broadcast_except(
                        &key,
                        handle.conn_id(),
                        ServerEvent::SendMessage(message.clone()),
                    )
                    .await;
            }
            None => {
                // 发送方连接在处理途中消失，照常扇出给其余成员
                debug!(user_id = %sender_id, "sender has no live connection, broadcasting to all");
                self.bus
                    .broadcast(&key, ServerEvent::SendMessage(message.clone()))
                    .await;
            }
        }

        Ok(ServerEvent::SendMessage(message))
    }

    /// 解析消息要写入的房间。管理员必须显式给出 roomId；普通用户
    /// 省略时复用其唯一房间，没有则以系统管理员为 host 惰性创建。
    ///
    /// 并发的首条消息可能各自创建一间房（创建检查不在数据库层面
    /// 去重），读取路径对此有容忍，见集成测试。
    pub async fn get_or_create_room(
        &self,
        tx: &mut dyn ChatTx,
        user: &User,
        role: Role,
        requested: Option<RoomId>,
    ) -> Result<RoomWithMembers, ApplicationError> {
        if role.is_admin() {
            let room_id = requested
                .ok_or_else(|| ApplicationError::protocol("admin must specify roomId"))?;
            return tx
                .find_room(room_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found(format!("room {room_id} not found")));
        }

        if let Some(room_id) = requested {
            return tx
                .find_room(room_id)
                .await?
                .ok_or_else(|| ApplicationError::not_found(format!("room {room_id} not found")));
        }

        if let Some(room) = tx.find_room_of_member(user.id).await? {
            return Ok(room);
        }

        let admin = tx.find_admin_user().await?.ok_or_else(|| {
            warn!(user_id = %user.id, "lazy room creation failed: no admin user registered");
            ApplicationError::internal("no admin user registered")
        })?;

        let room = tx.create_room(admin.id, &[user.id]).await?;
        info!(room_id = %room.room.id, user_id = %user.id, admin_id = %admin.id, "lazy chat room created");

        let created = ServerEvent::RoomCreated(RoomCreatedPayload::from(&room));
        self.subscribe_online_members(&room).await;
        if let Some(handle) = self.registry.resolve(admin.id).await {
            handle.push(created.clone());
        }
        if let Some(handle) = self.registry.resolve(user.id).await {
            handle.push(created);
        }
        Ok(room)
    }

    /// 用户参与的房间列表，创建时间降序。
    pub async fn list_rooms_for_user(
        &self,
        tx: &mut dyn ChatTx,
        user_id: UserId,
    ) -> Result<Vec<RoomListItem>, ApplicationError> {
        let rooms = tx.list_rooms_for_user(user_id).await?;
        Ok(rooms.iter().map(RoomListItem::from).collect())
    }

    /// 房间内全部消息，创建时间升序。
    pub async fn list_messages(
        &self,
        tx: &mut dyn ChatTx,
        room_id: RoomId,
    ) -> Result<Vec<MessagePayload>, ApplicationError> {
        tx.find_room(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("room {room_id} not found")))?;
        let messages = tx.list_messages(room_id).await?;
        Ok(messages
            .iter()
            .map(|item| MessagePayload {
                id: item.message.id,
                author: UserProjection::from(&item.author),
                message: item.message.message.clone(),
                chat_room: RoomStub { id: room_id },
                created_at: item.message.created_at,
            })
            .collect())
    }

    /// 全有或全无地解析受邀成员，缺失的 id 一并列在错误里。
    async fn resolve_all_guests(
        &self,
        tx: &mut dyn ChatTx,
        guest_ids: &[UserId],
    ) -> Result<Vec<User>, ApplicationError> {
        let guests = tx.find_users(guest_ids).await?;
        if guests.len() != guest_ids.len() {
            let missing: Vec<String> = guest_ids
                .iter()
                .filter(|id| !guests.iter().any(|user| user.id == **id))
                .map(|id| id.to_string())
                .collect();
            return Err(ApplicationError::not_found(format!(
                "users not found: {}",
                missing.join(", ")
            )));
        }
        Ok(guests)
    }

    /// 把房间里当前在线的成员订阅到房间频道。
    async fn subscribe_online_members(&self, room: &RoomWithMembers) {
        let key = chat_room_key(room.room.id);
        if let Some(handle) = self.registry.resolve(room.room.host_id).await {
            self.bus.join(&key, &handle).await;
        }
        for member in &room.members {
            if let Some(handle) = self.registry.resolve(member.id).await {
                self.bus.join(&key, &handle).await;
            }
        }
    }
}

/// 线上协议里 host 字段是字符串形式的用户 id。
pub(crate) fn parse_user_id(raw: &str) -> Result<UserId, ApplicationError> {
    raw.parse::<i64>()
        .map(UserId)
        .map_err(|_| ApplicationError::protocol(format!("invalid user id: {raw:?}")))
}
