//! 会议协调器
//!
//! 会议房间是瞬态的：只存在于进程内的房间总线上，以调用方提供的
//! 令牌作为键，不落库。成员校验（全有或全无）发生在任何 join
//! 副作用之前，校验失败时调用方不会停留在半加入状态。

use std::sync::Arc;

use domain::protocol::{
    AnswerPayload, CreateConferencePayload, IceCandidatePayload, JoinConferencePayload,
    MediaStatePayload, OfferPayload, UserProjection,
};
use domain::{ServerEvent, User, UserId};
use tracing::{debug, info};

use crate::error::ApplicationError;
use crate::registry::ConnectionRegistry;
use crate::room_bus::RoomBus;
use crate::services::chat_service::parse_user_id;
use crate::store::ChatTx;

/// 会议服务依赖注入
#[derive(Clone)]
pub struct ConferenceServiceDependencies {
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<RoomBus>,
}

pub struct ConferenceService {
    registry: Arc<ConnectionRegistry>,
    bus: Arc<RoomBus>,
}

impl ConferenceService {
    pub fn new(deps: ConferenceServiceDependencies) -> Self {
        Self {
            registry: deps.registry,
            bus: deps.bus,
        }
    }

    /// 创建会议房间。host 与全部 guests 先行校验，随后调用方加入
    /// 房间频道，在线的受邀成员收到 conferenceInvitation。
    pub async fn create_room(
        &self,
        tx: &mut dyn ChatTx,
        caller_id: UserId,
        payload: CreateConferencePayload,
    ) -> Result<ServerEvent, ApplicationError> {
        let host_id = parse_user_id(&payload.host)?;
        let host = tx
            .find_user(host_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("user {host_id} not found")))?;
        let guests = self.resolve_all_guests(tx, &payload.guests).await?;

        if let Some(handle) = self.registry.resolve(caller_id).await {
            self.bus.join(&payload.room_id, &handle).await;
        }
        info!(
            room_id = %payload.room_id,
            host_id = %host.id,
            guest_count = guests.len(),
            "conference room created"
        );

        let invitation = ServerEvent::ConferenceInvitation {
            host: UserProjection::from(&host),
            room_id: payload.room_id.clone(),
        };
        let mut delivered = 0usize;
        for guest in &guests {
            if let Some(handle) = self.registry.resolve(guest.id).await {
                handle.push(invitation.clone());
                delivered += 1;
            }
        }
        debug!(
            room_id = %payload.room_id,
            invited = guests.len(),
            delivered,
            "conference invitations dispatched"
        );

        Ok(invitation)
    }

    /// 加入会议房间。加入者收到确认，房间内其余成员收到 userJoined。
    pub async fn join_room(
        &self,
        tx: &mut dyn ChatTx,
        caller_id: UserId,
        payload: JoinConferencePayload,
    ) -> Result<ServerEvent, ApplicationError> {
        let caller = tx
            .find_user(caller_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user not found"))?;
        // host 字段用来定位邀请方，必须是合法的用户 id
        let host_id = parse_user_id(&payload.host)?;
        tx.find_user(host_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("user {host_id} not found")))?;

        let handle = self.registry.resolve(caller_id).await.ok_or_else(|| {
            ApplicationError::internal(format!("no live connection for user {caller_id}"))
        })?;
        self.bus.join(&payload.room_id, &handle).await;

        let joined = ServerEvent::UserJoined {
            message: format!("{} joined the conference", caller.name),
            join_user: UserProjection::from(&caller),
        };
        self.bus
            .broadcast_except(&payload.room_id, handle.conn_id(), joined.clone())
            .await;
        info!(room_id = %payload.room_id, user_id = %caller_id, "user joined conference");

        Ok(joined)
    }

    /// SDP offer 原样转发给房间内其他成员。
    pub async fn relay_offer(&self, caller_id: UserId, payload: OfferPayload) {
        self.relay(caller_id, &payload.room_id, ServerEvent::Offer(payload.offer))
            .await;
    }

    /// SDP answer 原样转发。
    pub async fn relay_answer(&self, caller_id: UserId, payload: AnswerPayload) {
        self.relay(
            caller_id,
            &payload.room_id,
            ServerEvent::Answer(payload.answer),
        )
        .await;
    }

    /// ICE candidate 原样转发，出站事件名保持历史小写形式。
    pub async fn relay_ice_candidate(&self, caller_id: UserId, payload: IceCandidatePayload) {
        self.relay(
            caller_id,
            &payload.room_id,
            ServerEvent::IceCandidate(payload.candidate),
        )
        .await;
    }

    /// 媒体状态（摄像头/麦克风）广播给房间内其他成员。
    pub async fn relay_media_state(&self, caller_id: UserId, payload: MediaStatePayload) {
        let body = serde_json::json!({
            "roomId": payload.room_id,
            "mediaState": payload.media_state,
        });
        self.relay(caller_id, &payload.room_id, ServerEvent::MediaState(body))
            .await;
    }

    async fn relay(&self, caller_id: UserId, room_id: &str, event: ServerEvent) {
        match self.registry.resolve(caller_id).await {
            Some(handle) => {
                self.bus
                    .broadcast_except(room_id, handle.conn_id(), event)
                    .await;
            }
            None => {
                debug!(user_id = %caller_id, room_id, "relay from user without live connection");
                self.bus.broadcast(room_id, event).await;
            }
        }
    }

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
}
