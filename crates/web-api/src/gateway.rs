//! WebSocket 网关
//!
//! 连接升级、握手鉴权、帧解析与事件分发。每条连接由一个发送泵任务
//! 和一个接收循环组成；触库的事件在独立事务里处理，提交或回滚完成
//! 之后才向调用方发送回执或错误帧。

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use application::{chat_room_key, ApplicationError, ConnectionHandle};
use domain::{Claims, ClientEvent, ConnectionStatus, ServerEvent};

use crate::state::AppState;

/// 处理 `/ws` 升级请求。凭证放在 `authorization` 头里，
/// 校验失败的连接在升级前即被拒绝。
pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(header_value) = header_value else {
        warn!(status = %ConnectionStatus::Rejected, "websocket upgrade without credential");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = match state.verifier.verify_bearer(header_value) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(status = %ConnectionStatus::Rejected, error = %err, "websocket upgrade rejected");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, claims, state)))
}

async fn handle_socket(socket: WebSocket, claims: Claims, state: AppState) {
    let conn_id = Uuid::new_v4();
    let user_id = claims.sub;
    info!(%conn_id, %user_id, status = %ConnectionStatus::Authenticated, "websocket connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = ConnectionHandle::new(conn_id, tx);
    state.registry.register(user_id, handle.clone()).await;

    if let Err(err) = subscribe_chat_rooms(&state, &handle, &claims).await {
        error!(%conn_id, %user_id, error = %err, "failed to subscribe chat rooms");
        state.registry.remove_if_current(user_id, conn_id).await;
        return;
    }
    debug!(%conn_id, %user_id, status = %ConnectionStatus::Subscribed, "chat rooms subscribed");

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(err) => {
                    error!(%conn_id, error = %err, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatch_frame(&state, &claims, &handle, text.as_str()).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            // Ping/Pong 由底层协议栈应答，Binary 不在协议内
            Ok(_) => {}
        }
    }

    // 代际一致才移除注册项，自己的订阅无条件清理
    let removed = state.registry.remove_if_current(user_id, conn_id).await;
    state.bus.leave_all(conn_id).await;
    send_task.abort();
    info!(%conn_id, %user_id, removed, status = %ConnectionStatus::Closed, "websocket disconnected");
}

/// 连接建立后把用户既有房间全部订阅到总线。
async fn subscribe_chat_rooms(
    state: &AppState,
    handle: &ConnectionHandle,
    claims: &Claims,
) -> Result<(), ApplicationError> {
    let mut tx = state.uow.begin().await?;
    let rooms = tx.list_rooms_for_user(claims.sub).await?;
    tx.commit().await?;
    for room in &rooms {
        state.bus.join(&chat_room_key(room.room.id), handle).await;
    }
    Ok(())
}

async fn dispatch_frame(state: &AppState, claims: &Claims, handle: &ConnectionHandle, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(user_id = %claims.sub, error = %err, "rejected malformed frame");
            handle.push(ServerEvent::Error {
                message: format!("invalid frame: {err}"),
            });
            return;
        }
    };

    match route_event(state, claims, event).await {
        Ok(Some(ack)) => handle.push(ack),
        Ok(None) => {}
        Err(err) => {
            debug!(user_id = %claims.sub, error = %err, "event failed");
            handle.push(ServerEvent::Error {
                message: err.client_message(),
            });
        }
    }
}

/// 触库事件的事务包装：路由成功后提交、失败后回滚，
/// 两者都在回执发送之前完成。
async fn route_event(
    state: &AppState,
    claims: &Claims,
    event: ClientEvent,
) -> Result<Option<ServerEvent>, ApplicationError> {
    match event {
        ClientEvent::CreateChatRoom(payload) => {
            let mut tx = state.uow.begin().await?;
            let outcome = state
                .chat_service
                .create_chat_room(tx.as_mut(), payload)
                .await;
            finish(tx, outcome).await.map(Some)
        }
        ClientEvent::SendMessage(payload) => {
            let mut tx = state.uow.begin().await?;
            let outcome = state
                .chat_service
                .create_message(tx.as_mut(), claims.sub, claims.role, payload)
                .await;
            finish(tx, outcome).await.map(Some)
        }
        ClientEvent::CreateConferenceRoom(payload) => {
            let mut tx = state.uow.begin().await?;
            let outcome = state
                .conference_service
                .create_room(tx.as_mut(), claims.sub, payload)
                .await;
            finish(tx, outcome).await.map(Some)
        }
        ClientEvent::JoinConferenceRoom(payload) => {
            let mut tx = state.uow.begin().await?;
            let outcome = state
                .conference_service
                .join_room(tx.as_mut(), claims.sub, payload)
                .await;
            finish(tx, outcome).await.map(Some)
        }
        // 纯信令中转不触库，不需要事务
        ClientEvent::SendOffer(payload) => {
            state.conference_service.relay_offer(claims.sub, payload).await;
            Ok(None)
        }
        ClientEvent::SendAnswer(payload) => {
            state
                .conference_service
                .relay_answer(claims.sub, payload)
                .await;
            Ok(None)
        }
        ClientEvent::SendIceCandidate(payload) => {
            state
                .conference_service
                .relay_ice_candidate(claims.sub, payload)
                .await;
            Ok(None)
        }
        ClientEvent::SendMediaState(payload) => {
            state
                .conference_service
                .relay_media_state(claims.sub, payload)
                .await;
            Ok(None)
        }
    }
}

async fn finish(
    tx: Box<dyn application::ChatTx>,
    outcome: Result<ServerEvent, ApplicationError>,
) -> Result<ServerEvent, ApplicationError> {
    match outcome {
        Ok(ack) => {
            tx.commit().await?;
            Ok(ack)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
