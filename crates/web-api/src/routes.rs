//! HTTP 路由
//!
//! 查询接口与 WebSocket 升级入口。查询接口同样使用 Bearer access
//! token 鉴权。

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use application::dto::RoomListItem;
use domain::protocol::MessagePayload;
use domain::{Claims, RoomId};

use crate::error::ApiError;
use crate::gateway::websocket_upgrade;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat/list", get(list_rooms))
        .route("/chat/room/{room_id}", get(room_history))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// 当前用户参与的房间列表，创建时间降序。
async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomListItem>>, ApiError> {
    let claims = authenticate(&state, &headers)?;
    let mut tx = state.uow.begin().await.map_err(store_err)?;
    let rooms = state
        .chat_service
        .list_rooms_for_user(tx.as_mut(), claims.sub)
        .await?;
    tx.commit().await.map_err(store_err)?;
    Ok(Json(rooms))
}

/// 房间内全部消息，创建时间升序。
async fn room_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<i64>,
) -> Result<Json<Vec<MessagePayload>>, ApiError> {
    authenticate(&state, &headers)?;
    let mut tx = state.uow.begin().await.map_err(store_err)?;
    let messages = state
        .chat_service
        .list_messages(tx.as_mut(), RoomId(room_id))
        .await?;
    tx.commit().await.map_err(store_err)?;
    Ok(Json(messages))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;
    state
        .verifier
        .verify_bearer(header_value)
        .map_err(|err| ApiError::unauthorized(err.to_string()))
}

fn store_err(err: domain::StoreError) -> ApiError {
    ApiError::from(application::ApplicationError::Store(err))
}
