//! 房间广播总线
//!
//! 房间键 → 订阅连接集合的传输层映射。持久化聊天室使用
//! `chatRoom/{id}` 键；会议房间直接用调用方提供的令牌作键，
//! 成员关系只存在于这里，不落库。

use std::collections::HashMap;

use domain::{RoomId, ServerEvent};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::registry::ConnectionHandle;

/// 持久化聊天室的广播键。
pub fn chat_room_key(room_id: RoomId) -> String {
    format!("chatRoom/{room_id}")
}

#[derive(Debug, Default)]
pub struct RoomBus {
    rooms: RwLock<HashMap<String, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl RoomBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将连接订阅到房间键。重复订阅是幂等的。
    pub async fn join(&self, key: &str, handle: &ConnectionHandle) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(key.to_string())
            .or_default()
            .insert(handle.conn_id(), handle.sender());
    }

    /// 将连接从单个房间键移除。
    pub async fn leave(&self, key: &str, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(key) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(key);
            }
        }
    }

    /// 连接关闭时清理其全部订阅。
    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// 向房间内所有订阅连接广播。发送失败（过期句柄）静默跳过。
    pub async fn broadcast(&self, key: &str, event: ServerEvent) {
        self.fan_out(key, None, event).await;
    }

    /// 向房间内除 `except` 外的所有订阅连接广播。
    pub async fn broadcast_except(&self, key: &str, except: Uuid, event: ServerEvent) {
        self.fan_out(key, Some(except), event).await;
    }

    async fn fan_out(&self, key: &str, except: Option<Uuid>, event: ServerEvent) {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(key) else {
            return;
        };
        for (conn_id, sender) in members {
            if Some(*conn_id) == except {
                continue;
            }
            if sender.send(event.clone()).is_err() {
                tracing::debug!(room = key, conn_id = %conn_id, "skip broadcast to closed connection");
            }
        }
    }

    /// 房间当前订阅数（测试用）。
    pub async fn member_count(&self, key: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(key)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    fn probe(payload: &str) -> ServerEvent {
        ServerEvent::Offer(serde_json::json!({ "sdp": payload }))
    }

    #[tokio::test]
    async fn broadcast_except_skips_the_sender() {
        let bus = RoomBus::new();
        let (sender_conn, mut sender_rx) = connection();
        let (peer_a, mut peer_a_rx) = connection();
        let (peer_b, mut peer_b_rx) = connection();

        bus.join("conf-1", &sender_conn).await;
        bus.join("conf-1", &peer_a).await;
        bus.join("conf-1", &peer_b).await;

        bus.broadcast_except("conf-1", sender_conn.conn_id(), probe("v=0"))
            .await;

        assert!(peer_a_rx.try_recv().is_ok());
        assert!(peer_b_rx.try_recv().is_ok());
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_all_removes_every_subscription() {
        let bus = RoomBus::new();
        let (conn, mut rx) = connection();
        bus.join("a", &conn).await;
        bus.join("b", &conn).await;

        bus.leave_all(conn.conn_id()).await;
        bus.broadcast("a", probe("x")).await;
        bus.broadcast("b", probe("y")).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(bus.member_count("a").await, 0);
    }

    #[tokio::test]
    async fn leave_drops_a_single_subscription() {
        let bus = RoomBus::new();
        let (conn, mut rx) = connection();
        bus.join("a", &conn).await;
        bus.join("b", &conn).await;

        bus.leave("a", conn.conn_id()).await;
        bus.broadcast("a", probe("x")).await;
        bus.broadcast("b", probe("y")).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_noop() {
        let bus = RoomBus::new();
        bus.broadcast("nowhere", probe("x")).await;
    }
}
