//! 连接注册表
//!
//! 进程级的 userId → 活动连接映射。每个用户至多一条记录，后写者胜：
//! 重连会静默挤掉旧句柄，旧句柄不会收到任何通知。
//! 作为注入的服务实例构造（每进程一次），不用全局单例，便于测试隔离。

use std::collections::HashMap;

use domain::{ServerEvent, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// 一条活动双向通道的不透明引用。
///
/// `conn_id` 是连接代际标识；断开时只移除代际一致的注册项，
/// 避免旧 socket 的关闭挤掉同一用户的新连接。
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { conn_id, sender }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.sender.clone()
    }

    /// 尽力而为地推送一条出站事件。
    /// 通道已关闭（对端断开、句柄过期）时静默跳过，不重试。
    pub fn push(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!(conn_id = %self.conn_id, "skip push to closed connection");
        }
    }
}

/// userId → 连接句柄的注册表。
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 无条件覆盖该用户既有的注册项。没有错误分支。
    pub async fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        let mut entries = self.entries.write().await;
        if let Some(previous) = entries.insert(user_id, handle) {
            tracing::debug!(
                user_id = %user_id,
                evicted = %previous.conn_id(),
                "reconnect evicted previous connection"
            );
        }
    }

    /// 只在注册项仍指向 `conn_id` 这条连接时移除；否则视为过期关闭，不动。
    pub async fn remove_if_current(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&user_id) {
            Some(handle) if handle.conn_id() == conn_id => {
                entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// 查找用户的活动连接。`None` 表示当前离线，调用方应跳过推送。
    pub async fn resolve(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries.read().await.get(&user_id).cloned()
    }
}
