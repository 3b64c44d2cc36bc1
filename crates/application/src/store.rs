//! Room Membership Store 与工作单元抽象
//!
//! 每个入站 socket 事件被一个工作单元包裹：`begin` 获取事务句柄，
//! 协调器以显式参数接收它（不挂在连接对象上），处理成功后 `commit`，
//! 失败后 `rollback`。提交/回滚完成之前，事件对传输层而言尚未完成。
//!
//! 内存实现把新建的行暂存到事务里、提交时才落到共享状态，
//! 使回滚语义和惰性建房竞态都能在不依赖 Postgres 的测试里复现。

use async_trait::async_trait;
use domain::{
    ChatMessage, ChatRoom, MessageWithAuthor, RoomId, RoomWithMembers, StoreResult, User, UserId,
};

/// 工作单元工厂。每个实现（Postgres、内存）管理自己的事务资源。
#[async_trait]
pub trait ChatUnitOfWork: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn ChatTx>>;
}

/// 一次事务内可用的存储操作。`commit`/`rollback` 消费事务，
/// 保证每条退出路径上资源恰好释放一次。
#[async_trait]
pub trait ChatTx: Send {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    /// 批量解析用户 id。只返回存在的用户，调用方负责全有或全无检查。
    async fn find_users(&mut self, ids: &[UserId]) -> StoreResult<Vec<User>>;

    /// 系统内最先找到的管理员用户。
    async fn find_admin_user(&mut self) -> StoreResult<Option<User>>;

    async fn find_room(&mut self, id: RoomId) -> StoreResult<Option<RoomWithMembers>>;

    /// 该用户所属的唯一聊天室（普通用户至多一间）。
    async fn find_room_of_member(&mut self, user_id: UserId)
        -> StoreResult<Option<RoomWithMembers>>;

    /// 创建房间并写入成员关系。host 必须包含在成员里，实现负责保证。
    async fn create_room(
        &mut self,
        host_id: UserId,
        member_ids: &[UserId],
    ) -> StoreResult<RoomWithMembers>;

    async fn insert_message(
        &mut self,
        room_id: RoomId,
        author_id: UserId,
        message: &str,
    ) -> StoreResult<ChatMessage>;

    /// 该用户参与的所有房间，按创建时间降序。
    async fn list_rooms_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<RoomWithMembers>>;

    /// 房间内全部消息，按创建时间升序，带作者。
    async fn list_messages(&mut self, room_id: RoomId) -> StoreResult<Vec<MessageWithAuthor>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// 内存实现（用于测试）。
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct MemoryState {
        users: BTreeMap<UserId, User>,
        rooms: BTreeMap<RoomId, ChatRoom>,
        members: BTreeMap<RoomId, Vec<UserId>>,
        messages: Vec<ChatMessage>,
        next_room_id: i64,
        next_message_id: i64,
    }

    /// 共享内存存储。id 序列在分配时立即消耗（即便事务最终回滚），
    /// 与数据库序列的行为一致。
    #[derive(Debug, Clone, Default)]
    pub struct MemoryStore {
        state: Arc<Mutex<MemoryState>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 预置一个用户（相当于迁移/注册流程写入的行）。
        pub async fn seed_user(&self, user: User) {
            self.state.lock().await.users.insert(user.id, user);
        }

        /// 当前已提交的房间数（断言回滚用）。
        pub async fn room_count(&self) -> usize {
            self.state.lock().await.rooms.len()
        }

        /// 当前已提交的消息数。
        pub async fn message_count(&self) -> usize {
            self.state.lock().await.messages.len()
        }
    }

    #[async_trait]
    impl ChatUnitOfWork for MemoryStore {
        async fn begin(&self) -> StoreResult<Box<dyn ChatTx>> {
            Ok(Box::new(MemoryTx {
                state: self.state.clone(),
                staged_rooms: Vec::new(),
                staged_members: BTreeMap::new(),
                staged_messages: Vec::new(),
            }))
        }
    }

    struct MemoryTx {
        state: Arc<Mutex<MemoryState>>,
        staged_rooms: Vec<ChatRoom>,
        staged_members: BTreeMap<RoomId, Vec<UserId>>,
        staged_messages: Vec<ChatMessage>,
    }

    impl MemoryTx {
        /// 事务内可见的房间：已提交的加上本事务暂存的。
        fn visible_room(
            &self,
            state: &MemoryState,
            room_id: RoomId,
        ) -> Option<(ChatRoom, Vec<UserId>)> {
            if let Some(room) = state.rooms.get(&room_id) {
                let members = state.members.get(&room_id).cloned().unwrap_or_default();
                return Some((room.clone(), members));
            }
            self.staged_rooms
                .iter()
                .find(|room| room.id == room_id)
                .map(|room| {
                    let members = self
                        .staged_members
                        .get(&room_id)
                        .cloned()
                        .unwrap_or_default();
                    (room.clone(), members)
                })
        }

        fn assemble(
            &self,
            state: &MemoryState,
            room: ChatRoom,
            member_ids: &[UserId],
        ) -> StoreResult<RoomWithMembers> {
            let members: Vec<User> = member_ids
                .iter()
                .filter_map(|id| state.users.get(id).cloned())
                .collect();
            let host = state
                .users
                .get(&room.host_id)
                .cloned()
                .ok_or(domain::StoreError::NotFound)?;
            Ok(RoomWithMembers {
                room,
                host,
                members,
            })
        }
    }

    #[async_trait]
    impl ChatTx for MemoryTx {
        async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
            Ok(self.state.lock().await.users.get(&id).cloned())
        }

        async fn find_users(&mut self, ids: &[UserId]) -> StoreResult<Vec<User>> {
            let state = self.state.lock().await;
            Ok(ids
                .iter()
                .filter_map(|id| state.users.get(id).cloned())
                .collect())
        }

        async fn find_admin_user(&mut self) -> StoreResult<Option<User>> {
            let state = self.state.lock().await;
            Ok(state
                .users
                .values()
                .find(|user| user.role.is_admin())
                .cloned())
        }

        async fn find_room(&mut self, id: RoomId) -> StoreResult<Option<RoomWithMembers>> {
            let state = self.state.lock().await;
            match self.visible_room(&state, id) {
                Some((room, member_ids)) => Ok(Some(self.assemble(&state, room, &member_ids)?)),
                None => Ok(None),
            }
        }

        async fn find_room_of_member(
            &mut self,
            user_id: UserId,
        ) -> StoreResult<Option<RoomWithMembers>> {
            let state = self.state.lock().await;
            // 先查已提交状态，再查本事务暂存的房间
            let committed = state
                .members
                .iter()
                .find(|(_, members)| members.contains(&user_id))
                .map(|(room_id, _)| *room_id);
            let staged = self
                .staged_members
                .iter()
                .find(|(_, members)| members.contains(&user_id))
                .map(|(room_id, _)| *room_id);
            match committed.or(staged) {
                Some(room_id) => {
                    let (room, member_ids) = self
                        .visible_room(&state, room_id)
                        .ok_or(domain::StoreError::NotFound)?;
                    Ok(Some(self.assemble(&state, room, &member_ids)?))
                }
                None => Ok(None),
            }
        }

        async fn create_room(
            &mut self,
            host_id: UserId,
            member_ids: &[UserId],
        ) -> StoreResult<RoomWithMembers> {
            let mut state = self.state.lock().await;
            state.next_room_id += 1;
            let room = ChatRoom {
                id: RoomId(state.next_room_id),
                host_id,
                created_at: chrono::Utc::now(),
            };

            let mut members = member_ids.to_vec();
            if !members.contains(&host_id) {
                members.push(host_id);
            }

            self.staged_rooms.push(room.clone());
            self.staged_members.insert(room.id, members.clone());
            self.assemble(&state, room, &members)
        }

        async fn insert_message(
            &mut self,
            room_id: RoomId,
            author_id: UserId,
            message: &str,
        ) -> StoreResult<ChatMessage> {
            let mut state = self.state.lock().await;
            if self.visible_room(&state, room_id).is_none() {
                return Err(domain::StoreError::NotFound);
            }
            state.next_message_id += 1;
            let record = ChatMessage {
                id: domain::MessageId(state.next_message_id),
                room_id,
                author_id,
                message: message.to_string(),
                created_at: chrono::Utc::now(),
            };
            self.staged_messages.push(record.clone());
            Ok(record)
        }

        async fn list_rooms_for_user(
            &mut self,
            user_id: UserId,
        ) -> StoreResult<Vec<RoomWithMembers>> {
            let state = self.state.lock().await;
            let mut rooms: Vec<RoomWithMembers> = Vec::new();
            for (room_id, members) in &state.members {
                if members.contains(&user_id) {
                    if let Some((room, member_ids)) = self.visible_room(&state, *room_id) {
                        rooms.push(self.assemble(&state, room, &member_ids)?);
                    }
                }
            }
            rooms.sort_by(|a, b| b.room.created_at.cmp(&a.room.created_at));
            Ok(rooms)
        }

        async fn list_messages(&mut self, room_id: RoomId) -> StoreResult<Vec<MessageWithAuthor>> {
            let state = self.state.lock().await;
            let mut items: Vec<MessageWithAuthor> = state
                .messages
                .iter()
                .filter(|message| message.room_id == room_id)
                .filter_map(|message| {
                    state
                        .users
                        .get(&message.author_id)
                        .map(|author| MessageWithAuthor {
                            message: message.clone(),
                            author: author.clone(),
                        })
                })
                .collect();
            items.sort_by(|a, b| a.message.created_at.cmp(&b.message.created_at));
            Ok(items)
        }

        async fn commit(self: Box<Self>) -> StoreResult<()> {
            let mut state = self.state.lock().await;
            for room in self.staged_rooms {
                state.members.insert(
                    room.id,
                    self.staged_members.get(&room.id).cloned().unwrap_or_default(),
                );
                state.rooms.insert(room.id, room);
            }
            state.messages.extend(self.staged_messages);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> StoreResult<()> {
            // 暂存内容随事务一起丢弃
            Ok(())
        }
    }
}
