//! 工作单元的 Postgres 实现
//!
//! 每个 socket 事件对应一个 `sqlx` 事务。事务句柄在 `commit` /
//! `rollback` 时被消费；若连接在事件处理中途断开导致句柄直接
//! 析构，`sqlx` 会在归还连接时回滚。

use application::store::{ChatTx, ChatUnitOfWork};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatMessage, ChatRoom, MessageId, MessageWithAuthor, Role, RoomId, RoomWithMembers,
    StoreError, StoreResult, User, UserId,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    StoreError::storage(err.to_string())
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    password: String,
    name: String,
    phone: Option<String>,
    profile: Option<String>,
    role: Role,
    created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        User {
            id: UserId(value.id),
            email: value.email,
            password: value.password,
            name: value.name,
            phone: value.phone,
            profile: value.profile,
            role: value.role,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: i64,
    host_id: i64,
    created_at: DateTime<Utc>,
}

impl From<RoomRecord> for ChatRoom {
    fn from(value: RoomRecord) -> Self {
        ChatRoom {
            id: RoomId(value.id),
            host_id: UserId(value.host_id),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    room_id: i64,
    author_id: i64,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(value: MessageRecord) -> Self {
        ChatMessage {
            id: MessageId(value.id),
            room_id: RoomId(value.room_id),
            author_id: UserId(value.author_id),
            message: value.message,
            created_at: value.created_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, password, name, phone, profile, role, created_at";

/// 基于连接池的工作单元工厂。
#[derive(Clone)]
pub struct PgUnitOfWork {
    pool: PgPool,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatUnitOfWork for PgUnitOfWork {
    async fn begin(&self) -> StoreResult<Box<dyn ChatTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        Ok(Box::new(PgChatTx { tx }))
    }
}

struct PgChatTx {
    tx: Transaction<'static, Postgres>,
}

impl PgChatTx {
    async fn fetch_room_members(&mut self, room_id: RoomId) -> StoreResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.email, u.password, u.name, u.phone, u.profile, u.role, u.created_at \
             FROM users u \
             JOIN chat_room_users cru ON cru.user_id = u.id \
             WHERE cru.room_id = $1 \
             ORDER BY u.id",
        )
        .bind(room_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(User::from).collect())
    }

    async fn assemble_room(&mut self, record: RoomRecord) -> StoreResult<RoomWithMembers> {
        let room = ChatRoom::from(record);
        let members = self.fetch_room_members(room.id).await?;
        let host = match members.iter().find(|user| user.id == room.host_id) {
            Some(host) => host.clone(),
            None => self
                .find_user(room.host_id)
                .await?
                .ok_or(StoreError::NotFound)?,
        };
        Ok(RoomWithMembers {
            room,
            host,
            members,
        })
    }
}

#[async_trait]
impl ChatTx for PgChatTx {
    async fn find_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(User::from))
    }

    async fn find_users(&mut self, ids: &[UserId]) -> StoreResult<Vec<User>> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&raw_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(User::from).collect())
    }

    async fn find_admin_user(&mut self) -> StoreResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id LIMIT 1"
        ))
        .bind(Role::Admin)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(User::from))
    }

    async fn find_room(&mut self, id: RoomId) -> StoreResult<Option<RoomWithMembers>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "SELECT id, host_id, created_at FROM chat_rooms WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        match record {
            Some(record) => Ok(Some(self.assemble_room(record).await?)),
            None => Ok(None),
        }
    }

    async fn find_room_of_member(
        &mut self,
        user_id: UserId,
    ) -> StoreResult<Option<RoomWithMembers>> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "SELECT r.id, r.host_id, r.created_at \
             FROM chat_rooms r \
             JOIN chat_room_users cru ON cru.room_id = r.id \
             WHERE cru.user_id = $1 \
             ORDER BY r.created_at DESC \
             LIMIT 1",
        )
        .bind(user_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        match record {
            Some(record) => Ok(Some(self.assemble_room(record).await?)),
            None => Ok(None),
        }
    }

    async fn create_room(
        &mut self,
        host_id: UserId,
        member_ids: &[UserId],
    ) -> StoreResult<RoomWithMembers> {
        let record = sqlx::query_as::<_, RoomRecord>(
            "INSERT INTO chat_rooms (host_id) VALUES ($1) RETURNING id, host_id, created_at",
        )
        .bind(host_id.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        let mut raw_ids: Vec<i64> = member_ids.iter().map(|id| id.0).collect();
        if !raw_ids.contains(&host_id.0) {
            raw_ids.push(host_id.0);
        }
        sqlx::query(
            "INSERT INTO chat_room_users (room_id, user_id) \
             SELECT $1, unnest($2::bigint[])",
        )
        .bind(record.id)
        .bind(&raw_ids)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        self.assemble_room(record).await
    }

    async fn insert_message(
        &mut self,
        room_id: RoomId,
        author_id: UserId,
        message: &str,
    ) -> StoreResult<ChatMessage> {
        let record = sqlx::query_as::<_, MessageRecord>(
            "INSERT INTO chats (room_id, author_id, message) \
             VALUES ($1, $2, $3) \
             RETURNING id, room_id, author_id, message, created_at",
        )
        .bind(room_id.0)
        .bind(author_id.0)
        .bind(message)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(ChatMessage::from(record))
    }

    async fn list_rooms_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<RoomWithMembers>> {
        let records = sqlx::query_as::<_, RoomRecord>(
            "SELECT r.id, r.host_id, r.created_at \
             FROM chat_rooms r \
             JOIN chat_room_users cru ON cru.room_id = r.id \
             WHERE cru.user_id = $1 \
             ORDER BY r.created_at DESC",
        )
        .bind(user_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        let mut rooms = Vec::with_capacity(records.len());
        for record in records {
            rooms.push(self.assemble_room(record).await?);
        }
        Ok(rooms)
    }

    async fn list_messages(&mut self, room_id: RoomId) -> StoreResult<Vec<MessageWithAuthor>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, room_id, author_id, message, created_at \
             FROM chats WHERE room_id = $1 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(room_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_err)?;

        let author_ids: Vec<UserId> = {
            let mut ids: Vec<UserId> = records.iter().map(|r| UserId(r.author_id)).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let authors = self.find_users(&author_ids).await?;

        records
            .into_iter()
            .map(|record| {
                let message = ChatMessage::from(record);
                let author = authors
                    .iter()
                    .find(|user| user.id == message.author_id)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                Ok(MessageWithAuthor { message, author })
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx_err)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_err)
    }
}
