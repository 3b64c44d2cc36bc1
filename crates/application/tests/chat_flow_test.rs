//! 聊天流程集成测试
//!
//! 串起注册表、房间总线、工作单元与两个协调器，覆盖完整会话流程、
//! 回滚语义以及惰性建房的已知并发竞态。

use std::sync::Arc;

use application::store::memory::MemoryStore;
use application::{
    ChatService, ChatServiceDependencies, ChatUnitOfWork, ConferenceService,
    ConferenceServiceDependencies, ConnectionHandle, ConnectionRegistry, RoomBus,
};
use domain::protocol::{CreateConferencePayload, SendMessagePayload};
use domain::{Role, ServerEvent, User, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

fn seed(id: i64, role: Role) -> User {
    User {
        id: UserId(id),
        email: format!("user{id}@example.com"),
        password: "hashed".to_string(),
        name: format!("user-{id}"),
        phone: None,
        profile: None,
        role,
        created_at: chrono::Utc::now(),
    }
}

struct Harness {
    store: MemoryStore,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<RoomBus>,
    chat: ChatService,
    conference: ConferenceService,
}

fn harness() -> Harness {
    let registry = Arc::new(ConnectionRegistry::new());
    let bus = Arc::new(RoomBus::new());
    let chat = ChatService::new(ChatServiceDependencies {
        registry: registry.clone(),
        bus: bus.clone(),
    });
    let conference = ConferenceService::new(ConferenceServiceDependencies {
        registry: registry.clone(),
        bus: bus.clone(),
    });
    Harness {
        store: MemoryStore::new(),
        registry,
        bus,
        chat,
        conference,
    }
}

async fn connect(
    harness: &Harness,
    user_id: UserId,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
    harness.registry.register(user_id, handle.clone()).await;
    (handle, rx)
}

#[tokio::test]
async fn conversation_flow_end_to_end() {
    let h = harness();
    h.store.seed_user(seed(1, Role::Admin)).await;
    h.store.seed_user(seed(2, Role::User)).await;
    let (_admin_handle, mut admin_rx) = connect(&h, UserId(1)).await;
    let (_user_handle, mut user_rx) = connect(&h, UserId(2)).await;

    // 用户首条消息：惰性建房 + 管理员收到 roomCreated 与消息
    let mut tx = h.store.begin().await.unwrap();
    let ack = h
        .chat
        .create_message(
            tx.as_mut(),
            UserId(2),
            Role::User,
            SendMessagePayload {
                room_id: None,
                message: "hi, I need help".to_string(),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let room_id = match ack {
        ServerEvent::SendMessage(payload) => payload.chat_room.id,
        other => panic!("unexpected ack: {other:?}"),
    };
    assert!(matches!(
        admin_rx.recv().await.unwrap(),
        ServerEvent::RoomCreated(_)
    ));
    assert!(matches!(
        admin_rx.recv().await.unwrap(),
        ServerEvent::SendMessage(_)
    ));

    // 管理员在同一房间里回复，用户收到扇出
    let mut tx = h.store.begin().await.unwrap();
    h.chat
        .create_message(
            tx.as_mut(),
            UserId(1),
            Role::Admin,
            SendMessagePayload {
                room_id: Some(room_id),
                message: "what can I do for you?".to_string(),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // 用户先收到惰性建房的 roomCreated，再收到管理员回复
    assert!(matches!(
        user_rx.recv().await.unwrap(),
        ServerEvent::RoomCreated(_)
    ));
    match user_rx.recv().await.unwrap() {
        ServerEvent::SendMessage(payload) => {
            assert_eq!(payload.author.id, UserId(1));
            assert_eq!(payload.message, "what can I do for you?");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // 历史查询：升序两条
    let mut tx = h.store.begin().await.unwrap();
    let history = h.chat.list_messages(tx.as_mut(), room_id).await.unwrap();
    let rooms = h
        .chat
        .list_rooms_for_user(tx.as_mut(), UserId(2))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message, "hi, I need help");
    assert_eq!(history[1].message, "what can I do for you?");
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, room_id);
}

#[tokio::test]
async fn failed_event_rolls_back_all_writes() {
    let h = harness();
    h.store.seed_user(seed(1, Role::Admin)).await;
    h.store.seed_user(seed(2, Role::User)).await;

    let mut tx = h.store.begin().await.unwrap();
    // 建房成功后在同一事务里触发失败，提交不会发生
    let room = h
        .chat
        .get_or_create_room(tx.as_mut(), &seed(2, Role::User), Role::User, None)
        .await
        .unwrap();
    h.chat
        .create_message(
            tx.as_mut(),
            UserId(2),
            Role::User,
            SendMessagePayload {
                room_id: Some(room.room.id),
                message: "in flight".to_string(),
            },
        )
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(h.store.room_count().await, 0);
    assert_eq!(h.store.message_count().await, 0);
}

#[tokio::test]
async fn concurrent_first_messages_can_create_two_rooms() {
    // 惰性建房的存在性检查不做数据库层面的去重，两个并发事务
    // 各自看不到对方未提交的房间时会各建一间。读取路径按创建
    // 时间降序返回全部房间，不假设唯一。
    let h = harness();
    h.store.seed_user(seed(1, Role::Admin)).await;
    h.store.seed_user(seed(2, Role::User)).await;

    let mut tx_a = h.store.begin().await.unwrap();
    let mut tx_b = h.store.begin().await.unwrap();

    h.chat
        .create_message(
            tx_a.as_mut(),
            UserId(2),
            Role::User,
            SendMessagePayload {
                room_id: None,
                message: "first".to_string(),
            },
        )
        .await
        .unwrap();
    h.chat
        .create_message(
            tx_b.as_mut(),
            UserId(2),
            Role::User,
            SendMessagePayload {
                room_id: None,
                message: "second".to_string(),
            },
        )
        .await
        .unwrap();

    tx_a.commit().await.unwrap();
    tx_b.commit().await.unwrap();

    assert_eq!(h.store.room_count().await, 2);
    let mut tx = h.store.begin().await.unwrap();
    let rooms = h
        .chat
        .list_rooms_for_user(tx.as_mut(), UserId(2))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(rooms.len(), 2);
}

#[tokio::test]
async fn conference_invite_then_signal() {
    let h = harness();
    h.store.seed_user(seed(1, Role::User)).await;
    h.store.seed_user(seed(2, Role::User)).await;
    let (_host_handle, _host_rx) = connect(&h, UserId(1)).await;
    let (guest_handle, mut guest_rx) = connect(&h, UserId(2)).await;

    let mut tx = h.store.begin().await.unwrap();
    h.conference
        .create_room(
            tx.as_mut(),
            UserId(1),
            CreateConferencePayload {
                room_id: "conf-xyz".to_string(),
                host: "1".to_string(),
                guests: vec![UserId(2)],
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    match guest_rx.recv().await.unwrap() {
        ServerEvent::ConferenceInvitation { room_id, .. } => assert_eq!(room_id, "conf-xyz"),
        other => panic!("unexpected event: {other:?}"),
    }

    // 受邀方加入后,主持方的信令只送达对端
    h.bus.join("conf-xyz", &guest_handle).await;
    h.conference
        .relay_offer(
            UserId(1),
            domain::protocol::OfferPayload {
                room_id: "conf-xyz".to_string(),
                offer: serde_json::json!({"type": "offer", "sdp": "v=0"}),
            },
        )
        .await;
    assert!(matches!(
        guest_rx.recv().await.unwrap(),
        ServerEvent::Offer(_)
    ));
}
