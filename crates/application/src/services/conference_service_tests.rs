//! 会议服务单元测试

#[cfg(test)]
mod conference_service_tests {
    use std::sync::Arc;

    use domain::protocol::{
        CreateConferencePayload, JoinConferencePayload, MediaState, MediaStatePayload,
        OfferPayload,
    };
    use domain::{Role, ServerEvent, User, UserId};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::error::ApplicationError;
    use crate::registry::{ConnectionHandle, ConnectionRegistry};
    use crate::room_bus::RoomBus;
    use crate::services::{ConferenceService, ConferenceServiceDependencies};
    use crate::store::memory::MemoryStore;
    use crate::store::ChatUnitOfWork;

    fn test_user(id: i64) -> User {
        User {
            id: UserId(id),
            email: format!("user{id}@example.com"),
            password: "hashed".to_string(),
            name: format!("user-{id}"),
            phone: None,
            profile: None,
            role: Role::User,
            created_at: chrono::Utc::now(),
        }
    }

    struct TestEnv {
        store: MemoryStore,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<RoomBus>,
        service: ConferenceService,
    }

    fn test_env() -> TestEnv {
        let registry = Arc::new(ConnectionRegistry::new());
        let bus = Arc::new(RoomBus::new());
        let service = ConferenceService::new(ConferenceServiceDependencies {
            registry: registry.clone(),
            bus: bus.clone(),
        });
        TestEnv {
            store: MemoryStore::new(),
            registry,
            bus,
            service,
        }
    }

    async fn connect(
        env: &TestEnv,
        user_id: UserId,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        env.registry.register(user_id, handle.clone()).await;
        (handle, rx)
    }

    #[tokio::test]
    async fn create_room_invites_online_guests_only() {
        let env = test_env();
        env.store.seed_user(test_user(1)).await;
        env.store.seed_user(test_user(2)).await;
        env.store.seed_user(test_user(3)).await;
        let (_host_handle, _host_rx) = connect(&env, UserId(1)).await;
        let (_guest_handle, mut guest_rx) = connect(&env, UserId(2)).await;
        // 用户 3 离线

        let mut tx = env.store.begin().await.unwrap();
        env.service
            .create_room(
                tx.as_mut(),
                UserId(1),
                CreateConferencePayload {
                    room_id: "conf-1".to_string(),
                    host: "1".to_string(),
                    guests: vec![UserId(2), UserId(3)],
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        match guest_rx.recv().await.unwrap() {
            ServerEvent::ConferenceInvitation { host, room_id } => {
                assert_eq!(host.id, UserId(1));
                assert_eq!(room_id, "conf-1");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(env.bus.member_count("conf-1").await, 1);
    }

    #[tokio::test]
    async fn missing_guest_aborts_before_any_join() {
        let env = test_env();
        env.store.seed_user(test_user(1)).await;
        let (_host_handle, _host_rx) = connect(&env, UserId(1)).await;

        let mut tx = env.store.begin().await.unwrap();
        let err = env
            .service
            .create_room(
                tx.as_mut(),
                UserId(1),
                CreateConferencePayload {
                    room_id: "conf-1".to_string(),
                    host: "1".to_string(),
                    guests: vec![UserId(9)],
                },
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, ApplicationError::NotFound(_)));
        // 校验失败，调用方不会停留在半加入状态
        assert_eq!(env.bus.member_count("conf-1").await, 0);
    }

    #[tokio::test]
    async fn join_notifies_existing_members_and_acks_joiner() {
        let env = test_env();
        env.store.seed_user(test_user(1)).await;
        env.store.seed_user(test_user(2)).await;
        let (host_handle, mut host_rx) = connect(&env, UserId(1)).await;
        let (_joiner_handle, _joiner_rx) = connect(&env, UserId(2)).await;
        env.bus.join("conf-1", &host_handle).await;

        let mut tx = env.store.begin().await.unwrap();
        let ack = env
            .service
            .join_room(
                tx.as_mut(),
                UserId(2),
                JoinConferencePayload {
                    room_id: "conf-1".to_string(),
                    host: "1".to_string(),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        match ack {
            ServerEvent::UserJoined { join_user, .. } => assert_eq!(join_user.id, UserId(2)),
            other => panic!("unexpected ack: {other:?}"),
        }
        match host_rx.recv().await.unwrap() {
            ServerEvent::UserJoined { join_user, .. } => assert_eq!(join_user.id, UserId(2)),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(env.bus.member_count("conf-1").await, 2);
    }

    #[tokio::test]
    async fn offer_is_relayed_to_everyone_but_the_sender() {
        let env = test_env();
        let (sender_handle, mut sender_rx) = connect(&env, UserId(1)).await;
        let (peer_handle, mut peer_rx) = connect(&env, UserId(2)).await;
        env.bus.join("conf-1", &sender_handle).await;
        env.bus.join("conf-1", &peer_handle).await;

        let offer = serde_json::json!({"type": "offer", "sdp": "v=0"});
        env.service
            .relay_offer(
                UserId(1),
                OfferPayload {
                    room_id: "conf-1".to_string(),
                    offer: offer.clone(),
                },
            )
            .await;

        match peer_rx.recv().await.unwrap() {
            ServerEvent::Offer(body) => assert_eq!(body, offer),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn media_state_carries_room_and_flags() {
        let env = test_env();
        let (sender_handle, _sender_rx) = connect(&env, UserId(1)).await;
        let (peer_handle, mut peer_rx) = connect(&env, UserId(2)).await;
        env.bus.join("conf-1", &sender_handle).await;
        env.bus.join("conf-1", &peer_handle).await;

        env.service
            .relay_media_state(
                UserId(1),
                MediaStatePayload {
                    room_id: "conf-1".to_string(),
                    media_state: MediaState {
                        camera_on: true,
                        mic_on: false,
                    },
                },
            )
            .await;

        match peer_rx.recv().await.unwrap() {
            ServerEvent::MediaState(body) => {
                assert_eq!(body["roomId"], "conf-1");
                assert_eq!(body["mediaState"]["cameraOn"], true);
                assert_eq!(body["mediaState"]["micOn"], false);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
