//! 共享应用状态

use std::sync::Arc;

use application::{ChatService, ChatUnitOfWork, ConferenceService, ConnectionRegistry, RoomBus};

use crate::auth::TokenVerifier;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub conference_service: Arc<ConferenceService>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<RoomBus>,
    pub uow: Arc<dyn ChatUnitOfWork>,
    pub verifier: Arc<TokenVerifier>,
}
