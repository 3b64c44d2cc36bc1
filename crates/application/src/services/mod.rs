mod chat_service;
mod conference_service;

#[cfg(test)]
mod conference_service_tests;

pub use chat_service::{ChatService, ChatServiceDependencies};
pub use conference_service::{ConferenceService, ConferenceServiceDependencies};
