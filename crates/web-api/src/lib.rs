//! Web API 层
//!
//! 暴露 WebSocket 网关与 HTTP 查询接口。

pub mod auth;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod state;

pub use auth::TokenVerifier;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
