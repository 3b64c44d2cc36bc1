use domain::StoreError;
use thiserror::Error;

/// 应用层错误类型。
///
/// 分类对应连接方可见的语义：协议错误和未找到错误原样下发给发起连接，
/// 存储/内部错误只给出笼统描述，细节留在日志里。
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 协议错误（字段缺失、角色前置条件不满足等）
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 未知的用户/房间/访客 id
    #[error("not found: {0}")]
    NotFound(String),

    /// 存储层失败，经工作单元回滚后向上传播
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 内部错误（部署前置条件被破坏等）
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// 面向发起连接的错误文案。存储错误不泄露底层细节。
    pub fn client_message(&self) -> String {
        match self {
            Self::Protocol(message) | Self::NotFound(message) => message.clone(),
            Self::Store(_) | Self::Internal(_) => "internal server error".to_string(),
        }
    }
}
