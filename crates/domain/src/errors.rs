//! 存储层错误定义
//!
//! Room Membership Store 的所有实现（Postgres、内存）共用这组错误。

use thiserror::Error;

/// 存储错误类型
#[derive(Debug, Error)]
pub enum StoreError {
    /// 请求的行不存在
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("conflict")]
    Conflict,

    /// 底层存储故障（连接丢失、约束违反等）
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 存储层结果类型
pub type StoreResult<T> = Result<T, StoreError>;
