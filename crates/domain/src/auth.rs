//! 认证声明相关实体
//!
//! 消息层只消费"验证令牌 → 身份声明"这一能力，令牌签发在别处完成。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::user::Role;
use crate::value_objects::UserId;

/// 令牌类型。只有 access 令牌能授权 socket 操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT 令牌声明。验证通过后不可变地附着在连接上。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// 主题（用户ID）
    pub sub: UserId,
    /// 用户角色
    pub role: Role,
    /// 令牌类型
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
}

/// 认证错误
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// 缺少凭证
    #[error("missing credential")]
    MissingCredential,
    /// 凭证格式错误（非 Bearer 方案等）
    #[error("malformed credential")]
    MalformedCredential,
    /// 签名/过期验证失败
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// 非 access 令牌
    #[error("wrong token type")]
    WrongTokenType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_round_trip() {
        let claims = Claims {
            sub: UserId(7),
            role: Role::PaidUser,
            token_type: TokenType::Access,
            iat: 1_700_000_000,
            exp: 1_700_086_400,
        };

        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"type\":\"access\""));
        assert!(json.contains("\"role\":\"paidUser\""));

        let parsed: Claims = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, claims);
    }
}
