//! 握手凭证校验
//!
//! 连接升级阶段从 `authorization` 头解析 Bearer token，只接受
//! access 类型的 JWT。失败路径统一映射为 401，不向客户端泄露细节。

use domain::{AuthError, Claims, TokenType};
use jsonwebtoken::{decode, DecodingKey, Validation};

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validation: Validation::default(),
        }
    }

    /// 从 `authorization` 头的原始值解析并校验 access token。
    pub fn verify_bearer(&self, header_value: &str) -> Result<Claims, AuthError> {
        let token = parse_bearer(header_value)?;
        self.verify(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        if data.claims.token_type != TokenType::Access {
            return Err(AuthError::WrongTokenType);
        }
        Ok(data.claims)
    }
}

fn parse_bearer(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MalformedCredential);
    }
    Ok(token)
}
