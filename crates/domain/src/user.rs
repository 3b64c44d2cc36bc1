use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

/// 用户角色。
///
/// 权限顺序不依赖枚举的判别值，而是通过显式的特权表编码，
/// 避免成员重排后比较逻辑悄悄失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "user_role", rename_all = "camelCase")]
pub enum Role {
    Admin,
    PaidUser,
    User,
}

impl Role {
    /// 显式特权等级，数值越小特权越高。
    fn privilege_rank(self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::PaidUser => 1,
            Role::User => 2,
        }
    }

    /// 当前角色是否拥有 `required` 角色的全部特权。
    pub fn has_privilege_of(self, required: Role) -> bool {
        self.privilege_rank() <= required.privilege_rank()
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// 密码哈希不暴露给客户端，序列化时跳过。
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub profile: Option<String>,
    pub role: Role,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_outranks_everyone() {
        assert!(Role::Admin.has_privilege_of(Role::Admin));
        assert!(Role::Admin.has_privilege_of(Role::PaidUser));
        assert!(Role::Admin.has_privilege_of(Role::User));
    }

    #[test]
    fn regular_user_has_lowest_privilege() {
        assert!(!Role::User.has_privilege_of(Role::PaidUser));
        assert!(!Role::User.has_privilege_of(Role::Admin));
        assert!(Role::User.has_privilege_of(Role::User));
    }

    #[test]
    fn role_serializes_as_camel_case() {
        assert_eq!(serde_json::to_string(&Role::PaidUser).unwrap(), "\"paidUser\"");
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn password_is_never_serialized() {
        let user = User {
            id: UserId(1),
            email: "a@b.c".into(),
            password: "secret-hash".into(),
            name: "a".into(),
            phone: None,
            profile: None,
            role: Role::User,
            created_at: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
