use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::utils::{now_millis, retry::with_retry};

/// 注册时的初始权限（未验证用户）
pub const PERMISSION_UNVERIFIED: i32 = 4;
/// 邮箱验证通过后的权限（已验证用户）
pub const PERMISSION_VERIFIED: i32 = 3;
/// 管理操作要求的最低权限级别，数值越小权限越高
pub const PERMISSION_ADMIN: i32 = 1;
/// 超级管理员
pub const PERMISSION_SUPER_ADMIN: i32 = 0;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").unwrap());

pub fn validate_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// 对外可见的用户画像
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub permission: i32,
    pub phone: Option<String>,
}

/// 登录校验所需的存量凭据
#[derive(Debug, FromRow)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
    pub salt: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    /// RSA 加密后的口令，base64
    pub password: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    /// RSA 加密后的口令，base64
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct EmailVerifyResponse {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub username: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneVerifyRequest {
    pub username: String,
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RealNameRequest {
    pub username: String,
    pub realname: String,
    pub idcard: String,
}

#[derive(Debug, Serialize)]
pub struct RealNameInfo {
    pub realname: String,
    pub idcard: String,
}

impl UserInfo {
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        with_retry("查询用户信息", || {
            let pool = pool.clone();
            let username = username.to_string();
            async move {
                sqlx::query_as::<_, UserInfo>(
                    "SELECT username, email, permission, phone FROM users WHERE username = $1",
                )
                .bind(username)
                .fetch_optional(&pool)
                .await
            }
        })
        .await
    }

    /// 全量用户列表，只有权限级别 0/1 的管理员可见
    pub async fn list_all(pool: &PgPool, requester: &UserInfo) -> Result<Vec<Self>, sqlx::Error> {
        if requester.permission > PERMISSION_ADMIN {
            return Ok(Vec::new());
        }

        with_retry("查询所有用户", || {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, UserInfo>(
                    "SELECT username, email, permission, phone FROM users ORDER BY username",
                )
                .fetch_all(&pool)
                .await
            }
        })
        .await
    }
}

pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
    with_retry("检查用户名占用", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT username FROM users WHERE username = $1")
                    .bind(username)
                    .fetch_optional(&pool)
                    .await?;
            Ok(row.is_some())
        }
    })
    .await
}

pub async fn email_registered(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    with_retry("检查邮箱占用", || {
        let pool = pool.clone();
        let email = email.to_string();
        async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT username FROM users WHERE email = $1")
                    .bind(email)
                    .fetch_optional(&pool)
                    .await?;
            Ok(row.is_some())
        }
    })
    .await
}

/// 写入新用户，初始权限 4，三个验证标记全部未通过
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    salt: &str,
    email: &str,
    email_token: &str,
) -> Result<(), sqlx::Error> {
    let create_time = now_millis();
    with_retry("创建用户", || {
        let pool = pool.clone();
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        let salt = salt.to_string();
        let email = email.to_string();
        let email_token = email_token.to_string();
        async move {
            sqlx::query(
                r#"
                INSERT INTO users
                    (username, password, salt, email, permission, create_time,
                     email_verification_token, email_verified, phone_verified, realname_verified)
                VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, FALSE, FALSE)
                "#,
            )
            .bind(username)
            .bind(password_hash)
            .bind(salt)
            .bind(email)
            .bind(PERMISSION_UNVERIFIED)
            .bind(create_time)
            .bind(email_token)
            .execute(&pool)
            .await?;
            Ok(())
        }
    })
    .await
}

pub async fn find_credentials(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserCredentials>, sqlx::Error> {
    with_retry("查询登录凭据", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            sqlx::query_as::<_, UserCredentials>(
                "SELECT username, password, salt FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&pool)
            .await
        }
    })
    .await
}

/// 已验证的手机号，未验证或未绑定返回 None
pub async fn verified_phone_of(
    pool: &PgPool,
    username: &str,
) -> Result<Option<String>, sqlx::Error> {
    with_retry("查询手机验证状态", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT phone FROM users WHERE username = $1 AND phone_verified = TRUE",
            )
            .bind(username)
            .fetch_optional(&pool)
            .await?;
            Ok(row.and_then(|(phone,)| phone))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email("a@x.com"));
        assert!(validate_email("first.last-name@sub.example.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("a@b"));
        assert!(!validate_email("@x.com"));
        assert!(!validate_email("a b@x.com"));
    }

    #[test]
    fn permission_levels_order_by_privilege() {
        assert!(PERMISSION_SUPER_ADMIN < PERMISSION_ADMIN);
        assert!(PERMISSION_ADMIN < PERMISSION_VERIFIED);
        assert!(PERMISSION_VERIFIED < PERMISSION_UNVERIFIED);
    }
}
