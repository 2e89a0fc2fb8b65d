use std::sync::Arc;

use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::session_token_key;
use crate::utils::jwt;

/// 会话令牌缓存操作
///
/// 键为用户名，值为访问令牌字符串。读取不续期；登出只删缓存，
/// 令牌本身在自然过期前仍然有效。
pub struct SessionCacheOperations;

impl SessionCacheOperations {
    /// 查询用户当前缓存的令牌
    pub async fn get_token(
        redis: &Arc<RedisClient>,
        username: &str,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let result: Option<String> = conn.get(session_token_key(username)).await?;
        Ok(result)
    }

    /// 缓存令牌并设置过期时间
    pub async fn cache_token(
        redis: &Arc<RedisClient>,
        username: &str,
        token: &str,
        ttl_seconds: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(session_token_key(username), token, ttl_seconds)
            .await?;
        Ok(())
    }

    /// 删除用户的令牌缓存（登出）
    pub async fn remove_token(
        redis: &Arc<RedisClient>,
        username: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(session_token_key(username)).await?;
        Ok(())
    }

    /// 复用缓存中的令牌，没有才签发新令牌并写入缓存
    ///
    /// 登录和邮箱验证共用这条路径，避免同一用户重复签发。
    /// 缓存有效期与令牌有效期一致，缓存不会晚于令牌过期。
    pub async fn issue_or_reuse_token(
        redis: &Arc<RedisClient>,
        jwt_secret: &str,
        ttl_seconds: u64,
        username: &str,
    ) -> Result<String, redis::RedisError> {
        if let Some(token) = Self::get_token(redis, username).await? {
            return Ok(token);
        }

        let token =
            jwt::gen_access_token(username, jwt_secret, Some(ttl_seconds as i64)).map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::IoError, "生成令牌失败", e.to_string()))
            })?;
        Self::cache_token(redis, username, &token, ttl_seconds).await?;
        Ok(token)
    }
}
