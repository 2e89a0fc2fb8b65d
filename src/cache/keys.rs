/// 会话令牌缓存键前缀
const SESSION_TOKEN_PREFIX: &str = "session:token:";

/// 生成用户会话令牌缓存键
pub fn session_token_key(username: &str) -> String {
    format!("{}{}", SESSION_TOKEN_PREFIX, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_prefixed_by_username() {
        assert_eq!(session_token_key("alice"), "session:token:alice");
    }
}
