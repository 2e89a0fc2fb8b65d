use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 访问令牌默认有效期，24小时
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60 * 24;

const ISSUER: &str = "library-backend";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 每次签发随机生成的标识，仅用于防重放追踪，不是身份键
    pub sub: String,
    /// 用户名
    pub name: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// 签发访问令牌，ttl 为 None 时使用默认 24 小时
pub fn gen_access_token(
    username: &str,
    secret: &str,
    ttl_seconds: Option<i64>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        name: username.to_string(),
        iss: ISSUER.to_string(),
        iat: now,
        exp: now + ttl_seconds.unwrap_or(ACCESS_TOKEN_TTL_SECS),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// 解析并校验令牌，签名错误、结构异常、签发者不符或已过期
/// 一律返回 None，调用方统一按未认证处理
pub fn parse_claim(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation.set_issuer(&[ISSUER]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .ok()
}

/// parse_claim 的投影，只取用户名
pub fn get_username(token: &str, secret: &str) -> Option<String> {
    parse_claim(token, secret).map(|claims| claims.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn roundtrip_carries_username() {
        let token = gen_access_token("alice", SECRET, None).unwrap();
        let claims = parse_claim(&token, SECRET).unwrap();
        assert_eq!(claims.name, "alice");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(get_username(&token, SECRET).as_deref(), Some("alice"));
    }

    #[test]
    fn subject_is_fresh_per_issuance() {
        let a = gen_access_token("alice", SECRET, None).unwrap();
        let b = gen_access_token("alice", SECRET, None).unwrap();
        let sub_a = parse_claim(&a, SECRET).unwrap().sub;
        let sub_b = parse_claim(&b, SECRET).unwrap().sub;
        assert_ne!(sub_a, sub_b);
    }

    #[test]
    fn zero_ttl_token_expires_immediately() {
        let token = gen_access_token("alice", SECRET, Some(0)).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(parse_claim(&token, SECRET).is_none());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = gen_access_token("alice", SECRET, None).unwrap();
        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(parse_claim(&tampered, SECRET).is_none());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = gen_access_token("alice", SECRET, None).unwrap();
        assert!(parse_claim(&token, "other-secret").is_none());
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(parse_claim("not.a.jwt", SECRET).is_none());
        assert!(parse_claim("", SECRET).is_none());
    }
}
