use std::sync::{Arc, LazyLock};

use rand::Rng;
use regex::Regex;
use sqlx::PgPool;

use crate::transport::SmsSender;
use crate::utils::retry::with_retry;

/// 验证码有效期，5分钟
pub const CODE_EXPIRATION_SECS: i64 = 5 * 60;

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^1[3-9]\d{9}$").unwrap());

/// 大陆手机号格式：11位，1开头，第二位3-9
pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{}", rng.gen_range(100_000..=999_999))
}

/// 发送验证码并落库
///
/// 短信先发、记录后写：投递失败直接返回，不留下半提交的验证码。
pub async fn send_code(
    pool: &PgPool,
    sms: &Arc<dyn SmsSender>,
    username: &str,
    phone: &str,
) -> Result<bool, sqlx::Error> {
    if !validate_phone(phone) {
        return Ok(false);
    }

    let code = generate_code();
    if let Err(e) = sms.send_code(phone, &code).await {
        tracing::warn!("短信发送失败: {}: {}", phone, e);
        return Ok(false);
    }

    let expire_time = chrono::Utc::now().timestamp() + CODE_EXPIRATION_SECS;
    with_retry("保存手机验证码", || {
        let pool = pool.clone();
        let username = username.to_string();
        let phone = phone.to_string();
        let code = code.clone();
        async move {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET phone                   = $1,
                    phone_verification_code = $2,
                    phone_code_expire_time  = $3,
                    phone_verified          = FALSE
                WHERE username = $4
                "#,
            )
            .bind(phone)
            .bind(code)
            .bind(expire_time)
            .bind(username)
            .execute(&pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
    })
    .await
}

/// 用户行上与验证码相关的存量状态
struct StoredPhoneCode {
    phone: Option<String>,
    code: Option<String>,
    expire_time: Option<i64>,
    verified: bool,
}

/// 验证码判定：已验证、手机号不符、验证码不符、已过期都拒绝。
/// 消费后验证码被清掉，重放落在验证码不符分支。
fn code_accepted(stored: &StoredPhoneCode, phone: &str, code: &str, now: i64) -> bool {
    !stored.verified
        && stored.phone.as_deref() == Some(phone)
        && stored.code.as_deref() == Some(code)
        && stored.expire_time.is_some_and(|expire| expire >= now)
}

/// 校验验证码：行级锁事务内完成判定与写入，命中即清掉验证码和
/// 过期时间并置已验证。拒绝路径零写入。
pub async fn verify_code(
    pool: &PgPool,
    username: &str,
    phone: &str,
    code: &str,
) -> Result<bool, sqlx::Error> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let row: Option<(Option<String>, Option<String>, Option<i64>, bool)> = sqlx::query_as(
        r#"
        SELECT phone, phone_verification_code, phone_code_expire_time, phone_verified
        FROM users
        WHERE username = $1
        FOR UPDATE
        "#,
    )
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((stored_phone, stored_code, expire_time, verified)) = row else {
        return Ok(false);
    };
    let stored = StoredPhoneCode {
        phone: stored_phone,
        code: stored_code,
        expire_time,
        verified,
    };
    if !code_accepted(&stored, phone, code, now) {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE users
        SET phone_verification_code = NULL,
            phone_code_expire_time  = NULL,
            phone_verified          = TRUE
        WHERE username = $1
        "#,
    )
    .bind(username)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mainland_numbers() {
        assert!(validate_phone("13812345678"));
        assert!(validate_phone("19900000000"));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(!validate_phone("12812345678")); // 第二位 2
        assert!(!validate_phone("1381234567")); // 10 位
        assert!(!validate_phone("138123456789")); // 12 位
        assert!(!validate_phone("23812345678")); // 不以 1 开头
        assert!(!validate_phone("1381234567a"));
    }

    #[test]
    fn code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    fn pending(issued_at: i64) -> StoredPhoneCode {
        StoredPhoneCode {
            phone: Some("13812345678".to_string()),
            code: Some("123456".to_string()),
            expire_time: Some(issued_at + CODE_EXPIRATION_SECS),
            verified: false,
        }
    }

    #[test]
    fn code_accepted_within_expiry_window() {
        let issued_at = 1_700_000_000;
        let stored = pending(issued_at);
        assert!(code_accepted(&stored, "13812345678", "123456", issued_at + 299));
        // 过期时刻本身仍然有效
        assert!(code_accepted(&stored, "13812345678", "123456", issued_at + 300));
    }

    #[test]
    fn code_rejected_after_expiry() {
        let issued_at = 1_700_000_000;
        let stored = pending(issued_at);
        assert!(!code_accepted(&stored, "13812345678", "123456", issued_at + 301));
    }

    #[test]
    fn wrong_code_or_phone_rejected() {
        let issued_at = 1_700_000_000;
        let stored = pending(issued_at);
        assert!(!code_accepted(&stored, "13812345678", "654321", issued_at));
        assert!(!code_accepted(&stored, "13900000000", "123456", issued_at));
    }

    #[test]
    fn consumed_code_cannot_be_replayed() {
        // 消费后验证码和过期时间被清掉，标记已验证
        let consumed = StoredPhoneCode {
            phone: Some("13812345678".to_string()),
            code: None,
            expire_time: None,
            verified: true,
        };
        assert!(!code_accepted(&consumed, "13812345678", "123456", 1_700_000_000));
    }
}
