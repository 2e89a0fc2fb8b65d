use std::sync::Arc;

use rand::Rng;
use sqlx::PgPool;

use crate::routes::user::model::PERMISSION_VERIFIED;
use crate::transport::{MailMessage, MailSender};
use crate::utils::retry::with_retry;

/// 邮箱验证 token 长度
const EMAIL_TOKEN_LENGTH: usize = 32;

const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 重发验证邮件的结果
#[derive(Debug, PartialEq, Eq)]
pub enum ResendOutcome {
    Sent,
    UserNotFound,
    /// 用户存在但没有待验证 token 或邮箱，不隐式补发
    IncompleteProfile,
    SendFailed,
}

/// 生成 32 位随机邮箱验证 token，大写字母加数字
pub fn generate_email_token() -> String {
    let mut rng = rand::thread_rng();
    (0..EMAIL_TOKEN_LENGTH)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

fn verification_mail(frontend_url: &str, username: &str, email: &str, token: &str) -> MailMessage {
    let link = format!("{frontend_url}/register?token={token}");
    MailMessage {
        to: email.to_string(),
        subject: "邮箱验证 - 欢迎注册".to_string(),
        html_body: format!(
            "<h2>您好，{username}</h2>\
             <p>请点击以下链接完成邮箱验证：</p>\
             <a href='{link}'>{link}</a>\
             <p>如果无法点击，请复制链接到浏览器打开。</p>\
             <p>此链接有效期为24小时。</p>"
        ),
    }
}

/// 发送验证邮件，投递失败只记日志
pub async fn send_verification(
    mailer: &Arc<dyn MailSender>,
    frontend_url: &str,
    username: &str,
    email: &str,
    token: &str,
) -> bool {
    let message = verification_mail(frontend_url, username, email, token);
    match mailer.send(&message).await {
        Ok(()) => {
            tracing::info!("验证邮件已发送: {}", email);
            true
        }
        Err(e) => {
            tracing::warn!("验证邮件发送失败: {}: {}", email, e);
            false
        }
    }
}

/// 重发验证邮件：要求 token 和邮箱都已存在，不隐式创建
pub async fn resend(
    pool: &PgPool,
    mailer: &Arc<dyn MailSender>,
    frontend_url: &str,
    username: &str,
) -> Result<ResendOutcome, sqlx::Error> {
    let row = with_retry("查询待验证邮箱", || {
        let pool = pool.clone();
        let username = username.to_string();
        async move {
            sqlx::query_as::<_, (Option<String>, Option<String>)>(
                "SELECT email_verification_token, email FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&pool)
            .await
        }
    })
    .await?;

    let Some((token, email)) = row else {
        return Ok(ResendOutcome::UserNotFound);
    };
    let (Some(token), Some(email)) = (token, email) else {
        return Ok(ResendOutcome::IncompleteProfile);
    };

    if send_verification(mailer, frontend_url, username, &email, &token).await {
        Ok(ResendOutcome::Sent)
    } else {
        Ok(ResendOutcome::SendFailed)
    }
}

/// 验证行的消费判定：按 token 查不到行（已消费或从未存在）和已
/// 验证的行都拒绝，token 一次性，权限提升只会发生一次
fn consume_verification(row: Option<(String, String, bool)>) -> Option<(String, String)> {
    match row {
        Some((username, email, false)) => Some((username, email)),
        _ => None,
    }
}

/// 消费验证 token：行级锁事务内完成判定与写入，清 token、置已
/// 验证、把权限提升到已验证级别。拒绝路径零写入。
pub async fn verify_email(
    pool: &PgPool,
    token: &str,
) -> Result<Option<(String, String)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(String, String, bool)> = sqlx::query_as(
        "SELECT username, email, email_verified FROM users WHERE email_verification_token = $1 FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((username, email)) = consume_verification(row) else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE users
        SET email_verification_token = NULL,
            email_verified           = TRUE,
            permission               = $1
        WHERE username = $2
        "#,
    )
    .bind(PERMISSION_VERIFIED)
    .bind(&username)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some((username, email)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_expected_shape() {
        let token = generate_email_token();
        assert_eq!(token.len(), EMAIL_TOKEN_LENGTH);
        assert!(token.bytes().all(|b| TOKEN_CHARS.contains(&b)));
    }

    #[test]
    fn tokens_are_unique_in_practice() {
        assert_ne!(generate_email_token(), generate_email_token());
    }

    #[test]
    fn mail_embeds_link_and_username() {
        let mail = verification_mail("http://localhost:3000", "alice", "a@x.com", "TOKEN123");
        assert_eq!(mail.to, "a@x.com");
        assert!(mail.html_body.contains("http://localhost:3000/register?token=TOKEN123"));
        assert!(mail.html_body.contains("alice"));
    }

    #[test]
    fn pending_row_is_consumed() {
        let row = Some(("alice".to_string(), "a@x.com".to_string(), false));
        assert_eq!(
            consume_verification(row),
            Some(("alice".to_string(), "a@x.com".to_string()))
        );
    }

    #[test]
    fn consumed_token_cannot_be_replayed() {
        // 第一次消费清掉 token，再按同一 token 查询命中不到行
        assert_eq!(consume_verification(None), None);
    }

    #[test]
    fn verified_row_is_not_escalated_again() {
        let row = Some(("alice".to_string(), "a@x.com".to_string(), true));
        assert_eq!(consume_verification(row), None);
    }
}
