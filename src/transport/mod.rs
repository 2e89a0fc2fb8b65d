//! 邮件与短信投递抽象
//!
//! 验证流程只依赖这两个 trait；真实投递方式（SMTP、短信网关）由
//! 部署方注入，本地开发默认使用日志实现。

use async_trait::async_trait;

#[derive(Debug)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

#[derive(Clone, Debug)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// 邮件投递抽象，失败返回错误由调用方决定是否致命
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError>;
}

/// 本地开发用的邮件发送器，只记日志不真正投递
#[derive(Clone, Debug, Default)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "mail send stub"
        );
        Ok(())
    }
}

/// 短信投递抽象
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_code(&self, phone: &str, code: &str) -> Result<(), TransportError>;
}

/// 本地开发用的短信发送器，只记日志不真正投递
#[derive(Clone, Debug, Default)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send_code(&self, phone: &str, code: &str) -> Result<(), TransportError> {
        tracing::info!(phone = %phone, code = %code, "sms send stub");
        Ok(())
    }
}
