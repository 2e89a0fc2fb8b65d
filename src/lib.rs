use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;
use transport::{MailSender, SmsSender};
use utils::rsa::RsaCodec;

pub mod cache;
pub mod config;
pub mod middleware;
pub mod transport;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub rsa: Arc<RsaCodec>,
    pub mailer: Arc<dyn MailSender>,
    pub sms: Arc<dyn SmsSender>,
}
