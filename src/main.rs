use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use library_backend::{
    AppState,
    config::Config,
    middleware::{auth_middleware, log_errors},
    routes,
    transport::{LogMailSender, LogSmsSender},
    utils::rsa::RsaCodec,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'library_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // RSA 密钥只在启动时加载一次
    let rsa = RsaCodec::from_base64(&config.rsa_public_key, &config.rsa_private_key)
        .expect("Failed to load RSA key material");

    // 设置应用状态，邮件/短信默认使用日志投递器
    let state = AppState {
        pool,
        config: config.clone(),
        redis: Arc::new(redis_client),
        rsa: Arc::new(rsa),
        mailer: Arc::new(LogMailSender),
        sms: Arc::new(LogSmsSender),
    };

    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/users/register", post(routes::user::register))
        .route("/users/login", post(routes::user::login))
        .route("/users/verify-email", get(routes::user::verify_email))
        .route("/rsa/public-key", get(routes::rsa::get_public_key))
        .route("/books/list", get(routes::book::list))
        .route("/books/search", get(routes::book::search));

    let protected_routes = Router::new()
        // 需要认证的用户路由
        .route("/users/logout", get(routes::user::logout))
        .route("/users/info", get(routes::user::get_user_info))
        .route("/users/all", get(routes::user::get_all_user_info))
        .route("/users/resend-email", get(routes::user::resend_email))
        .route("/users/send-phone-code", post(routes::user::send_phone_code))
        .route("/users/verify-phone", post(routes::user::verify_phone))
        .route("/users/real-name", post(routes::user::real_name))
        .route("/users/get-real-name", get(routes::user::get_real_name))
        // 图书路由
        .route("/books/add", post(routes::book::add))
        .route("/books/update", post(routes::book::update))
        .route("/books/delete", get(routes::book::delete))
        .route("/books/borrow", post(routes::book::borrow))
        .route("/books/return", post(routes::book::return_book))
        .route("/books/circulate", get(routes::book::circulate))
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service(),
    )
    .await
    .expect("Failed to start server");
}
