use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    cache::SessionCacheOperations,
    utils::{
        EmptyResponse, error_codes, error_to_api_response,
        password::{SALT_LENGTH, constant_time_eq, generate_salt, hash_password},
        success_to_api_response,
    },
};

use super::email::{self, ResendOutcome};
use super::model::{
    self, EmailVerifyResponse, LoginRequest, LoginResponse, PERMISSION_SUPER_ADMIN, PhoneRequest,
    PhoneVerifyRequest, RealNameRequest, RegisterRequest, UserInfo, VerifyEmailQuery,
    validate_email,
};
use super::{phone, realname};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if req.username.chars().count() < 3 {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "用户名至少3个字符".to_string(),
            ),
        );
    }
    if req.password.len() < 6 {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "密码至少6个字符".to_string()),
        );
    }
    if !validate_email(&req.email) {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "邮箱格式错误".to_string()),
        );
    }

    match model::username_exists(&state.pool, &req.username).await {
        Ok(true) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::USER_EXISTS, "用户名已存在".to_string()),
            );
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!("检查用户名失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    }
    match model::email_registered(&state.pool, &req.email).await {
        Ok(true) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::USER_EXISTS, "邮箱已被注册".to_string()),
            );
        }
        Ok(false) => {}
        Err(e) => {
            tracing::error!("检查邮箱失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    }

    // 传输中的口令经 RSA 加密，解密失败按参数校验失败处理
    let Some(plain_password) = state.rsa.decrypt_with_private(&req.password) else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "密码解密失败".to_string()),
        );
    };

    let salt = generate_salt(SALT_LENGTH);
    let password_hash = hash_password(&plain_password, &salt);
    let email_token = email::generate_email_token();

    if let Err(e) = model::create_user(
        &state.pool,
        &req.username,
        &password_hash,
        &salt,
        &req.email,
        &email_token,
    )
    .await
    {
        return if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
            (
                StatusCode::OK,
                error_to_api_response(error_codes::USER_EXISTS, "用户已存在".to_string()),
            )
        } else {
            tracing::error!("创建用户失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "注册失败，请稍后重试".to_string()),
            )
        };
    }

    // 验证邮件尽力投递，失败不影响注册结果
    email::send_verification(
        &state.mailer,
        &state.config.frontend_url,
        &req.username,
        &req.email,
        &email_token,
    )
    .await;

    (
        StatusCode::OK,
        success_to_api_response(EmptyResponse {}),
    )
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    // 用户不存在和密码错误对外不可区分
    let credentials = match model::find_credentials(&state.pool, &req.username).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::AUTH_FAILED, "用户名或密码错误".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("登录查询失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    let Some(plain_password) = state.rsa.decrypt_with_private(&req.password) else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "用户名或密码错误".to_string()),
        );
    };

    let computed = hash_password(&plain_password, &credentials.salt);
    if !constant_time_eq(&computed, &credentials.password) {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::AUTH_FAILED, "用户名或密码错误".to_string()),
        );
    }

    let user = match UserInfo::find_by_username(&state.pool, &credentials.username).await {
        Ok(Some(user)) => user,
        Ok(None) | Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    match SessionCacheOperations::issue_or_reuse_token(
        &state.redis,
        &state.config.jwt_secret,
        state.config.jwt_expiration_secs,
        &user.username,
    )
    .await
    {
        Ok(token) => (
            StatusCode::OK,
            success_to_api_response(LoginResponse { token, user }),
        ),
        Err(e) => {
            tracing::error!("会话令牌处理失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            )
        }
    }
}

/// 登出只删会话缓存，已签发的令牌在自然过期前仍然有效
#[axum::debug_handler]
pub async fn logout(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match SessionCacheOperations::remove_token(&state.redis, &user.username).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Err(e) => {
            tracing::error!("删除会话缓存失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "登出失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn get_user_info(Extension(user): Extension<UserInfo>) -> impl IntoResponse {
    (StatusCode::OK, success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn get_all_user_info(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if user.permission > PERMISSION_SUPER_ADMIN {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(error_codes::PERMISSION_DENIED, "权限不足".to_string()),
        );
    }

    match UserInfo::list_all(&state.pool, &user).await {
        Ok(users) => (StatusCode::OK, success_to_api_response(users)),
        Err(e) => {
            tracing::error!("查询所有用户失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn resend_email(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match email::resend(
        &state.pool,
        &state.mailer,
        &state.config.frontend_url,
        &user.username,
    )
    .await
    {
        Ok(ResendOutcome::Sent) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(ResendOutcome::UserNotFound) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "用户不存在".to_string()),
        ),
        Ok(ResendOutcome::IncompleteProfile) => (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "用户信息不完整".to_string()),
        ),
        Ok(ResendOutcome::SendFailed) => (
            StatusCode::OK,
            error_to_api_response(error_codes::INTERNAL_ERROR, "邮件发送失败".to_string()),
        ),
        Err(e) => {
            tracing::error!("重发验证邮件失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

/// 邮箱验证链接回调，公开路由
///
/// token 一次性；验证成功后走与登录相同的会话缓存路径返回令牌。
#[axum::debug_handler]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> impl IntoResponse {
    let verified = match email::verify_email(&state.pool, &query.token).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("邮箱验证失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    };

    let Some((username, user_email)) = verified else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "验证链接无效或已使用".to_string()),
        );
    };

    match SessionCacheOperations::issue_or_reuse_token(
        &state.redis,
        &state.config.jwt_secret,
        state.config.jwt_expiration_secs,
        &username,
    )
    .await
    {
        Ok(token) => (
            StatusCode::OK,
            success_to_api_response(EmailVerifyResponse {
                email: user_email,
                token,
            }),
        ),
        Err(e) => {
            tracing::error!("会话令牌处理失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "生成令牌失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn send_phone_code(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<PhoneRequest>,
) -> impl IntoResponse {
    if req.username != user.username {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "用户名不匹配".to_string()),
        );
    }

    // 已有验证过的手机号就不再下发验证码
    match model::verified_phone_of(&state.pool, &user.username).await {
        Ok(Some(_)) => {
            return (
                StatusCode::OK,
                error_to_api_response(error_codes::VALIDATION_ERROR, "手机号已验证".to_string()),
            );
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("查询手机验证状态失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            );
        }
    }

    match phone::send_code(&state.pool, &state.sms, &user.username, &req.phone).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "验证码发送失败".to_string()),
        ),
        Err(e) => {
            tracing::error!("发送手机验证码失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn verify_phone(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<PhoneVerifyRequest>,
) -> impl IntoResponse {
    if req.username != user.username {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "用户名不匹配".to_string()),
        );
    }

    match phone::verify_code(&state.pool, &user.username, &req.phone, &req.code).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "验证码错误或已过期".to_string(),
            ),
        ),
        Err(e) => {
            tracing::error!("校验手机验证码失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn real_name(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<RealNameRequest>,
) -> impl IntoResponse {
    if req.username != user.username {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "用户名不匹配".to_string()),
        );
    }

    match realname::verify(&state.pool, &user.username, &req.realname, &req.idcard).await {
        Ok(Some(info)) => (StatusCode::OK, success_to_api_response(info)),
        Ok(None) => (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "实名认证失败".to_string()),
        ),
        Err(e) => {
            tracing::error!("实名认证失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn get_real_name(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match realname::get_masked(&state.pool, &user.username).await {
        Ok(Some(info)) => (StatusCode::OK, success_to_api_response(info)),
        Ok(None) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "用户不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("查询实名信息失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}
