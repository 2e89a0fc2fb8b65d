use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    routes::user::model::UserInfo,
    utils::{error_codes, error_to_api_response, jwt},
};

/// 认证中间件：校验 Bearer 令牌并把用户信息写入请求扩展
///
/// 令牌无效、用户不存在都按未认证处理，handler 通过
/// Extension<UserInfo> 取当前用户。
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .unwrap_or("");

    let Some(username) = jwt::get_username(token, &state.config.jwt_secret) else {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(error_codes::AUTH_FAILED, "无效的认证令牌".to_string()),
        )
            .into_response();
    };

    let user = match UserInfo::find_by_username(&state.pool, &username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                error_to_api_response::<()>(error_codes::AUTH_FAILED, "用户不存在".to_string()),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("认证查询用户失败: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response::<()>(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
                .into_response();
        }
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}
