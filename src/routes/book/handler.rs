use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    routes::user::model::{PERMISSION_ADMIN, UserInfo},
    utils::{EmptyResponse, error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{
    self, AddBooksRequest, BorrowBookRequest, DeleteBookQuery, ReturnBookRequest, SearchQuery,
    UpdateBookRequest,
};

/// 管理员前置检查，权限级别大于 1 的用户拒绝
fn check_admin(user: &UserInfo) -> bool {
    user.permission <= PERMISSION_ADMIN
}

#[axum::debug_handler]
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match model::list_books(&state.pool).await {
        Ok(books) => (StatusCode::OK, success_to_api_response(books)),
        Err(e) => {
            tracing::error!("查询图书列表失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    match model::search_books(&state.pool, &query.keyword).await {
        Ok(books) => (StatusCode::OK, success_to_api_response(books)),
        Err(e) => {
            tracing::error!("搜索图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn add(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<AddBooksRequest>,
) -> impl IntoResponse {
    if !check_admin(&user) {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(error_codes::PERMISSION_DENIED, "权限不足".to_string()),
        );
    }

    match model::add_books(&state.pool, &req.data).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Err(e) => {
            tracing::error!("添加图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "添加图书失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn update(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<UpdateBookRequest>,
) -> impl IntoResponse {
    if !check_admin(&user) {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(error_codes::PERMISSION_DENIED, "权限不足".to_string()),
        );
    }

    match model::update_book(&state.pool, &req).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "图书不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("更新图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "更新图书失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn delete(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Query(query): Query<DeleteBookQuery>,
) -> impl IntoResponse {
    if !check_admin(&user) {
        return (
            StatusCode::FORBIDDEN,
            error_to_api_response(error_codes::PERMISSION_DENIED, "权限不足".to_string()),
        );
    }

    match model::delete_book(&state.pool, query.book_id).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "图书不存在或仍有借出副本".to_string(),
            ),
        ),
        Err(e) => {
            tracing::error!("删除图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "删除图书失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn borrow(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<BorrowBookRequest>,
) -> impl IntoResponse {
    match model::borrow_book(&state.pool, req.book_id, req.borrow_long, &user.username).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(error_codes::VALIDATION_ERROR, "借书失败".to_string()),
        ),
        Err(e) => {
            tracing::error!("借阅图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "借书失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn return_book(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
    Json(req): Json<ReturnBookRequest>,
) -> impl IntoResponse {
    match model::return_book(&state.pool, req.book_id, &user.username).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(EmptyResponse {}),
        ),
        Ok(false) => (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "没有待归还的借阅记录".to_string()),
        ),
        Err(e) => {
            tracing::error!("归还图书失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "还书失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn circulate(
    Extension(user): Extension<UserInfo>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match model::circulate_list(&state.pool, &user.username, user.permission).await {
        Ok(records) => (StatusCode::OK, success_to_api_response(records)),
        Err(e) => {
            tracing::error!("查询借阅记录失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "数据库错误".to_string()),
            )
        }
    }
}
