use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{AppState, utils::success_to_api_response};

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

/// 下发 RSA 公钥，前端用它加密传输中的口令
#[axum::debug_handler]
pub async fn get_public_key(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(PublicKeyResponse {
            public_key: state.rsa.public_key_b64().to_string(),
        }),
    )
}
