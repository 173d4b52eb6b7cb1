//! Code issuance endpoint.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::state::AuthState;
use super::types::{payload_rejected, ErrorResponse, RequestCodeRequest, RequestCodeResponse};
use crate::otp::{CodeIntent, OtpError};

/// Send a one-time code and magic link to the given email, replacing any
/// outstanding one.
#[utoipa::path(
    post,
    path = "/v1/auth/otp",
    request_body = RequestCodeRequest,
    responses(
        (status = 200, description = "Code issued and dispatched", body = RequestCodeResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorResponse),
        (status = 500, description = "Storage or dispatch failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn request_code(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<RequestCodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: RequestCodeRequest = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return payload_rejected(&rejection).into_response(),
    };
    let intent = request.intent.unwrap_or(CodeIntent::Login);

    match auth_state.issuer().issue(&request.email, intent).await {
        Ok(_issued) => (
            StatusCode::OK,
            Json(RequestCodeResponse {
                success: true,
                message: "A verification code has been sent.".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
