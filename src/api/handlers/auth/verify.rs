//! Code and magic-link verification endpoints.
//!
//! Both routes run the same pipeline: verify the secret, gate on the account
//! status, and for approved accounts mint a session.

use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::session::session_cookie;
use super::state::AuthState;
use super::types::{
    payload_rejected, AuthResponse, ErrorResponse, VerifyCodeRequest, VerifyLinkQuery,
};
use super::utils::new_account_defaults;
use crate::otp::{AccessDecision, AccountStatus, NewAccountDefaults, OtpError, SecretKind};
use crate::session::SessionClaims;

#[utoipa::path(
    post,
    path = "/v1/auth/otp/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Verified: logged in, or new account pending approval", body = AuthResponse),
        (status = 400, description = "Missing input, or invalid/expired code", body = ErrorResponse),
        (status = 403, description = "Account pending approval or suspended", body = AuthResponse),
        (status = 500, description = "Storage or dispatch failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_code(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<VerifyCodeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return payload_rejected(&rejection).into_response(),
    };
    let defaults = match new_account_defaults(request.name, request.note, request.phone) {
        Ok(defaults) => defaults,
        Err(err) => return err.into_response(),
    };

    complete_verification(
        &auth_state,
        &request.email,
        &request.code,
        SecretKind::Code,
        defaults,
    )
    .await
    .unwrap_or_else(IntoResponse::into_response)
}

#[utoipa::path(
    get,
    path = "/v1/auth/otp/verify",
    params(VerifyLinkQuery),
    responses(
        (status = 200, description = "Verified: logged in, or new account pending approval", body = AuthResponse),
        (status = 400, description = "Missing input, or invalid/expired link", body = ErrorResponse),
        (status = 403, description = "Account pending approval or suspended", body = AuthResponse),
        (status = 500, description = "Storage or dispatch failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_link(
    auth_state: Extension<Arc<AuthState>>,
    Query(query): Query<VerifyLinkQuery>,
) -> impl IntoResponse {
    let (Some(email), Some(token)) = (query.email, query.token) else {
        return OtpError::Validation("Missing email or token").into_response();
    };

    complete_verification(
        &auth_state,
        &email,
        &token,
        SecretKind::LinkToken,
        NewAccountDefaults::default(),
    )
    .await
    .unwrap_or_else(IntoResponse::into_response)
}

async fn complete_verification(
    auth_state: &AuthState,
    email: &str,
    secret: &str,
    kind: SecretKind,
    defaults: NewAccountDefaults,
) -> Result<Response, OtpError> {
    let outcome = auth_state.verifier().verify(email, secret, kind).await?;
    let decision = auth_state
        .gate()
        .resolve_access(email, outcome, defaults)
        .await?;

    match decision {
        AccessDecision::PendingApprovalNewAccount { .. } => {
            Ok((StatusCode::OK, Json(AuthResponse::pending_new_account())).into_response())
        }
        AccessDecision::PendingApproval { .. } => Err(OtpError::AccessDenied(AccountStatus::Pending)),
        AccessDecision::Suspended { .. } => Err(OtpError::AccessDenied(AccountStatus::Suspended)),
        AccessDecision::LoggedIn {
            account,
            redirect_to,
        } => {
            let sessions = auth_state.sessions();
            let claims =
                SessionClaims::for_account(&account, auth_state.clock().now(), sessions.ttl())
                    .map_err(OtpError::Internal)?;
            let token = sessions.issue(&claims).map_err(OtpError::Internal)?;
            let cookie = session_cookie(auth_state, &token)
                .map_err(|err| OtpError::Internal(anyhow!(err).context("invalid session cookie")))?;

            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, cookie);
            info!(account_id = %account.id, "account logged in");
            Ok((
                StatusCode::OK,
                headers,
                Json(AuthResponse::logged_in(redirect_to, token)),
            )
                .into_response())
        }
    }
}
