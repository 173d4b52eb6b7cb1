//! Request/response types for auth endpoints and the HTTP mapping of `OtpError`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

use crate::otp::{AccountStatus, CodeIntent, OtpError};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestCodeRequest {
    pub email: String,
    /// Defaults to `login`.
    #[serde(default)]
    pub intent: Option<CodeIntent>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestCodeResponse {
    pub success: bool,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
    /// Profile fields, stored only when this verification creates the account.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Query of the magic link. Fields are optional so a truncated link gets a
/// JSON 400 rather than a plain-text extractor rejection.
#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct VerifyLinkQuery {
    pub email: Option<String>,
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub status: AccountStatus,
    pub message: String,
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResponse {
    pub(super) fn pending_new_account() -> Self {
        Self {
            success: true,
            status: AccountStatus::Pending,
            message: "Your account has been created and is awaiting approval.".to_string(),
            requires_approval: true,
            redirect_to: None,
            session_token: None,
            error: None,
        }
    }

    pub(super) fn logged_in(redirect_to: String, session_token: String) -> Self {
        Self {
            success: true,
            status: AccountStatus::Approved,
            message: "Login successful.".to_string(),
            requires_approval: false,
            redirect_to: Some(redirect_to),
            session_token: Some(session_token),
            error: None,
        }
    }

    fn denied(err: &OtpError, status: AccountStatus) -> Self {
        Self {
            success: false,
            status,
            message: err.public_message().to_string(),
            requires_approval: status == AccountStatus::Pending,
            redirect_to: None,
            session_token: None,
            error: Some(err.kind().to_string()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// A body that is absent, not JSON, or missing required fields is a 400 like
/// any other invalid input.
pub(super) fn payload_rejected(rejection: &JsonRejection) -> OtpError {
    debug!("rejected request body: {rejection}");
    match rejection {
        JsonRejection::MissingJsonContentType(_) => OtpError::Validation("Missing payload"),
        _ => OtpError::Validation("Missing or malformed fields"),
    }
}

fn status_code(err: &OtpError) -> StatusCode {
    match err {
        OtpError::Validation(_) | OtpError::NotFound | OtpError::Expired | OtpError::Invalid => {
            StatusCode::BAD_REQUEST
        }
        OtpError::AccessDenied(_) => StatusCode::FORBIDDEN,
        OtpError::Dispatch(_) | OtpError::Storage(_) | OtpError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for OtpError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if self.is_server_error() {
            error!("auth request failed: {self}");
        } else {
            debug!("auth request rejected: {self}");
        }

        if let Self::AccessDenied(account_status) = &self {
            return (status, Json(AuthResponse::denied(&self, *account_status))).into_response();
        }

        let body = ErrorResponse {
            success: false,
            error: self.kind().to_string(),
            message: self.public_message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn auth_response_uses_camel_case() -> Result<()> {
        let value = serde_json::to_value(AuthResponse::logged_in("/".to_string(), "tok".to_string()))?;
        assert_eq!(value["requiresApproval"], Value::Bool(false));
        assert_eq!(value["redirectTo"], "/");
        assert_eq!(value["sessionToken"], "tok");
        assert_eq!(value["status"], "approved");
        assert!(value.get("error").is_none());
        Ok(())
    }

    #[test]
    fn request_code_intent_is_optional() -> Result<()> {
        let request: RequestCodeRequest = serde_json::from_str(r#"{"email":"a@x.com"}"#)?;
        assert!(request.intent.is_none());
        let request: RequestCodeRequest =
            serde_json::from_str(r#"{"email":"a@x.com","intent":"register"}"#)?;
        assert_eq!(request.intent, Some(CodeIntent::Register));
        Ok(())
    }

    async fn rejection_for(content_type: Option<&str>, body: &'static str) -> Result<JsonRejection> {
        use axum::{body::Body, extract::FromRequest, http::Request};

        let mut builder = Request::builder().method("POST").uri("/v1/auth/otp/verify");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(Body::from(body))?;
        match Json::<VerifyCodeRequest>::from_request(request, &()).await {
            Ok(_) => Err(anyhow!("body was accepted: {body}")),
            Err(rejection) => Ok(rejection),
        }
    }

    #[tokio::test]
    async fn payload_rejections_are_validation_errors() -> Result<()> {
        let cases = [
            (None, ""),
            (Some("application/json"), "{}"),
            (Some("application/json"), r#"{"email":"a@x.com"}"#),
            (Some("application/json"), r#"{"email":"a@x.com","code":123456}"#),
            (Some("application/json"), "{not json"),
        ];
        for (content_type, body) in cases {
            let err = payload_rejected(&rejection_for(content_type, body).await?);
            assert!(matches!(err, OtpError::Validation(_)), "{body}");

            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            let value = body_json(response).await?;
            assert_eq!(value["error"], "validation_error");
            assert_eq!(value["success"], Value::Bool(false));
        }
        Ok(())
    }

    #[tokio::test]
    async fn error_statuses_follow_taxonomy() -> Result<()> {
        let cases = [
            (OtpError::Validation("Email is required"), StatusCode::BAD_REQUEST),
            (OtpError::NotFound, StatusCode::BAD_REQUEST),
            (OtpError::Expired, StatusCode::BAD_REQUEST),
            (OtpError::Invalid, StatusCode::BAD_REQUEST),
            (OtpError::AccessDenied(AccountStatus::Suspended), StatusCode::FORBIDDEN),
            (OtpError::Dispatch(anyhow!("smtp down")), StatusCode::INTERNAL_SERVER_ERROR),
            (OtpError::Storage(anyhow!("pool timeout")), StatusCode::INTERNAL_SERVER_ERROR),
            (OtpError::Internal(anyhow!("rng")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn error_body_never_carries_cause() -> Result<()> {
        let err = OtpError::Storage(anyhow!("$argon2id$v=19$m=19456 leaked"));
        let body = body_json(err.into_response()).await?;
        assert_eq!(body["success"], Value::Bool(false));
        assert_eq!(body["error"], "storage_failure");
        assert!(!body.to_string().contains("argon2"));
        Ok(())
    }

    #[tokio::test]
    async fn pending_denial_requires_approval() -> Result<()> {
        let response = OtpError::AccessDenied(AccountStatus::Pending).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await?;
        assert_eq!(body["requiresApproval"], Value::Bool(true));
        assert_eq!(body["status"], "pending");
        assert_eq!(body["error"], "access_denied");
        Ok(())
    }
}
