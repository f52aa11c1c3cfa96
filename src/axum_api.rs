#[cfg(feature = "axum")]
use crate::errors::OtpError;
#[cfg(feature = "axum")]
use crate::rate_limit::{LimitScope, RateLimiter};
#[cfg(feature = "axum")]
use crate::service::OtpManager;
#[cfg(feature = "axum")]
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
#[cfg(feature = "axum")]
use serde::Deserialize;
#[cfg(feature = "axum")]
use std::sync::Arc;

#[cfg(feature = "axum")]
#[derive(Clone)]
pub struct AppState {
    pub otp: Arc<OtpManager>,
    pub limiter: Arc<RateLimiter>,
}

#[cfg(feature = "axum")]
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Signup,
    #[default]
    Login,
}

#[cfg(feature = "axum")]
impl From<Purpose> for LimitScope {
    fn from(purpose: Purpose) -> Self {
        match purpose {
            Purpose::Signup => LimitScope::Signup,
            Purpose::Login => LimitScope::Login,
        }
    }
}

#[cfg(feature = "axum")]
#[derive(Deserialize)]
pub struct RequestOtpRequest {
    pub email: String,
    #[serde(default)]
    pub purpose: Purpose,
}

#[cfg(feature = "axum")]
#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub code: String,
}

#[cfg(feature = "axum")]
pub const INVALID_CODE_MESSAGE: &str = "Invalid or expired code";

#[cfg(feature = "axum")]
impl IntoResponse for OtpError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            OtpError::CooldownActive { retry_after_seconds } => {
                let body = Json(serde_json::json!({
                    "error": "Please wait before requesting a new verification code",
                    "retry_after_seconds": retry_after_seconds,
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after_seconds.to_string())],
                    body,
                )
                    .into_response();
            }
            OtpError::InvalidIdentifier => (StatusCode::BAD_REQUEST, "Email is required"),
            OtpError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts. Please try again later.",
            ),
            OtpError::DiagnosticsDisabled => (StatusCode::NOT_FOUND, "Not found"),
            OtpError::DeliveryFailed(_) | OtpError::ConfigError(_) | OtpError::StorageError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(serde_json::json!({ "error": error_message }));

        (status, body).into_response()
    }
}

#[cfg(feature = "axum")]
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<RequestOtpRequest>,
) -> Result<Json<serde_json::Value>, OtpError> {
    state
        .limiter
        .check_rate_limit(payload.purpose.into(), &payload.email)
        .await?;

    let challenge = state.otp.issue(&payload.email).await?;

    let mut body = serde_json::json!({
        "message": "Verification code sent",
        "expires_at": challenge.expires_at,
    });
    if state.otp.config.environment.is_development() {
        body["code"] = serde_json::Value::String(challenge.code);
    }
    Ok(Json(body))
}

#[cfg(feature = "axum")]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Response, OtpError> {
    state
        .limiter
        .check_rate_limit(LimitScope::Otp, &payload.email)
        .await?;

    if state.otp.verify(&payload.email, &payload.code).await? {
        Ok(Json(serde_json::json!({ "verified": true })).into_response())
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": INVALID_CODE_MESSAGE })),
        )
            .into_response())
    }
}

#[cfg(all(feature = "axum", feature = "diagnostics"))]
pub async fn otp_status(
    State(state): State<AppState>,
    axum::extract::Path(email): axum::extract::Path<String>,
) -> Result<Json<crate::diagnostics::OtpStatus>, OtpError> {
    Ok(Json(state.otp.status(&email).await?))
}

#[cfg(all(feature = "axum", feature = "diagnostics"))]
pub async fn otp_self_test(
    State(state): State<AppState>,
    axum::extract::Path(email): axum::extract::Path<String>,
) -> Result<Json<crate::diagnostics::SelfTestReport>, OtpError> {
    Ok(Json(state.otp.self_test(&email).await?))
}

#[cfg(feature = "axum")]
pub fn guard_router(otp: Arc<OtpManager>, limiter: Arc<RateLimiter>) -> Router {
    let state = AppState { otp, limiter };
    let router = Router::new()
        .route("/request-otp", post(request_otp))
        .route("/verify-otp", post(verify_otp));

    #[cfg(feature = "diagnostics")]
    let router = router
        .route("/otp-status/:email", axum::routing::get(otp_status))
        .route("/otp-self-test/:email", post(otp_self_test));

    router.with_state(state)
}
