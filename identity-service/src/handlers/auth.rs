use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::tracing::RequestId;
use service_core::response::ApiResponse;

use crate::dtos::auth::{
    ConfirmRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
    ResendCodeRequest, ResetPasswordRequest,
};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Sign in with an email/password pair or a provider-issued id token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account exists but is not verified"),
        (status = 502, description = "Identity provider unavailable")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.auth_service.login(req).await?;
    Ok(ApiResponse::success(session).with_request_id(request_id))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.register(req).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::success_with_message(
            res,
            "Registration successful. Please check your email for a confirmation code.",
        )
        .with_request_id(request_id),
    ))
}

/// Confirm a registration with the emailed code
#[utoipa::path(
    post,
    path = "/auth/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Account confirmed"),
        (status = 400, description = "Invalid or expired code")
    ),
    tag = "Authentication"
)]
pub async fn confirm(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<ConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.confirm(req).await?;
    Ok(
        ApiResponse::success_with_message(json!({}), "Account confirmed. You can now sign in.")
            .with_request_id(request_id),
    )
}

/// Resend the confirmation code
#[utoipa::path(
    post,
    path = "/auth/resend-code",
    request_body = ResendCodeRequest,
    responses((status = 200, description = "Always succeeds")),
    tag = "Authentication"
)]
pub async fn resend_code(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<ResendCodeRequest>,
) -> impl IntoResponse {
    state.auth_service.resend_code(req).await;
    ApiResponse::success_with_message(
        json!({}),
        "If an account exists for this email, a new confirmation code has been sent.",
    )
    .with_request_id(request_id)
}

/// Start a password reset
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Always succeeds")),
    tag = "Authentication"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> impl IntoResponse {
    state.auth_service.forgot_password(req).await;
    ApiResponse::success_with_message(
        json!({}),
        "If an account exists for this email, password reset instructions have been sent.",
    )
    .with_request_id(request_id)
}

/// Complete a password reset with the emailed code
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Invalid or expired code")
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.reset_password(req).await?;
    Ok(ApiResponse::success_with_message(
        json!({}),
        "Password has been reset. You can now sign in.",
    )
    .with_request_id(request_id))
}

/// Exchange a refresh token for a fresh token bundle
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token")
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.refresh(req).await?;
    Ok(ApiResponse::success(res).with_request_id(request_id))
}

/// Verification status for a therapist account, by provider subject id
#[utoipa::path(
    get,
    path = "/auth/therapist-status/{subject}",
    params(("subject" = String, Path, description = "Provider subject id")),
    responses(
        (status = 200, description = "Therapist status", body = TherapistStatusResponse),
        (status = 404, description = "No therapist account for this subject")
    ),
    tag = "Authentication"
)]
pub async fn therapist_status(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.therapist_status(&subject).await?;
    Ok(ApiResponse::success(res).with_request_id(request_id))
}
