pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    bot_detection::bot_detection_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{IdentityConfig, SwaggerMode};
use crate::providers::ProviderRegistry;
use crate::services::{AuthService, IdentityStore};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login,
        handlers::auth::register,
        handlers::auth::confirm,
        handlers::auth::resend_code,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::refresh,
        handlers::auth::therapist_status,
        handlers::health::health,
        handlers::health::ready,
    ),
    components(
        schemas(
            dtos::auth::LoginRequest,
            dtos::auth::RegisterRequest,
            dtos::auth::ConfirmRequest,
            dtos::auth::ResendCodeRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::TokenBundle,
            dtos::auth::SessionResponse,
            dtos::auth::RegisterResponse,
            dtos::auth::RefreshResponse,
            dtos::auth::TherapistStatusResponse,
            models::UserResponse,
            models::UserRole,
            models::AccountStatus,
            providers::AuthProvider,
        )
    ),
    tags(
        (name = "Authentication", description = "Registration, sign-in and credential recovery"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn IdentityStore>,
    pub registry: Arc<ProviderRegistry>,
    pub auth_service: AuthService,
    pub login_rate_limiter: IpRateLimiter,
    pub register_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Create login route with rate limiting
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Create register route with rate limiting
    let register_limiter = state.register_rate_limiter.clone();
    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            register_limiter,
            ip_rate_limit_middleware,
        ));

    // Both reset steps share one limiter: the first sends an email, the
    // second accepts code guesses.
    let reset_limiter = state.password_reset_rate_limiter.clone();
    let password_reset_routes = Router::new()
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware));

    // Create global IP rate limiter
    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::metrics));

    match state.config.swagger {
        SwaggerMode::Public => {
            app = app
                .merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
        }
        SwaggerMode::Internal => {
            // Document stays available for programmatic consumers; no UI.
            app = app.route(
                "/.well-known/openapi.json",
                get(|| async { Json(ApiDoc::openapi()) }),
            );
        }
        SwaggerMode::Disabled => {}
    }

    let cors = cors_layer(&state.config);

    let app = app
        // Authentication routes
        .route("/auth/confirm", post(handlers::auth::confirm))
        .route("/auth/resend-code", post(handlers::auth::resend_code))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/therapist-status/:subject",
            get(handlers::auth::therapist_status),
        )
        .merge(login_route)
        .merge(register_route)
        .merge(password_reset_routes)
        .with_state(state.clone())
        // Whole-request budget; an exhausted fallback chain times out here,
        // inside the observability layers, so the 408 is still recorded.
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.auth.request_timeout_secs,
        )))
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add metrics middleware
        .layer(from_fn(middleware::track_http_metrics))
        // Add tracing layer
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Add tracing middleware for request_id
        .layer(from_fn(request_id_middleware))
        // Add security headers middleware
        .layer(from_fn(security_headers_middleware))
        // Add bot detection middleware
        .layer(from_fn(bot_detection_middleware))
        // Add CORS layer
        .layer(cors);

    Ok(app)
}

fn cors_layer(config: &IdentityConfig) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::HeaderName::from_static("x-request-id"),
    ];

    // Wildcard only survives config validation outside production.
    if config.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Invalid CORS origin, skipping");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}
